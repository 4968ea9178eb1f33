//! The interception proxy.
//!
//! An [`InterceptionProxy`] occupies a host component's single delegate slot
//! on behalf of the application's real delegate (the forward target). It
//! answers which calls it implements itself, which calls return nothing, and
//! notifies observers before and after every call routed through it.
//!
//! The proxy is single threaded (`Rc`/`RefCell` throughout) and tolerates
//! re-entrancy: no interior borrow is held while observers, wired
//! implementations, the forward target or a released target's destructor run.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::hooks::{CallContext, CallObserver, HookKey, HookPhase, HookRegistry, HookReport};
use crate::selector::{DelegateProtocol, Selector};
use crate::target::ForwardTarget;

/// Unique identifier of a proxy instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProxyId(pub Uuid);

impl ProxyId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProxyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters describing what the proxy did with the calls routed through it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStats {
    /// Calls routed through the dispatcher
    pub calls_dispatched: u64,
    /// Calls handled by a wired implementation
    pub calls_wired: u64,
    /// Calls delivered to the forward target
    pub calls_forwarded: u64,
    /// Calls with neither a wired implementation nor a live target
    pub calls_unanswered: u64,
    /// Observer failures across both hook phases
    pub observer_failures: u64,
    /// Forward target assignments (including clears)
    pub target_changes: u64,
}

/// Delegate interception proxy for protocol `P`.
pub struct InterceptionProxy<P: DelegateProtocol> {
    id: ProxyId,
    config: ProxyConfig,
    target: RefCell<ForwardTarget<P::Delegate>>,
    before: HookRegistry<P::Selector>,
    after: HookRegistry<P::Selector>,
    stats: Cell<ProxyStats>,
    sequence: Cell<u64>,
    depth: Cell<u32>,
}

impl<P: DelegateProtocol> InterceptionProxy<P> {
    /// Create a proxy with the given configuration and no forward target.
    pub fn new(config: ProxyConfig) -> Self {
        let id = ProxyId::new();
        debug!(proxy = %config.name, %id, "Created delegate proxy");
        Self {
            id,
            config,
            target: RefCell::new(ForwardTarget::Empty),
            before: HookRegistry::new(HookPhase::Before),
            after: HookRegistry::new(HookPhase::After),
            stats: Cell::new(ProxyStats::default()),
            sequence: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    /// Create a proxy with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ProxyConfig::default())
    }

    /// Identifier of this proxy.
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Replace the forward target.
    ///
    /// `retain` selects whether the proxy owns `target`. The replacement is
    /// committed before the previous target is released, so a destructor
    /// that calls back into the proxy observes the new state. Passing `None`
    /// clears the target.
    ///
    /// Conformance of `target` to the delegate capability set is enforced by
    /// its type; the proxy performs no further checks.
    pub fn set_forward_target(&self, target: Option<Rc<P::Delegate>>, retain: bool) {
        let next = ForwardTarget::new(target, retain);
        let previous = self.target.replace(next);
        self.record(|stats| stats.target_changes += 1);

        debug!(
            proxy = %self.config.name,
            previous = ?previous,
            retain,
            "Forward target replaced"
        );
        drop(previous);

        self.check_observed_selectors();
    }

    /// Current forward target, if one is attached and still alive.
    pub fn forward_to_delegate(&self) -> Option<Rc<P::Delegate>> {
        self.target.borrow().get()
    }

    /// Whether the proxy owns its current forward target.
    pub fn retains_target(&self) -> bool {
        self.target.borrow().is_owning()
    }

    /// Whether the proxy implements `selector` itself.
    pub fn has_wired_implementation(&self, selector: P::Selector) -> bool {
        P::wired_selectors().contains(&selector)
    }

    /// Like [`has_wired_implementation`](Self::has_wired_implementation), by
    /// selector name. Unknown names answer `false`.
    pub fn has_wired_selector_named(&self, name: &str) -> bool {
        P::Selector::from_name(name)
            .map(|selector| self.has_wired_implementation(selector))
            .unwrap_or(false)
    }

    /// Whether `selector`'s result carries no value back to the caller.
    pub fn is_void_selector(&self, selector: P::Selector) -> bool {
        selector.returns_void()
    }

    /// Like [`is_void_selector`](Self::is_void_selector), by selector name.
    /// Unknown names answer `false`.
    pub fn is_void_selector_named(&self, name: &str) -> bool {
        P::Selector::from_name(name)
            .map(|selector| self.is_void_selector(selector))
            .unwrap_or(false)
    }

    /// Notify pre-hooks registered for the call, in registration order.
    pub fn before_forward(&self, call: &CallContext<P::Selector>) -> HookReport {
        self.before.notify(call)
    }

    /// Notify post-hooks registered for the call, in registration order.
    pub fn after_forward(&self, call: &CallContext<P::Selector>) -> HookReport {
        self.after.notify(call)
    }

    /// Observe calls to `selector` before they are dispatched.
    pub fn sent_message(
        &self,
        selector: P::Selector,
        observer: Rc<dyn CallObserver<P::Selector>>,
    ) -> ProxyResult<HookKey> {
        self.check_selector_is_observable(selector)?;
        Ok(self.before.register(selector, observer))
    }

    /// Observe calls to `selector` after they have been dispatched.
    pub fn method_invoked(
        &self,
        selector: P::Selector,
        observer: Rc<dyn CallObserver<P::Selector>>,
    ) -> ProxyResult<HookKey> {
        self.check_selector_is_observable(selector)?;
        Ok(self.after.register(selector, observer))
    }

    /// Remove an observer. Unknown keys return `false`.
    pub fn remove_observer(&self, key: HookKey) -> bool {
        match key.phase() {
            HookPhase::Before => self.before.remove(key),
            HookPhase::After => self.after.remove(key),
        }
    }

    /// Whether any observer watches `selector`.
    pub fn has_observers(&self, selector: P::Selector) -> bool {
        self.before.has_observers(selector) || self.after.has_observers(selector)
    }

    /// Whether a call to `selector` reaches anyone: the proxy itself, the
    /// forward target, or observers of a void call.
    ///
    /// Hosts use this to skip optional calls nobody answers.
    pub fn responds_to(&self, selector: P::Selector) -> bool {
        self.has_wired_implementation(selector)
            || self
                .forward_to_delegate()
                .map(|delegate| P::target_responds(&delegate, selector))
                .unwrap_or(false)
            || (self.is_void_selector(selector) && self.has_observers(selector))
    }

    /// Install `target` as the forward target and return a guard that clears
    /// it again when dropped.
    ///
    /// Fails if a live target is already attached: installing would silently
    /// cut off whoever relied on it.
    pub fn install_forward_delegate(
        self: &Rc<Self>,
        target: Rc<P::Delegate>,
        retain: bool,
    ) -> ProxyResult<ForwardGuard<P>> {
        if self.target.borrow().is_live() {
            return Err(ProxyError::TargetAlreadyInstalled {
                proxy: self.config.name.clone(),
            });
        }

        let guard = ForwardGuard {
            proxy: Rc::downgrade(self),
            target: Rc::downgrade(&target),
            retain,
        };
        self.set_forward_target(Some(target), retain);
        Ok(guard)
    }

    /// Snapshot of the proxy's counters.
    pub fn stats(&self) -> ProxyStats {
        self.stats.get()
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut ProxyStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    /// Open the scope of one dispatched call.
    pub(crate) fn enter_call(&self) -> CallScope<'_, P> {
        let sequence = self.sequence.get();
        self.sequence.set(sequence.wrapping_add(1));
        let depth = self.depth.get();
        self.depth.set(depth + 1);
        self.record(|stats| stats.calls_dispatched += 1);

        CallScope {
            proxy: self,
            sequence,
            depth,
        }
    }

    fn check_selector_is_observable(&self, selector: P::Selector) -> ProxyResult<()> {
        if self.has_wired_implementation(selector) {
            debug!(
                proxy = %self.config.name,
                selector = selector.name(),
                "Delegate proxy already implements this call; its wired implementation may expose a cheaper signal"
            );
            return Ok(());
        }

        if !self.is_void_selector(selector) {
            if self.config.strict_observation {
                return Err(ProxyError::SelectorNotObservable {
                    selector: selector.name().to_string(),
                });
            }
            warn!(
                proxy = %self.config.name,
                selector = selector.name(),
                "Observing a call that returns a value; observers see it but cannot influence the result"
            );
        }

        self.warn_if_target_ignores(selector);
        Ok(())
    }

    fn check_observed_selectors(&self) {
        let observed: HashSet<P::Selector> = self
            .before
            .counts()
            .into_keys()
            .chain(self.after.counts().into_keys())
            .collect();

        for selector in observed {
            if !self.has_wired_implementation(selector) {
                self.warn_if_target_ignores(selector);
            }
        }
    }

    fn warn_if_target_ignores(&self, selector: P::Selector) {
        // Without a target the check is premature.
        if let Some(delegate) = self.forward_to_delegate() {
            if !P::target_responds(&delegate, selector) {
                warn!(
                    proxy = %self.config.name,
                    selector = selector.name(),
                    "Forward target does not respond to an observed call"
                );
            }
        }
    }
}

impl<P: DelegateProtocol> Drop for InterceptionProxy<P> {
    fn drop(&mut self) {
        let mut failures = self.before.complete_all();
        failures.extend(self.after.complete_all());
        for failure in failures {
            warn!(
                proxy = %self.config.name,
                observer = %failure.observer,
                "Observer panicked on completion: {}",
                failure.message
            );
        }
    }
}

impl<P: DelegateProtocol> fmt::Debug for InterceptionProxy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionProxy")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("target", &*self.target.borrow())
            .field("before_hooks", &self.before.len())
            .field("after_hooks", &self.after.len())
            .finish()
    }
}

/// Sequence number and nesting depth of a call in flight. Restores the
/// depth when dropped, even if the call unwinds.
pub(crate) struct CallScope<'p, P: DelegateProtocol> {
    proxy: &'p InterceptionProxy<P>,
    pub(crate) sequence: u64,
    pub(crate) depth: u32,
}

impl<P: DelegateProtocol> Drop for CallScope<'_, P> {
    fn drop(&mut self) {
        self.proxy.depth.set(self.depth);
    }
}

/// Clears an installed forward delegate when dropped.
///
/// If the proxy's target was changed to another delegate in the meantime the
/// guard leaves it alone.
#[must_use = "dropping the guard immediately uninstalls the forward delegate"]
pub struct ForwardGuard<P: DelegateProtocol> {
    proxy: Weak<InterceptionProxy<P>>,
    target: Weak<P::Delegate>,
    retain: bool,
}

impl<P: DelegateProtocol> ForwardGuard<P> {
    /// Whether the guarded delegate is still the proxy's forward target.
    pub fn is_installed(&self) -> bool {
        match (self.proxy.upgrade(), self.target.upgrade()) {
            (Some(proxy), Some(target)) => proxy.target.borrow().points_to(&target),
            _ => false,
        }
    }
}

impl<P: DelegateProtocol> fmt::Debug for ForwardGuard<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardGuard")
            .field("proxy_alive", &(self.proxy.strong_count() > 0))
            .field("target_alive", &(self.target.strong_count() > 0))
            .field("retain", &self.retain)
            .finish()
    }
}

impl<P: DelegateProtocol> Drop for ForwardGuard<P> {
    fn drop(&mut self) {
        let Some(proxy) = self.proxy.upgrade() else {
            return;
        };

        let still_ours = match self.target.upgrade() {
            Some(target) => proxy.target.borrow().points_to(&target),
            // A dead delegate cannot be the live forward target.
            None => false,
        };

        if still_ours {
            proxy.set_forward_target(None, self.retain);
        } else {
            warn!(
                proxy = %proxy.config.name,
                "Guarded forward delegate is no longer installed; leaving the current target in place"
            );
        }
    }
}
