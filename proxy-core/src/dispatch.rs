//! Dispatch driver.
//!
//! Routes one delegate call through the proxy:
//!
//! 1. capture the current forward target (the in-flight forward decision),
//! 2. notify pre-hooks,
//! 3. run the wired implementation if the proxy has one for the selector,
//!    otherwise forward to the captured target, otherwise run the fallback,
//! 4. notify post-hooks,
//! 5. apply the configured observer failure policy.
//!
//! Hooks always fire, whether or not a target exists and whether or not a
//! wired implementation chose to forward.
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use proxy_core::{DelegateProtocol, InterceptionProxy, Selector};
//!
//! trait Counter {
//!     fn increment(&self, by: u32) -> u32;
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum CounterSelector {
//!     Increment,
//! }
//!
//! impl Selector for CounterSelector {
//!     const ALL: &'static [Self] = &[CounterSelector::Increment];
//!     fn name(&self) -> &'static str { "increment:" }
//!     fn returns_void(&self) -> bool { false }
//! }
//!
//! struct CounterProtocol;
//!
//! impl DelegateProtocol for CounterProtocol {
//!     type Selector = CounterSelector;
//!     type Delegate = dyn Counter;
//! }
//!
//! struct Doubler;
//!
//! impl Counter for Doubler {
//!     fn increment(&self, by: u32) -> u32 { by * 2 }
//! }
//!
//! let proxy = InterceptionProxy::<CounterProtocol>::with_defaults();
//! let fallback = proxy
//!     .invocation(CounterSelector::Increment, vec![json!(3)])
//!     .dispatch(|counter| counter.increment(3), || 0)
//!     .unwrap();
//! assert_eq!(fallback, 0);
//!
//! proxy.set_forward_target(Some(Rc::new(Doubler)), true);
//! let forwarded = proxy
//!     .invocation(CounterSelector::Increment, vec![json!(3)])
//!     .dispatch(|counter| counter.increment(3), || 0)
//!     .unwrap();
//! assert_eq!(forwarded, 6);
//! ```

use std::rc::Rc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ObserverFailurePolicy;
use crate::error::{ProxyError, ProxyResult};
use crate::hooks::{CallContext, HookReport};
use crate::proxy::InterceptionProxy;
use crate::selector::{DelegateProtocol, Selector};

type WiredFn<'p, P, R> = Box<dyn FnOnce(&Call<'_, P>) -> R + 'p>;

/// A call about to be routed through a proxy.
#[must_use = "an invocation does nothing until it is dispatched"]
pub struct Invocation<'p, P: DelegateProtocol, R> {
    proxy: &'p InterceptionProxy<P>,
    selector: P::Selector,
    arguments: Vec<Value>,
    wired: Option<WiredFn<'p, P, R>>,
}

/// Handle given to a wired implementation while it runs.
///
/// Forwarding is available but never forced: the implementation may forward,
/// transform the result, or skip the target entirely.
pub struct Call<'c, P: DelegateProtocol> {
    proxy: &'c InterceptionProxy<P>,
    context: &'c CallContext<P::Selector>,
    target: Option<&'c P::Delegate>,
}

impl<P: DelegateProtocol> InterceptionProxy<P> {
    /// Start routing a call to `selector` with observable `arguments`.
    pub fn invocation<R>(
        &self,
        selector: P::Selector,
        arguments: Vec<Value>,
    ) -> Invocation<'_, P, R> {
        Invocation {
            proxy: self,
            selector,
            arguments,
            wired: None,
        }
    }
}

impl<'p, P: DelegateProtocol, R> Invocation<'p, P, R> {
    /// Supply the proxy's own implementation of the call.
    ///
    /// Only consulted when the protocol lists the selector as wired.
    pub fn wired(mut self, implementation: impl FnOnce(&Call<'_, P>) -> R + 'p) -> Self {
        self.wired = Some(Box::new(implementation));
        self
    }

    /// Route the call.
    ///
    /// `forward` delivers the call to the target when the proxy has no wired
    /// implementation; `fallback` produces the result when there is neither a
    /// wired implementation nor a live target.
    pub fn dispatch(
        self,
        forward: impl FnOnce(&P::Delegate) -> R,
        fallback: impl FnOnce() -> R,
    ) -> ProxyResult<R> {
        let Invocation {
            proxy,
            selector,
            arguments,
            wired,
        } = self;

        let wired = if proxy.has_wired_implementation(selector) {
            match wired {
                Some(implementation) => Some(implementation),
                None => {
                    return Err(ProxyError::MissingWiredImplementation {
                        selector: selector.name().to_string(),
                    })
                }
            }
        } else {
            None
        };

        // Re-entrant target changes from here on only affect the next call.
        let target: Option<Rc<P::Delegate>> = proxy.forward_to_delegate();

        let scope = proxy.enter_call();
        let context = CallContext {
            selector,
            arguments,
            sequence: scope.sequence,
            depth: scope.depth,
            timestamp: Utc::now(),
        };

        if proxy.config().log_calls {
            debug!(
                proxy = %proxy.config().name,
                selector = selector.name(),
                sequence = context.sequence,
                depth = context.depth,
                wired = wired.is_some(),
                has_target = target.is_some(),
                "Dispatching delegate call"
            );
        }

        let mut report = proxy.before_forward(&context);

        let value = match (wired, target.as_deref()) {
            (Some(implementation), target) => {
                proxy.record(|stats| stats.calls_wired += 1);
                let call = Call {
                    proxy,
                    context: &context,
                    target,
                };
                implementation(&call)
            }
            (None, Some(delegate)) => {
                proxy.record(|stats| stats.calls_forwarded += 1);
                forward(delegate)
            }
            (None, None) => {
                proxy.record(|stats| stats.calls_unanswered += 1);
                fallback()
            }
        };

        report.merge(proxy.after_forward(&context));
        drop(scope);
        drop(target);

        proxy.settle(&context, report)?;
        Ok(value)
    }
}

impl<'p, P: DelegateProtocol> Invocation<'p, P, ()> {
    /// Route a call that returns nothing.
    pub fn notify(self, forward: impl FnOnce(&P::Delegate)) -> ProxyResult<()> {
        self.dispatch(forward, || ())
    }
}

impl<'c, P: DelegateProtocol> Call<'c, P> {
    /// The proxy the call was routed through.
    pub fn proxy(&self) -> &'c InterceptionProxy<P> {
        self.proxy
    }

    /// Context of the call, as observers see it.
    pub fn context(&self) -> &'c CallContext<P::Selector> {
        self.context
    }

    /// The intercepted selector.
    pub fn selector(&self) -> P::Selector {
        self.context.selector
    }

    /// Observable arguments of the call.
    pub fn arguments(&self) -> &'c [Value] {
        &self.context.arguments
    }

    /// Forward target captured when the call started, if any.
    pub fn target(&self) -> Option<&'c P::Delegate> {
        self.target
    }

    /// Deliver the call to the forward target, if there is one.
    pub fn forward<T>(&self, deliver: impl FnOnce(&P::Delegate) -> T) -> Option<T> {
        let target = self.target?;
        self.proxy.record(|stats| stats.calls_forwarded += 1);
        Some(deliver(target))
    }
}

impl<P: DelegateProtocol> InterceptionProxy<P> {
    fn settle(&self, call: &CallContext<P::Selector>, report: HookReport) -> ProxyResult<()> {
        if report.is_clean() {
            return Ok(());
        }

        let failed = report.failures.len() as u64;
        self.record(|stats| stats.observer_failures += failed);

        match self.config().failure_policy {
            ObserverFailurePolicy::Ignore => Ok(()),
            ObserverFailurePolicy::Log => {
                for failure in &report.failures {
                    warn!(
                        proxy = %self.config().name,
                        selector = call.name(),
                        sequence = call.sequence,
                        observer = %failure.observer,
                        phase = %failure.phase,
                        panicked = failure.panicked,
                        "Observer failed: {}",
                        failure.message
                    );
                }
                Ok(())
            }
            ObserverFailurePolicy::Propagate => Err(ProxyError::ObserverFailures {
                selector: call.name().to_string(),
                failures: report.failures,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::error::ObserverError;
    use crate::hooks::{CallObserver, FnObserver, HookPhase};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::cell::RefCell;
    use tracing_test::traced_test;

    trait EventDelegate {
        fn on_event(&self, value: i64);
        fn should_begin(&self) -> bool;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Sel {
        OnEvent,
        ShouldBegin,
        OnWired,
    }

    impl Selector for Sel {
        const ALL: &'static [Self] = &[Sel::OnEvent, Sel::ShouldBegin, Sel::OnWired];

        fn name(&self) -> &'static str {
            match self {
                Sel::OnEvent => "onEvent",
                Sel::ShouldBegin => "shouldBegin",
                Sel::OnWired => "onWired",
            }
        }

        fn returns_void(&self) -> bool {
            !matches!(self, Sel::ShouldBegin)
        }
    }

    struct Protocol;

    impl DelegateProtocol for Protocol {
        type Selector = Sel;
        type Delegate = dyn EventDelegate;

        fn wired_selectors() -> &'static [Sel] {
            &[Sel::OnWired]
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    struct Target {
        log: Log,
    }

    impl EventDelegate for Target {
        fn on_event(&self, value: i64) {
            self.log.borrow_mut().push(format!("target({})", value));
        }

        fn should_begin(&self) -> bool {
            self.log.borrow_mut().push("target(shouldBegin)".to_string());
            false
        }
    }

    fn hook(label: &'static str, log: &Log) -> Rc<dyn CallObserver<Sel>> {
        let log = Rc::clone(log);
        Rc::new(FnObserver::new(label, move |call: &CallContext<Sel>| {
            log.borrow_mut().push(format!(
                "{}({},{})",
                label,
                call.name(),
                Value::Array(call.arguments.clone())
            ));
            Ok(())
        }))
    }

    fn observed_proxy(config: ProxyConfig, selector: Sel, log: &Log) -> InterceptionProxy<Protocol> {
        let proxy = InterceptionProxy::new(config);
        proxy.sent_message(selector, hook("before", log)).unwrap();
        proxy.method_invoked(selector, hook("after", log)).unwrap();
        proxy
    }

    fn on_event(proxy: &InterceptionProxy<Protocol>, value: i64) -> ProxyResult<()> {
        proxy
            .invocation(Sel::OnEvent, vec![json!(value)])
            .notify(|delegate| delegate.on_event(value))
    }

    #[test]
    fn test_forward_to_owned_target_in_order() {
        let log: Log = Rc::default();
        let proxy = observed_proxy(ProxyConfig::default(), Sel::OnEvent, &log);
        proxy.set_forward_target(Some(Rc::new(Target { log: Rc::clone(&log) })), true);

        on_event(&proxy, 42).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["before(onEvent,[42])", "target(42)", "after(onEvent,[42])"]
        );
        let stats = proxy.stats();
        assert_eq!(stats.calls_dispatched, 1);
        assert_eq!(stats.calls_forwarded, 1);
    }

    #[test]
    fn test_sequential_calls_never_interleave() {
        let log: Log = Rc::default();
        let proxy = observed_proxy(ProxyConfig::default(), Sel::OnEvent, &log);
        proxy.set_forward_target(Some(Rc::new(Target { log: Rc::clone(&log) })), true);

        on_event(&proxy, 1).unwrap();
        on_event(&proxy, 2).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "before(onEvent,[1])",
                "target(1)",
                "after(onEvent,[1])",
                "before(onEvent,[2])",
                "target(2)",
                "after(onEvent,[2])",
            ]
        );
    }

    #[test]
    fn test_no_target_still_fires_both_hooks_once() {
        let log: Log = Rc::default();
        let proxy = observed_proxy(ProxyConfig::default(), Sel::OnEvent, &log);

        on_event(&proxy, 5).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["before(onEvent,[5])", "after(onEvent,[5])"]
        );
        assert_eq!(proxy.stats().calls_unanswered, 1);
    }

    #[test]
    fn test_fallback_supplies_result_without_target() {
        let proxy = InterceptionProxy::<Protocol>::with_defaults();
        let begin = proxy
            .invocation(Sel::ShouldBegin, Vec::new())
            .dispatch(|delegate| delegate.should_begin(), || true)
            .unwrap();
        assert!(begin);
    }

    #[test]
    fn test_wired_implementation_may_skip_target() {
        let log: Log = Rc::default();
        let proxy = observed_proxy(ProxyConfig::default(), Sel::OnWired, &log);
        proxy.set_forward_target(Some(Rc::new(Target { log: Rc::clone(&log) })), true);

        let wired_log = Rc::clone(&log);
        proxy
            .invocation(Sel::OnWired, vec![json!(42)])
            .wired(move |call| {
                assert!(call.target().is_some());
                wired_log.borrow_mut().push("wired".to_string());
            })
            .notify(|delegate| delegate.on_event(42))
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["before(onWired,[42])", "wired", "after(onWired,[42])"]
        );
        let stats = proxy.stats();
        assert_eq!(stats.calls_wired, 1);
        assert_eq!(stats.calls_forwarded, 0);
    }

    #[test]
    fn test_wired_implementation_may_forward_explicitly() {
        let log: Log = Rc::default();
        let proxy = observed_proxy(ProxyConfig::default(), Sel::OnWired, &log);
        proxy.set_forward_target(Some(Rc::new(Target { log: Rc::clone(&log) })), true);

        let forwarded = proxy
            .invocation(Sel::OnWired, vec![json!(9)])
            .wired(|call| {
                let value = call.arguments()[0].as_i64().unwrap_or_default();
                call.forward(|delegate| delegate.on_event(value * 10)).is_some()
            })
            .dispatch(|_| false, || false)
            .unwrap();

        assert!(forwarded);
        assert_eq!(
            *log.borrow(),
            vec!["before(onWired,[9])", "target(90)", "after(onWired,[9])"]
        );
        assert_eq!(proxy.stats().calls_forwarded, 1);
    }

    #[test]
    fn test_wired_selector_without_implementation_is_a_contract_violation() {
        let log: Log = Rc::default();
        let proxy = observed_proxy(ProxyConfig::default(), Sel::OnWired, &log);

        let result = proxy
            .invocation(Sel::OnWired, Vec::new())
            .notify(|delegate| delegate.on_event(0));

        assert_matches!(result, Err(ProxyError::MissingWiredImplementation { .. }));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_detach_in_before_hook_keeps_in_flight_decision() {
        let log: Log = Rc::default();
        let proxy = Rc::new(InterceptionProxy::<Protocol>::with_defaults());

        let weak = Rc::downgrade(&proxy);
        proxy
            .sent_message(
                Sel::OnEvent,
                Rc::new(FnObserver::new("detach", move |_: &CallContext<Sel>| {
                    if let Some(proxy) = weak.upgrade() {
                        proxy.set_forward_target(None, false);
                    }
                    Ok(())
                })),
            )
            .unwrap();

        let target: Rc<dyn EventDelegate> = Rc::new(Target { log: Rc::clone(&log) });
        proxy.set_forward_target(Some(Rc::clone(&target)), true);
        drop(target);

        on_event(&proxy, 1).unwrap();
        assert_eq!(*log.borrow(), vec!["target(1)"]);
        assert!(proxy.forward_to_delegate().is_none());

        on_event(&proxy, 2).unwrap();
        assert_eq!(*log.borrow(), vec!["target(1)"]);
        assert_eq!(proxy.stats().calls_unanswered, 1);
    }

    fn position(seen: &Rc<RefCell<Vec<(Sel, u64, u32)>>>) -> Rc<dyn CallObserver<Sel>> {
        let seen = Rc::clone(seen);
        Rc::new(FnObserver::new("position", move |call: &CallContext<Sel>| {
            seen.borrow_mut()
                .push((call.selector, call.sequence, call.depth));
            Ok(())
        }))
    }

    #[test]
    fn test_nested_dispatch_is_bracketed_inside_outer_call() {
        let log: Log = Rc::default();
        let proxy = Rc::new(InterceptionProxy::<Protocol>::with_defaults());
        let positions: Rc<RefCell<Vec<(Sel, u64, u32)>>> = Rc::default();
        proxy.sent_message(Sel::OnEvent, hook("before", &log)).unwrap();
        proxy.sent_message(Sel::OnEvent, position(&positions)).unwrap();
        proxy.method_invoked(Sel::OnEvent, hook("after", &log)).unwrap();

        let weak = Rc::downgrade(&proxy);
        let seen = Rc::clone(&positions);
        proxy
            .method_invoked(
                Sel::OnWired,
                Rc::new(FnObserver::new("nest", move |call: &CallContext<Sel>| {
                    seen.borrow_mut()
                        .push((call.selector, call.sequence, call.depth));
                    if let Some(proxy) = weak.upgrade() {
                        let _ = on_event(&proxy, 7);
                    }
                    seen.borrow_mut()
                        .push((call.selector, call.sequence, call.depth));
                    Ok(())
                })),
            )
            .unwrap();

        proxy
            .invocation(Sel::OnWired, Vec::new())
            .wired(|_| ())
            .notify(|_| ())
            .unwrap();
        on_event(&proxy, 8).unwrap();

        assert_eq!(
            *positions.borrow(),
            vec![
                (Sel::OnWired, 0, 0),
                (Sel::OnEvent, 1, 1),
                (Sel::OnWired, 0, 0),
                (Sel::OnEvent, 2, 0),
            ]
        );
        assert_eq!(
            *log.borrow(),
            vec![
                "before(onEvent,[7])",
                "after(onEvent,[7])",
                "before(onEvent,[8])",
                "after(onEvent,[8])",
            ]
        );
        assert_eq!(proxy.stats().calls_dispatched, 3);
    }

    #[test]
    fn test_depth_is_restored_when_wired_body_unwinds() {
        let proxy = InterceptionProxy::<Protocol>::with_defaults();
        let positions: Rc<RefCell<Vec<(Sel, u64, u32)>>> = Rc::default();
        proxy.sent_message(Sel::OnEvent, position(&positions)).unwrap();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = proxy
                .invocation(Sel::OnWired, Vec::new())
                .wired(|_| panic!("wired body failed"))
                .notify(|_| ());
        }));
        assert!(unwound.is_err());

        on_event(&proxy, 1).unwrap();
        assert_eq!(*positions.borrow(), vec![(Sel::OnEvent, 1, 0)]);
    }

    #[test]
    #[traced_test]
    fn test_log_policy_reports_and_continues() {
        let log: Log = Rc::default();
        let proxy = InterceptionProxy::<Protocol>::new(ProxyConfig::named("events"));
        proxy
            .sent_message(
                Sel::OnEvent,
                Rc::new(FnObserver::new("broken", |_: &CallContext<Sel>| {
                    Err(ObserverError::new("cannot record"))
                })),
            )
            .unwrap();
        proxy.method_invoked(Sel::OnEvent, hook("after", &log)).unwrap();
        proxy.set_forward_target(Some(Rc::new(Target { log: Rc::clone(&log) })), true);

        on_event(&proxy, 3).unwrap();

        assert_eq!(*log.borrow(), vec!["target(3)", "after(onEvent,[3])"]);
        assert_eq!(proxy.stats().observer_failures, 1);
        assert!(logs_contain("Observer failed: cannot record"));
    }

    #[test]
    fn test_propagate_policy_runs_everything_then_fails() {
        let log: Log = Rc::default();
        let config = ProxyConfig {
            failure_policy: ObserverFailurePolicy::Propagate,
            ..ProxyConfig::default()
        };
        let proxy = InterceptionProxy::<Protocol>::new(config);
        proxy
            .sent_message(
                Sel::OnEvent,
                Rc::new(FnObserver::new("panicky", |_: &CallContext<Sel>| -> Result<(), ObserverError> {
                    panic!("observer bug")
                })),
            )
            .unwrap();
        proxy.method_invoked(Sel::OnEvent, hook("after", &log)).unwrap();
        proxy.set_forward_target(Some(Rc::new(Target { log: Rc::clone(&log) })), true);

        let result = on_event(&proxy, 4);

        assert_eq!(*log.borrow(), vec!["target(4)", "after(onEvent,[4])"]);
        assert_matches!(result, Err(ProxyError::ObserverFailures { failures, .. }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].phase, HookPhase::Before);
            assert!(failures[0].panicked);
        });
    }

    #[test]
    fn test_ignore_policy_drops_failures() {
        let config = ProxyConfig {
            failure_policy: ObserverFailurePolicy::Ignore,
            ..ProxyConfig::default()
        };
        let proxy = InterceptionProxy::<Protocol>::new(config);
        proxy
            .method_invoked(
                Sel::OnEvent,
                Rc::new(FnObserver::new("broken", |_: &CallContext<Sel>| {
                    Err(ObserverError::new("ignored"))
                })),
            )
            .unwrap();

        assert!(on_event(&proxy, 1).is_ok());
        assert_eq!(proxy.stats().observer_failures, 1);
    }
}
