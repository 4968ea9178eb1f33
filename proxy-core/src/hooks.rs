//! Call hooks observed around each intercepted delegate call.
//!
//! Observers register for a selector and a phase (before or after dispatch)
//! and are notified in registration order. Every observer runs in isolation:
//! an error or a panic is captured as an [`ObserverFailure`] and the remaining
//! observers, as well as the call itself, still run.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{ObserverError, ObserverFailure};
use crate::selector::Selector;

/// When a hook fires relative to the dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the call reaches the wired implementation or the forward target
    Before,
    /// After the call has been dispatched (or would have been)
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => f.write_str("before"),
            HookPhase::After => f.write_str("after"),
        }
    }
}

/// Registration handle returned when an observer is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookKey {
    phase: HookPhase,
    raw: u64,
}

impl HookKey {
    /// Phase the observer was registered for.
    pub fn phase(&self) -> HookPhase {
        self.phase
    }
}

/// Context of one intercepted call, as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext<S> {
    /// The intercepted call
    pub selector: S,
    /// Call arguments in their observable form
    pub arguments: Vec<Value>,
    /// Per-proxy sequence number of the call
    pub sequence: u64,
    /// Nesting depth; 0 unless dispatched from inside another call
    pub depth: u32,
    /// When the call was intercepted
    pub timestamp: DateTime<Utc>,
}

impl<S: Selector> CallContext<S> {
    /// Create a context for a top-level call.
    pub fn new(selector: S, arguments: Vec<Value>) -> Self {
        Self {
            selector,
            arguments,
            sequence: 0,
            depth: 0,
            timestamp: Utc::now(),
        }
    }

    /// Name of the intercepted call.
    pub fn name(&self) -> &'static str {
        self.selector.name()
    }
}

/// Observer of intercepted calls.
pub trait CallObserver<S: Selector> {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// React to an intercepted call.
    fn on_call(&self, call: &CallContext<S>) -> Result<(), ObserverError>;

    /// The proxy is going away; no further calls will be observed.
    fn on_completed(&self) {}
}

/// Adapter turning a closure into a [`CallObserver`].
///
/// ```rust
/// use proxy_core::hooks::{CallContext, CallObserver, FnObserver};
/// use proxy_core::Selector;
/// # #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// # enum Tap { Tapped }
/// # impl Selector for Tap {
/// #     const ALL: &'static [Self] = &[Tap::Tapped];
/// #     fn name(&self) -> &'static str { "tapped" }
/// #     fn returns_void(&self) -> bool { true }
/// # }
///
/// let observer = FnObserver::new("print", |call: &CallContext<Tap>| {
///     println!("{} {:?}", call.name(), call.arguments);
///     Ok(())
/// });
/// assert_eq!(CallObserver::<Tap>::name(&observer), "print");
/// ```
pub struct FnObserver<F> {
    name: String,
    callback: F,
}

impl<F> FnObserver<F> {
    /// Wrap `callback` under `name`.
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<S, F> CallObserver<S> for FnObserver<F>
where
    S: Selector,
    F: Fn(&CallContext<S>) -> Result<(), ObserverError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_call(&self, call: &CallContext<S>) -> Result<(), ObserverError> {
        (self.callback)(call)
    }
}

/// Outcome of notifying one hook phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    /// Observers that were invoked
    pub notified: usize,
    /// Observers that failed, in notification order
    pub failures: Vec<ObserverFailure>,
}

impl HookReport {
    /// True when every notified observer succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: HookReport) {
        self.notified += other.notified;
        self.failures.extend(other.failures);
    }
}

struct HookEntry<S: Selector> {
    key: HookKey,
    selector: S,
    observer: Rc<dyn CallObserver<S>>,
}

/// Registration-ordered observers for one hook phase.
pub struct HookRegistry<S: Selector> {
    phase: HookPhase,
    next_key: Cell<u64>,
    entries: RefCell<Vec<HookEntry<S>>>,
}

impl<S: Selector> HookRegistry<S> {
    /// Create an empty registry for `phase`.
    pub fn new(phase: HookPhase) -> Self {
        Self {
            phase,
            next_key: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Register `observer` for calls to `selector`.
    pub fn register(&self, selector: S, observer: Rc<dyn CallObserver<S>>) -> HookKey {
        let key = HookKey {
            phase: self.phase,
            raw: self.next_key.get(),
        };
        self.next_key.set(key.raw.wrapping_add(1));

        self.entries.borrow_mut().push(HookEntry {
            key,
            selector,
            observer,
        });
        key
    }

    /// Remove a registration. Unknown or already removed keys return `false`.
    pub fn remove(&self, key: HookKey) -> bool {
        if key.phase != self.phase {
            return false;
        }
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries
                .iter()
                .position(|entry| entry.key == key)
                .map(|index| entries.remove(index))
        };
        // The entry may hold the last reference to the observer; drop it
        // only once the borrow is released.
        removed.is_some()
    }

    /// Whether any observer is registered for `selector`.
    pub fn has_observers(&self, selector: S) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| entry.selector == selector)
    }

    /// Number of registrations per selector.
    pub fn counts(&self) -> HashMap<S, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.borrow().iter() {
            *counts.entry(entry.selector).or_insert(0) += 1;
        }
        counts
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Notify the observers registered for the call's selector.
    ///
    /// The observer list is snapshotted first, so registrations added or
    /// removed from inside a callback take effect from the next call on.
    pub fn notify(&self, call: &CallContext<S>) -> HookReport {
        let observers: Vec<Rc<dyn CallObserver<S>>> = self
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.selector == call.selector)
            .map(|entry| Rc::clone(&entry.observer))
            .collect();

        let mut report = HookReport::default();
        for observer in observers {
            report.notified += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_call(call)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => ObserverFailure {
                    observer: observer.name().to_string(),
                    phase: self.phase,
                    message: error.message,
                    panicked: false,
                },
                Err(payload) => ObserverFailure {
                    observer: observer.name().to_string(),
                    phase: self.phase,
                    message: panic_message(payload.as_ref()),
                    panicked: true,
                },
            };
            report.failures.push(failure);
        }
        report
    }

    /// Drop every registration, telling each observer it has completed.
    ///
    /// A panicking observer does not keep the others from completing; its
    /// panic is returned as a failure.
    pub fn complete_all(&self) -> Vec<ObserverFailure> {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        let mut failures = Vec::new();
        for entry in entries {
            let observer = entry.observer;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer.on_completed())) {
                failures.push(ObserverFailure {
                    observer: observer.name().to_string(),
                    phase: self.phase,
                    message: panic_message(payload.as_ref()),
                    panicked: true,
                });
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "observer panicked".to_string()
    }
}
