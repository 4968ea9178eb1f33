//! Statistics observer counting intercepted calls per selector

use std::cell::RefCell;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use proxy_core::{CallContext, CallObserver, ObserverError, Selector};
use serde::{Deserialize, Serialize};

/// Counters collected by an observer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverStats {
    /// Total calls observed
    pub total_observed: u64,
    /// Calls observed per selector name
    pub by_selector: BTreeMap<String, u64>,
    /// Deepest nesting level seen
    pub max_depth: u32,
    /// Timestamp of the last observed call
    pub last_observed: Option<DateTime<Utc>>,
    /// Whether the observed proxy has gone away
    pub completed: bool,
}

/// Observer that counts calls per selector.
pub struct StatsObserver {
    name: String,
    stats: RefCell<ObserverStats>,
}

impl StatsObserver {
    /// Create a new statistics observer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: RefCell::new(ObserverStats::default()),
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> ObserverStats {
        self.stats.borrow().clone()
    }

    /// Calls observed for one selector
    pub fn count_for<S: Selector>(&self, selector: S) -> u64 {
        self.stats
            .borrow()
            .by_selector
            .get(selector.name())
            .copied()
            .unwrap_or(0)
    }
}

impl Default for StatsObserver {
    fn default() -> Self {
        Self::new("StatsObserver")
    }
}

impl<S: Selector> CallObserver<S> for StatsObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_call(&self, call: &CallContext<S>) -> Result<(), ObserverError> {
        let mut stats = self.stats.borrow_mut();
        stats.total_observed += 1;
        *stats
            .by_selector
            .entry(call.name().to_string())
            .or_insert(0) += 1;
        stats.max_depth = stats.max_depth.max(call.depth);
        stats.last_observed = Some(call.timestamp);
        Ok(())
    }

    fn on_completed(&self) {
        self.stats.borrow_mut().completed = true;
    }
}
