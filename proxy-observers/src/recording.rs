//! Recording observer that keeps intercepted calls for later inspection

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use proxy_core::{CallContext, CallObserver, ObserverError, Selector};

/// Observer that records every call it sees.
///
/// With a capacity set, the oldest records are dropped once it is reached.
pub struct RecordingObserver<S: Selector> {
    name: String,
    capacity: Option<usize>,
    records: RefCell<VecDeque<CallContext<S>>>,
    dropped: Cell<u64>,
    completed: Cell<bool>,
}

impl<S: Selector> RecordingObserver<S> {
    /// Create an unbounded recorder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            records: RefCell::new(VecDeque::new()),
            dropped: Cell::new(0),
            completed: Cell::new(false),
        }
    }

    /// Create a recorder keeping at most `capacity` calls
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(name)
        }
    }

    /// Recorded calls, oldest first
    pub fn records(&self) -> Vec<CallContext<S>> {
        self.records.borrow().iter().cloned().collect()
    }

    /// Recorded selectors, oldest first
    pub fn selectors(&self) -> Vec<S> {
        self.records.borrow().iter().map(|call| call.selector).collect()
    }

    /// Number of recorded calls
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Remove and return every recorded call
    pub fn take(&self) -> Vec<CallContext<S>> {
        self.records.borrow_mut().drain(..).collect()
    }

    /// Calls evicted because the capacity was reached
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    /// Whether the observed proxy has gone away
    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl<S: Selector> CallObserver<S> for RecordingObserver<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_call(&self, call: &CallContext<S>) -> Result<(), ObserverError> {
        let mut records = self.records.borrow_mut();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                self.dropped.set(self.dropped.get() + 1);
                return Ok(());
            }
            while records.len() >= capacity {
                records.pop_front();
                self.dropped.set(self.dropped.get() + 1);
            }
        }
        records.push_back(call.clone());
        Ok(())
    }

    fn on_completed(&self) {
        self.completed.set(true);
    }
}
