//! Logging observer that traces every intercepted delegate call

use std::cell::Cell;

use proxy_core::{CallContext, CallObserver, ObserverError, Selector};
use serde_json::Value;
use tracing::{debug, info};

/// Observer that logs intercepted calls for debugging and monitoring
pub struct LoggingObserver {
    name: String,
    /// Whether to log call arguments (can be verbose)
    log_arguments: bool,
    total_logged: Cell<u64>,
}

impl LoggingObserver {
    /// Create a new logging observer
    pub fn new(log_arguments: bool) -> Self {
        Self {
            name: "LoggingObserver".to_string(),
            log_arguments,
            total_logged: Cell::new(0),
        }
    }

    /// Number of calls logged so far
    pub fn total_logged(&self) -> u64 {
        self.total_logged.get()
    }
}

impl<S: Selector> CallObserver<S> for LoggingObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_call(&self, call: &CallContext<S>) -> Result<(), ObserverError> {
        if self.log_arguments {
            let arguments = Value::Array(call.arguments.clone());
            info!(
                "[{}] #{} {} {}",
                self.name,
                call.sequence,
                call.name(),
                arguments
            );
        } else {
            debug!(
                "[{}] #{} {} (depth: {})",
                self.name,
                call.sequence,
                call.name(),
                call.depth
            );
        }

        self.total_logged.set(self.total_logged.get() + 1);
        Ok(())
    }

    fn on_completed(&self) {
        debug!("[{}] proxy completed after {} calls", self.name, self.total_logged.get());
    }
}
