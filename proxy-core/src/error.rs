//! Error types for delegate proxy operations.
//!
//! The proxy itself never fails on the call path: a missing forward target is
//! the normal "nobody is listening" state and unknown selectors simply answer
//! `false`. Errors only surface from driver contract violations, observer
//! registration checks, observer failures under the `propagate` policy and
//! configuration loading.

use thiserror::Error;

use crate::hooks::HookPhase;

/// The main error type for all proxy operations.
///
/// # Examples
///
/// ```rust
/// use proxy_core::error::ProxyError;
///
/// let error = ProxyError::SelectorNotObservable {
///     selector: "shouldScrollToTop".to_string(),
/// };
///
/// println!("Error: {}", error);
/// ```
#[derive(Error, Debug)]
pub enum ProxyError {
    /// An observer was registered for a call that returns a value and that
    /// the proxy does not implement itself.
    #[error("Selector `{selector}` returns a value and has no wired implementation; it cannot be observed")]
    SelectorNotObservable {
        /// Name of the rejected selector
        selector: String,
    },

    /// The dispatch driver routed a wired selector without supplying the
    /// proxy-native implementation.
    #[error("Selector `{selector}` is wired but no wired implementation was supplied to the dispatcher")]
    MissingWiredImplementation {
        /// Name of the wired selector
        selector: String,
    },

    /// A forward delegate is already installed on the proxy.
    #[error("A forward delegate is already installed on proxy {proxy}; clear it before installing another")]
    TargetAlreadyInstalled {
        /// Name of the proxy
        proxy: String,
    },

    /// One or more observers failed while the call was dispatched.
    #[error("{} observer(s) failed during `{selector}`: {}", failures.len(), summarize(failures))]
    ObserverFailures {
        /// Name of the dispatched selector
        selector: String,
        /// Every failure collected across both hook phases
        failures: Vec<ObserverFailure>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors (reading configuration files)
    #[error("IO error: {source}")]
    Io {
        #[from]
        /// The underlying IO error
        source: std::io::Error,
    },
}

/// Configuration-related errors.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration file has invalid format
    #[error("Invalid configuration format in {path}: {reason}")]
    InvalidFormat { path: String, reason: String },

    /// Configuration parameter has invalid value
    #[error("Invalid value for parameter '{parameter}': {value} - {reason}")]
    InvalidValue {
        parameter: String,
        value: String,
        reason: String,
    },
}

/// Error returned by an observer from its callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ObserverError {
    /// Human readable failure description
    pub message: String,
}

impl ObserverError {
    /// Create a new observer error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A single isolated observer failure, captured while the remaining observers
/// and the call itself kept running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    /// Name reported by the failing observer
    pub observer: String,
    /// Hook phase the observer was registered for
    pub phase: HookPhase,
    /// Error message, or the panic payload if the observer panicked
    pub message: String,
    /// Whether the observer panicked rather than returning an error
    pub panicked: bool,
}

impl std::fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(f, "{} {} {}: {}", self.observer, kind, self.phase, self.message)
    }
}

fn summarize(failures: &[ObserverFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience type alias for Results using ProxyError.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// Get the error category for this error.
    ///
    /// Useful for log fields and error reporting.
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::SelectorNotObservable { .. } => "registration",
            ProxyError::MissingWiredImplementation { .. } => "contract",
            ProxyError::TargetAlreadyInstalled { .. } => "contract",
            ProxyError::ObserverFailures { .. } => "observer",
            ProxyError::Config(_) => "config",
            ProxyError::Io { .. } => "io",
        }
    }
}
