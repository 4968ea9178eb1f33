//! Built-in observers for delegate interception proxies
//!
//! This crate provides concrete implementations of the `CallObserver` trait
//! for common use cases: logging, recording and per-call statistics.

pub mod logging;
pub mod recording;
pub mod stats;

pub use logging::LoggingObserver;
pub use recording::RecordingObserver;
pub use stats::{ObserverStats, StatsObserver};
