//! Proxy configuration.
//!
//! Configurations can be created programmatically or loaded from TOML.
//!
//! # Examples
//!
//! ```rust
//! use proxy_core::config::{ObserverFailurePolicy, ProxyConfig};
//!
//! let config = ProxyConfig::from_toml_str(
//!     r#"
//!     name = "scroll-view"
//!     failure_policy = "propagate"
//!     log_calls = true
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.failure_policy, ObserverFailurePolicy::Propagate);
//! assert!(config.strict_observation);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProxyResult};

/// What the dispatcher does with observer failures once the call completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverFailurePolicy {
    /// Log each failure and return the call's value
    #[default]
    Log,
    /// Drop failures silently
    Ignore,
    /// Return every failure as an error after all hooks ran
    Propagate,
}

/// Configuration of one interception proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Name used in logs and errors
    pub name: String,

    /// Handling of observer failures
    pub failure_policy: ObserverFailurePolicy,

    /// Reject observers for calls that return a value and are not wired
    pub strict_observation: bool,

    /// Emit a debug event for every routed call
    pub log_calls: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            name: "delegate-proxy".to_string(),
            failure_policy: ObserverFailurePolicy::default(),
            strict_observation: true,
            log_calls: false,
        }
    }
}

impl ProxyConfig {
    /// Default configuration under a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ProxyResult<Self> {
        Self::parse(text, "<inline>")
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    fn parse(text: &str, origin: &str) -> ProxyResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::InvalidFormat {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "name".to_string(),
                value: self.name.clone(),
                reason: "Proxy name cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
