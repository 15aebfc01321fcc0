//! Configuration for the HTTP transport.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for [`crate::transport::ReqwestTransport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Total request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: f64,
    /// How long idle pooled connections are kept, in seconds.
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Headers added to every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_connect_timeout() -> f64 {
    10.0
}

fn default_pool_idle_timeout() -> f64 {
    90.0
}

fn default_user_agent() -> String {
    format!("requester/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            pool_idle_timeout_seconds: default_pool_idle_timeout(),
            user_agent: default_user_agent(),
            default_headers: BTreeMap::new(),
        }
    }
}

impl TransportConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, seconds: f64) -> Self {
        self.connect_timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a default header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Gets the request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }

    /// Gets the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_seconds.max(0.0))
    }

    /// Gets the pool idle timeout as a `Duration`.
    #[must_use]
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.pool_idle_timeout_seconds.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.user_agent.starts_with("requester/"));
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"timeout_seconds": 5, "default_headers": {"x-app": "demo"}}"#)
                .unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout_seconds, 10.0);
        assert_eq!(config.default_headers.get("x-app"), Some(&"demo".to_string()));
    }

    #[test]
    fn test_config_builder() {
        let config = TransportConfig::new()
            .with_timeout(2.5)
            .with_user_agent("demo/1.0")
            .with_header("accept", "application/json");

        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.user_agent, "demo/1.0");
        assert_eq!(config.default_headers.len(), 1);
    }
}
