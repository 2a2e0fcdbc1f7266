//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::throttle::ThrottleSettings;

/// Root configuration for the throttled link.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Where relayed connections are dialed.
    pub upstream: UpstreamConfig,

    /// Link shape applied to every upstream connection.
    pub throttle: ThrottleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:9000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9000".to_string(),
            max_connections: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:8080").
    pub address: String,

    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            connect_timeout_secs: 30,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Link shape.
///
/// `rate_budget` applies to both directions unless overridden.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Bytes per quantum.
    pub rate_budget: u64,

    pub quantum_ms: u64,

    /// Override for bytes written toward the upstream.
    pub upload_rate_budget: Option<u64>,

    /// Override for bytes read from the upstream.
    pub download_rate_budget: Option<u64>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            rate_budget: 1024 * 1024,
            quantum_ms: 1000,
            upload_rate_budget: None,
            download_rate_budget: None,
        }
    }
}

impl ThrottleConfig {
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    pub fn settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            outbound_budget: self.upload_rate_budget.unwrap_or(self.rate_budget),
            inbound_budget: self.download_rate_budget.unwrap_or(self.rate_budget),
            quantum: self.quantum(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: LinkConfig = toml::from_str("").unwrap();
        assert_eq!(config, LinkConfig::default());
        assert_eq!(config.throttle.quantum(), Duration::from_secs(1));
    }

    #[test]
    fn direction_overrides_apply() {
        let config: LinkConfig = toml::from_str(
            r#"
            [throttle]
            rate_budget = 2048
            quantum_ms = 250
            download_rate_budget = 512
            "#,
        )
        .unwrap();

        let settings = config.throttle.settings();
        assert_eq!(settings.outbound_budget, 2048);
        assert_eq!(settings.inbound_budget, 512);
        assert_eq!(settings.quantum, Duration::from_millis(250));
    }
}
