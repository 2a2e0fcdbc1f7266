//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (quantum > 0, budgets > 0, limits > 0)
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LinkConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::LinkConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },
}

pub fn validate_config(config: &LinkConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero {
            field: "listener.max_connections",
        });
    }

    // Upstream may be a host name, so only require a port.
    if !has_port(&config.upstream.address) {
        errors.push(ValidationError::InvalidAddress {
            field: "upstream.address",
            value: config.upstream.address.clone(),
        });
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "upstream.connect_timeout_secs",
        });
    }

    let throttle = &config.throttle;
    if throttle.quantum_ms == 0 {
        errors.push(ValidationError::Zero {
            field: "throttle.quantum_ms",
        });
    }
    for (field, budget) in [
        ("throttle.rate_budget", Some(throttle.rate_budget)),
        ("throttle.upload_rate_budget", throttle.upload_rate_budget),
        ("throttle.download_rate_budget", throttle.download_rate_budget),
    ] {
        if budget == Some(0) {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn has_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&LinkConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = LinkConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.listener.max_connections = 0;
        config.throttle.quantum_ms = 0;
        config.throttle.rate_budget = 0;
        config.upstream.address = "localhost".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero {
            field: "throttle.quantum_ms"
        }));
        assert!(errors.contains(&ValidationError::InvalidAddress {
            field: "upstream.address",
            value: "localhost".to_string(),
        }));
    }

    #[test]
    fn upstream_host_names_are_allowed() {
        let mut config = LinkConfig::default();
        config.upstream.address = "example.com:443".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = LinkConfig::default();
        config.observability.metrics_address = "bogus".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);
    }
}
