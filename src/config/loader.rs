//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::LinkConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<LinkConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<LinkConfig, ConfigError> {
    let config: LinkConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::Direction;

    #[test]
    fn parses_full_document() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:7000"
            max_connections = 8

            [upstream]
            address = "127.0.0.1:8000"
            connect_timeout_secs = 5

            [throttle]
            rate_budget = 4096
            quantum_ms = 100

            [observability]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.max_connections, 8);
        assert_eq!(config.upstream.connect_timeout_secs, 5);
        assert_eq!(config.throttle.settings().bytes_per_second(Direction::Outbound), 40960.0);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config("[throttle]\nquantum_ms = 0\nrate_budget = 0\n").unwrap_err();
        assert!(matches!(&err, ConfigError::Validation(errors) if errors.len() == 2));
        assert_eq!(
            err.to_string(),
            "Validation failed: throttle.quantum_ms: must be greater than zero, \
             throttle.rate_budget: must be greater than zero"
        );
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(
            parse_config("[throttle"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/throttled-link.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
