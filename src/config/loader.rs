//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::HubConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HubConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<HubConfig, ConfigError> {
    let config: HubConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.telemetry.log_capacity, 1000);
        assert_eq!(config.connectivity.max_attempts, 10);
        assert_eq!(config.health.min_interval_secs, 60);
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [relays]
            logs_quiet_ms = 50

            [connectivity]
            enabled = true
            channels = ["", "admin"]
            "#,
        )
        .unwrap();
        assert_eq!(config.relays.logs_quiet_ms, 50);
        assert_eq!(config.relays.logs_buffer, 500);
        assert_eq!(config.connectivity.channels, vec!["".to_string(), "admin".to_string()]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse_config(
            r#"
            [statistics]
            smoothing_factor = 1.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("smoothing_factor"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[server\nbind").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, "[server]\nbind_address = \"127.0.0.1:4000\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:4000");

        let missing = load_config(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
