//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::NchainConfig;
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

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<NchainConfig, ConfigError> {
    let config: NchainConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<NchainConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::ChainFamily;
    use crate::config::schema::CeilingBehavior;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.daemon.max_recent_blocks, 8);
        assert_eq!(config.daemon.poll_interval_ms, 2_500);
        assert_eq!(config.nonce.ttl_secs, 5);
        assert_eq!(config.pubsub.subject_prefix, "nchain");
        assert_eq!(config.daemon.backoff_on_ceiling, CeilingBehavior::Cap);
    }

    #[test]
    fn test_parse_networks() {
        let toml = r#"
            [daemon]
            backoff_on_ceiling = "reset"

            [[networks]]
            id = "8d8b3d7e-0d6c-4a7c-9d63-6a1b1f1c2f10"
            name = "baseledger-testnet"
            family = "baseledger"
            rpc_url = "http://localhost:26657"
            websocket_url = "ws://localhost:26657/websocket"
        "#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].family, ChainFamily::Baseledger);
        assert!(config.networks[0].enabled);
        assert_eq!(config.networks[0].rpc_url.as_deref(), Some("http://localhost:26657"));
        assert_eq!(config.daemon.backoff_on_ceiling, CeilingBehavior::Reset);
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("[daemon]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().starts_with("Validation failed: daemon.poll_interval_ms"));
    }
}
