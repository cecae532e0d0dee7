//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. All violations are
//! collected so an operator sees every problem in one pass.

use std::collections::HashSet;
use std::fmt;

use crate::chain::types::ChainFamily;
use crate::config::schema::NchainConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &NchainConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let daemon = &config.daemon;
    if daemon.queue_capacity == 0 {
        errors.push(ValidationError::new("daemon.queue_capacity", "must be greater than 0"));
    }
    if daemon.poll_interval_ms == 0 {
        errors.push(ValidationError::new("daemon.poll_interval_ms", "must be greater than 0"));
    }
    if daemon.backoff_initial_ms == 0 || daemon.backoff_initial_ms > daemon.backoff_ceiling_ms {
        errors.push(ValidationError::new(
            "daemon.backoff_initial_ms",
            "must be greater than 0 and not exceed backoff_ceiling_ms",
        ));
    }
    if daemon.min_recent_blocks < 2 || daemon.min_recent_blocks > daemon.max_recent_blocks {
        errors.push(ValidationError::new(
            "daemon.min_recent_blocks",
            "must be at least 2 and not exceed max_recent_blocks",
        ));
    }
    if config.nonce.ttl_secs == 0 {
        errors.push(ValidationError::new("nonce.ttl_secs", "must be greater than 0"));
    }
    if config.finalizer.pending_ttl_secs < config.finalizer.receipt_timeout_secs {
        errors.push(ValidationError::new(
            "finalizer.pending_ttl_secs",
            "must not be shorter than receipt_timeout_secs",
        ));
    }
    if config.rpc.timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.timeout_secs", "must be greater than 0"));
    }
    if config.pubsub.subject_prefix.is_empty() {
        errors.push(ValidationError::new("pubsub.subject_prefix", "must not be empty"));
    }

    let mut seen = HashSet::new();
    for (i, network) in config.networks.iter().enumerate() {
        let field = format!("networks[{}]", i);
        if !seen.insert(network.id.clone()) {
            errors.push(ValidationError::new(&field, format!("duplicate network id {}", network.id)));
        }
        if network.enabled && network.rpc_url.is_none() && network.websocket_url.is_none() {
            errors.push(ValidationError::new(&field, "enabled network needs rpc_url or websocket_url"));
        }
        if network.family != ChainFamily::Ethereum && network.rpc_url.is_none() {
            errors.push(ValidationError::new(&field, "rpc_url is required for this chain family"));
        }
        for url in network.rpc_url.iter().chain(network.websocket_url.iter()) {
            if url::Url::parse(url).is_err() {
                errors.push(ValidationError::new(&field, format!("invalid url '{}'", url)));
            }
        }
    }

    for (i, account) in config.accounts.iter().enumerate() {
        let field = format!("accounts[{}]", i);
        if account.application_id.is_some() == account.user_id.is_some() {
            errors.push(ValidationError::new(
                &field,
                "exactly one of application_id or user_id must be set",
            ));
        }
        if !seen.contains(&account.network_id) {
            errors.push(ValidationError::new(
                &field,
                format!("unknown network {}", account.network_id),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
