//! Production configuration validation
//!
//! Security checks for production deployments.

use super::config::{AppConfig, LogBackend};
use anyhow::Result;
use secrecy::ExposeSecret;
use tracing::warn;

/// Validate configuration for production security
pub fn validate_production_config(config: &AppConfig) -> Result<()> {
    let is_production = std::env::var("PIPSTREAM_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false);

    if !is_production {
        return Ok(());
    }

    for warning in production_warnings(config) {
        warn!("SECURITY WARNING: {}", warning);
    }
    Ok(())
}

/// Everything about `config` worth flagging in production.
pub fn production_warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.server.host == "0.0.0.0" {
        warnings.push(
            "Server is binding to all interfaces (0.0.0.0) in production. \
             Streams carry no authentication; front the relay with an authenticating proxy.",
        );
    }

    if config.server.cors_permissive {
        warnings.push("Permissive CORS is enabled in production.");
    }

    match config.log.backend {
        LogBackend::Memory => warnings.push(
            "In-memory event log in production: events are lost on restart \
             and are not shared between relay instances.",
        ),
        LogBackend::Redis => {
            if config.log.redis_url.starts_with("redis://") && !config.log.redis_url.contains('@')
            {
                warnings.push(
                    "Redis connection appears to have no authentication in production. \
                     Consider enabling Redis AUTH.",
                );
            }
        }
    }

    if config.workflow.enabled {
        if config.workflow.endpoint.starts_with("http://") {
            warnings.push("Workflow engine endpoint is not using TLS.");
        }
        let has_key = config
            .workflow
            .api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().is_empty());
        if !has_key {
            warnings.push("Workflow engine is enabled without an API key.");
        }
    }

    warnings
}
