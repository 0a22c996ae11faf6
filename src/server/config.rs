//! Server configuration types
//!
//! Mirrors `config/default.toml` section by section.

use anyhow::{bail, Result};
use pipstream_core::{PublisherConfig, RelayConfig, SubscriptionConfig, TemporalHttpConfig};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.log.max_len == 0 {
            bail!("log.max_len must be greater than zero");
        }
        if self.log.backend == LogBackend::Redis && self.log.redis_url.trim().is_empty() {
            bail!("log.redis_url is required for the redis backend");
        }

        let relay = &self.relay;
        for (name, value) in [
            ("relay.poll_timeout_ms", relay.poll_timeout_ms),
            ("relay.status_interval_ms", relay.status_interval_ms),
            ("relay.shutdown_timeout_secs", relay.shutdown_timeout_secs),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        if relay.read_count == 0 || relay.merged_read_count == 0 {
            bail!("relay read counts must be greater than zero");
        }
        if relay.event_buffer == 0 {
            bail!("relay.event_buffer must be greater than zero");
        }

        if self.workflow.enabled {
            if self.workflow.endpoint.trim().is_empty() {
                bail!("workflow.endpoint is required when workflow.enabled = true");
            }
            if self.workflow.request_timeout_ms == 0 {
                bail!("workflow.request_timeout_ms must be greater than zero");
            }
        }
        Ok(())
    }

    /// Relay settings derived from the `log`, `relay` and `workflow` sections.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            subscription: SubscriptionConfig {
                poll_timeout: Duration::from_millis(self.relay.poll_timeout_ms),
                cycle_delay: Duration::from_millis(self.relay.cycle_delay_ms),
                read_count: self.relay.read_count,
                merged_read_count: self.relay.merged_read_count,
                event_buffer: self.relay.event_buffer,
            },
            publisher: PublisherConfig {
                max_len: self.log.max_len,
                best_effort: self.log.best_effort_publish,
            },
            status_interval: Duration::from_millis(self.relay.status_interval_ms),
            status_query: self.workflow.status_query.clone(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
}

/// Which event log backs the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    Redis,
    Memory,
}

/// Event log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub backend: LogBackend,
    #[serde(default)]
    pub redis_url: String,
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    #[serde(default = "default_true")]
    pub best_effort_publish: bool,
}

/// Subscription loop tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,
    #[serde(default = "default_read_count")]
    pub read_count: usize,
    #[serde(default = "default_merged_read_count")]
    pub merged_read_count: usize,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            cycle_delay_ms: default_cycle_delay_ms(),
            read_count: default_read_count(),
            merged_read_count: default_merged_read_count(),
            status_interval_ms: default_status_interval_ms(),
            event_buffer: default_event_buffer(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Orchestration engine connection
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Bearer token; never logged
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    #[serde(default = "default_status_query")]
    pub status_query: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl WorkflowConfig {
    /// Client settings for the HTTP engine.
    #[must_use]
    pub fn http_config(&self) -> TemporalHttpConfig {
        TemporalHttpConfig {
            endpoint: self.endpoint.clone(),
            namespace: self.namespace.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            namespace: default_namespace(),
            api_key: None,
            task_queue: default_task_queue(),
            status_query: default_status_query(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_len() -> usize {
    1000
}
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_cycle_delay_ms() -> u64 {
    100
}
fn default_read_count() -> usize {
    10
}
fn default_merged_read_count() -> usize {
    5
}
fn default_status_interval_ms() -> u64 {
    5000
}
fn default_event_buffer() -> usize {
    64
}
fn default_shutdown_timeout_secs() -> u64 {
    10
}
fn default_namespace() -> String {
    "default".to_string()
}
fn default_task_queue() -> String {
    "pip-ai-task-queue".to_string()
}
fn default_status_query() -> String {
    pipstream_core::DEFAULT_STATUS_QUERY.to_string()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
