//! Server module for pipstream
//!
//! Contains the main server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Production configuration validation
//! - `init`: Relay construction and the HTTP run loop

pub mod config;
mod init;
mod loader;
mod validation;

// Re-export public API
pub use init::{build_app, build_log, build_relay, run};
pub use loader::{config_from_str, load_config, DEFAULT_CONFIG};
pub use validation::{production_warnings, validate_production_config};
