//! Error types for pipstream-core
//!
//! This module provides the relay error taxonomy and the client-facing
//! rendering used when an error has to be pushed down a stream.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Log backend or orchestration engine cannot be reached
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The workflow does not answer the requested query type
    #[error("query unsupported: {query} on workflow {workflow_id}")]
    QueryUnsupported {
        /// Workflow identifier
        workflow_id: String,
        /// Query name that was rejected
        query: String,
    },

    /// Requested workflow (or other resource) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A cursor would have moved backwards or repeated an id
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Event could not be encoded for the wire
    #[error("format error: {0}")]
    Format(String),

    /// Orchestration engine returned an unexpected response
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Invalid input (malformed entry id, empty channel key, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The relay is shutting down and accepts no new subscriptions
    #[error("relay is shutting down")]
    ShuttingDown,

    /// Configuration error (invalid settings)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error ends the subscription that observed it.
    ///
    /// Status-query outcomes are supplementary and never end a stream;
    /// log failures and broken cursor invariants always do.
    #[must_use]
    pub fn is_fatal_for_subscription(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::InvariantViolation(_)
        )
    }

    /// Message pushed to clients inside an `error` event.
    ///
    /// Keeps backend details (hosts, credentials in URLs) out of the stream.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Error::BackendUnavailable(_) => "Event log connection lost".to_string(),
            Error::InvariantViolation(_) => "Stream cursor invariant violated".to_string(),
            Error::QueryUnsupported { query, .. } => {
                format!("Workflow does not support query '{}'", query)
            }
            Error::NotFound(what) => format!("Not found: {}", what),
            Error::Format(_) => "Event could not be encoded".to_string(),
            Error::Workflow(_) => "Workflow engine error".to_string(),
            Error::InvalidInput(msg) => format!("Invalid input: {}", msg),
            Error::ShuttingDown => "Relay is shutting down".to_string(),
            Error::Configuration(_) | Error::Internal(_) => "Internal relay error".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Format(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendUnavailable(e.to_string())
    }
}
