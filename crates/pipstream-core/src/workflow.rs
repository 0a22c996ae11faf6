//! Orchestration engine boundary
//!
//! The relay treats the workflow engine as a black box reached through
//! [`WorkflowEngine`]. Streams only ever *query* it, through a
//! [`StatusPoller`] that turns every failure into a no-op so status data
//! stays best-effort.

mod temporal;

pub use temporal::{TemporalHttpConfig, TemporalHttpEngine};

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default query issued by the status poller.
pub const DEFAULT_STATUS_QUERY: &str = "getAnalysisStatus";

/// Signal sent to ask an analysis workflow to stop.
pub const CANCEL_SIGNAL: &str = "cancelAnalysis";

/// Execution status reported by `describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Still executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with a failure
    Failed,
    /// Cancelled on request
    Canceled,
    /// Terminated by an operator
    Terminated,
    /// Restarted as a new run
    ContinuedAsNew,
    /// Exceeded its execution timeout
    TimedOut,
    /// Anything the engine reports that is not listed above
    Unknown,
}

impl WorkflowStatus {
    /// Parse an engine status name such as `WORKFLOW_EXECUTION_STATUS_RUNNING`
    /// or plain `RUNNING`.
    #[must_use]
    pub fn from_engine(name: &str) -> Self {
        match name.trim_start_matches("WORKFLOW_EXECUTION_STATUS_") {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            "TERMINATED" => Self::Terminated,
            "CONTINUED_AS_NEW" => Self::ContinuedAsNew,
            "TIMED_OUT" => Self::TimedOut,
            _ => Self::Unknown,
        }
    }

    /// Upper-case status name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Terminated => "TERMINATED",
            Self::ContinuedAsNew => "CONTINUED_AS_NEW",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the workflow has stopped executing.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Running | Self::Unknown)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow engine operations the service uses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Engine name for logs and health output
    fn name(&self) -> &'static str;

    /// Start `workflow_type` under `workflow_id`; returns the run id.
    async fn start(
        &self,
        workflow_type: &str,
        input: Value,
        workflow_id: &str,
        task_queue: &str,
    ) -> Result<String>;

    /// Run a read-only query against a workflow.
    ///
    /// Fails with `NotFound` for unknown workflows and `QueryUnsupported`
    /// when the workflow has no handler for `query_name`.
    async fn query(&self, workflow_id: &str, query_name: &str) -> Result<Value>;

    /// Deliver a signal to a running workflow.
    async fn signal(&self, workflow_id: &str, signal_name: &str, payload: Value) -> Result<()>;

    /// Current execution status.
    async fn describe(&self, workflow_id: &str) -> Result<WorkflowStatus>;

    /// Request cancellation.
    async fn cancel(&self, workflow_id: &str) -> Result<()>;

    /// Cheap reachability probe used by health checks.
    async fn health_check(&self) -> Result<()>;
}

/// Result of one status query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The workflow answered
    Status(Value),
    /// No such workflow
    NotFound,
    /// The workflow does not handle the query
    Unsupported,
}

/// Periodic status source attached to workflow streams.
#[derive(Clone)]
pub struct StatusPoller {
    engine: Arc<dyn WorkflowEngine>,
    query_name: String,
    interval: Duration,
}

impl StatusPoller {
    /// Create a poller issuing `query_name` every `interval`.
    pub fn new(engine: Arc<dyn WorkflowEngine>, query_name: impl Into<String>, interval: Duration) -> Self {
        Self {
            engine,
            query_name: query_name.into(),
            interval,
        }
    }

    /// Time between queries.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Query name issued each cycle.
    #[must_use]
    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    /// Issue the status query, folding the expected failures into
    /// [`QueryOutcome`].
    ///
    /// # Errors
    ///
    /// Any engine error other than `NotFound` and `QueryUnsupported`.
    pub async fn query(&self, workflow_id: &str) -> Result<QueryOutcome> {
        match self.engine.query(workflow_id, &self.query_name).await {
            Ok(status) => Ok(QueryOutcome::Status(status)),
            Err(Error::NotFound(_)) => Ok(QueryOutcome::NotFound),
            Err(Error::QueryUnsupported { .. }) => Ok(QueryOutcome::Unsupported),
            Err(e) => Err(e),
        }
    }

    /// One poll cycle: the status when there is one, `None` otherwise.
    /// Never fails; errors are logged and skipped.
    pub async fn poll(&self, workflow_id: &str) -> Option<Value> {
        match self.query(workflow_id).await {
            Ok(QueryOutcome::Status(status)) => Some(status),
            Ok(QueryOutcome::NotFound) => {
                debug!(workflow_id, "Workflow not found, skipping status");
                None
            }
            Ok(QueryOutcome::Unsupported) => {
                debug!(workflow_id, query = %self.query_name, "Status query unsupported, skipping");
                None
            }
            Err(e) => {
                warn!(
                    workflow_id,
                    engine = self.engine.name(),
                    error = %e,
                    "Status query failed, skipping this cycle"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
