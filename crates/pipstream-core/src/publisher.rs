//! Publisher API
//!
//! Write side of the relay. Appends events to channels with bounded
//! retention: once a channel holds `max_len` entries the oldest are trimmed.
//! Retention is lossy by design of the log; a subscriber that falls behind
//! the trim point resumes at the oldest retained entry.

use crate::error::Result;
use crate::event::Fields;
use crate::log::{
    ChannelKey, EntryId, LogSource, FILE_ANALYSIS_FEED, NOTIFICATIONS_FEED, WORKFLOW_PROGRESS_FEED,
};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Retention cap per channel
    pub max_len: usize,
    /// Swallow append failures (logged) instead of returning them
    pub best_effort: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_len: 1000,
            best_effort: true,
        }
    }
}

/// Appends events on behalf of upload and orchestration collaborators.
#[derive(Clone)]
pub struct Publisher {
    log: Arc<dyn LogSource>,
    config: PublisherConfig,
}

impl Publisher {
    /// Create a publisher writing through `log`.
    pub fn new(log: Arc<dyn LogSource>, config: PublisherConfig) -> Self {
        Self { log, config }
    }

    /// Active settings.
    #[must_use]
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Append one event to `channel`. `event_type` overrides any
    /// `event_type` already in `fields`.
    ///
    /// Returns the new entry id, or `None` when the append failed and the
    /// publisher is best-effort.
    ///
    /// # Errors
    ///
    /// The log's error (typically `BackendUnavailable`) when not best-effort.
    pub async fn publish(
        &self,
        channel: &ChannelKey,
        event_type: &str,
        mut fields: Fields,
    ) -> Result<Option<EntryId>> {
        fields.insert("event_type".to_string(), event_type.to_string());
        self.append(channel, &fields).await
    }

    /// Stamp and publish workflow progress to `workflow:{id}` and the
    /// global workflow feed.
    ///
    /// Returns the id on the per-workflow channel.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub async fn publish_workflow_progress(
        &self,
        workflow_id: &str,
        fields: Fields,
    ) -> Result<Option<EntryId>> {
        let entry = stamped("workflow_id", workflow_id, "workflow_progress", fields);
        let id = self.append(&ChannelKey::workflow(workflow_id), &entry).await?;
        self.append(&ChannelKey::feed(WORKFLOW_PROGRESS_FEED), &entry).await?;
        Ok(id)
    }

    /// Stamp and publish file analysis progress to `file:{id}` and the
    /// global analysis feed.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub async fn publish_analysis_progress(
        &self,
        file_id: &str,
        fields: Fields,
    ) -> Result<Option<EntryId>> {
        let entry = stamped("file_id", file_id, "analysis_progress", fields);
        let id = self.append(&ChannelKey::file(file_id), &entry).await?;
        self.append(&ChannelKey::feed(FILE_ANALYSIS_FEED), &entry).await?;
        Ok(id)
    }

    /// Publish a notification for `user_id` to the notifications feed.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub async fn publish_notification(
        &self,
        user_id: &str,
        fields: Fields,
    ) -> Result<Option<EntryId>> {
        let entry = stamped("user_id", user_id, "notification", fields);
        self.append(&ChannelKey::feed(NOTIFICATIONS_FEED), &entry).await
    }

    async fn append(&self, channel: &ChannelKey, fields: &Fields) -> Result<Option<EntryId>> {
        match self.log.append(channel, fields, Some(self.config.max_len)).await {
            Ok(id) => {
                debug!(channel = %channel, id = %id, "Event published");
                Ok(Some(id))
            }
            Err(e) if self.config.best_effort => {
                warn!(channel = %channel, error = %e, "Publish failed, dropping event");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Id, timestamp and default type first; caller fields win on conflict.
fn stamped(id_field: &str, id: &str, default_type: &str, fields: Fields) -> Fields {
    let mut entry = Fields::new();
    entry.insert(id_field.to_string(), id.to_string());
    entry.insert(
        "timestamp".to_string(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    entry.insert("event_type".to_string(), default_type.to_string());
    entry.extend(fields);
    entry
}
