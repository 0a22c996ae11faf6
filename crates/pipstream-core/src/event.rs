//! Relay events and the Event Formatter.
//!
//! Everything a subscription emits is a [`RelayEvent`]: a tagged
//! [`EventKind`] plus the time it was produced. [`format_event`] turns one
//! into a [`WireEvent`], the type/payload pair written to clients as one
//! server-push block:
//!
//! ```text
//! event: <type>
//! data: <json payload>
//!
//! ```

use crate::error::{Error, Result};
use crate::log::LogEntry;
use crate::registry::SubscriptionId;
use crate::subscription::StreamTarget;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Free-form entry payload. Log backends store flat string maps.
pub type Fields = BTreeMap<String, String>;

/// What happened on a subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Subscription attached and about to stream
    Connected {
        /// Subscription identifier
        subscription_id: SubscriptionId,
        /// What the client attached to
        target: StreamTarget,
    },
    /// One log entry delivered to the client
    Entry {
        /// Resolved event type (entry's `event_type` or the stream default)
        event_type: String,
        /// The entry itself
        entry: LogEntry,
    },
    /// Synthetic status snapshot from the orchestration engine
    WorkflowStatus {
        /// Workflow identifier
        workflow_id: String,
        /// Query result as returned by the engine
        status: Value,
    },
    /// Stream-level failure; always followed by `Disconnected`
    Error {
        /// Client-safe description
        message: String,
    },
    /// Terminal event; nothing follows it
    Disconnected {
        /// Subscription identifier
        subscription_id: SubscriptionId,
        /// What the client was attached to
        target: StreamTarget,
    },
}

/// An event with its production time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayEvent {
    /// Event body
    #[serde(flatten)]
    pub kind: EventKind,
    /// When the relay produced it
    pub timestamp: DateTime<Utc>,
}

impl RelayEvent {
    /// Stamp an event with the current time.
    #[must_use]
    pub fn now(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Wire type tag of this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match &self.kind {
            EventKind::Connected { .. } => "connected",
            EventKind::Entry { event_type, .. } => event_type,
            EventKind::WorkflowStatus { .. } => "temporal_status",
            EventKind::Error { .. } => "error",
            EventKind::Disconnected { .. } => "disconnected",
        }
    }

    /// Whether this is the terminal `disconnected` event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Disconnected { .. })
    }
}

/// Wire representation: one type line and one payload line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    /// Event type tag
    pub event: String,
    /// JSON payload, single line
    pub data: String,
}

impl WireEvent {
    /// Render as a text block terminated by a blank line.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// A formatted event on its way to the client: the structured form for
/// in-process consumers, the wire form for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    /// Structured event
    pub event: RelayEvent,
    /// Encoded event
    pub wire: WireEvent,
}

impl OutboundEvent {
    /// Format `event`, keeping both forms.
    ///
    /// # Errors
    ///
    /// See [`format_event`].
    pub fn encode(event: RelayEvent) -> Result<Self> {
        let wire = format_event(&event)?;
        Ok(Self { event, wire })
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn target_payload(subscription_id: &SubscriptionId, target: &StreamTarget, ts: &DateTime<Utc>) -> Value {
    let mut payload = Map::new();
    payload.insert(target.id_field().to_string(), Value::String(target.id().to_string()));
    payload.insert("subscription_id".to_string(), Value::String(subscription_id.to_string()));
    payload.insert("timestamp".to_string(), Value::String(rfc3339(ts)));
    Value::Object(payload)
}

/// Convert an event into its wire form.
///
/// # Errors
///
/// `Format` when the event type cannot be framed (line breaks) or the
/// payload fails to serialize. Callers log and skip such events.
pub fn format_event(event: &RelayEvent) -> Result<WireEvent> {
    let event_type = event.event_type();
    if event_type.is_empty() || event_type.contains(['\n', '\r']) {
        return Err(Error::Format(format!(
            "event type {:?} cannot be framed",
            event_type
        )));
    }

    let data = match &event.kind {
        EventKind::Connected {
            subscription_id,
            target,
        }
        | EventKind::Disconnected {
            subscription_id,
            target,
        } => serde_json::to_string(&target_payload(subscription_id, target, &event.timestamp))?,
        EventKind::Entry { entry, .. } => serde_json::to_string(&entry.fields)?,
        EventKind::WorkflowStatus {
            workflow_id,
            status,
        } => serde_json::to_string(&json!({
            "workflow_id": workflow_id,
            "status": status,
            "timestamp": rfc3339(&event.timestamp),
        }))?,
        EventKind::Error { message } => serde_json::to_string(&json!({
            "message": message,
            "timestamp": rfc3339(&event.timestamp),
        }))?,
    };

    Ok(WireEvent {
        event: event_type.to_string(),
        data,
    })
}

#[cfg(test)]
mod tests;
