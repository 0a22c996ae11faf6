//! Log Source Adapter
//!
//! Abstraction over an external ordered, per-channel append log. Entries in a
//! channel are totally ordered by a strictly increasing [`EntryId`]; readers
//! address a channel by the last id they have seen and long-poll for newer
//! entries.
//!
//! Two backends are provided:
//! - [`MemoryLog`]: in-process log for development and tests
//! - [`RedisLog`]: Redis streams (`XADD` / `XREAD`)

mod memory;
mod redis_log;

pub use memory::MemoryLog;
pub use redis_log::RedisLog;

use crate::error::{Error, Result};
use crate::event::Fields;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Global workflow progress feed.
pub const WORKFLOW_PROGRESS_FEED: &str = "pip-ai:workflow:progress";
/// Global file analysis feed.
pub const FILE_ANALYSIS_FEED: &str = "pip-ai:analysis:progress";
/// Global AI processing feed.
pub const AI_PROCESSING_FEED: &str = "pip-ai:ai:progress";
/// Global notification feed.
pub const NOTIFICATIONS_FEED: &str = "pip-ai:notifications";

/// Identifier of one entry inside a channel.
///
/// Mirrors the Redis stream id layout (`<millis>-<seq>`). Ordering is by
/// `millis` then `seq`; [`EntryId::BEGINNING`] sorts before every real id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId {
    /// Millisecond timestamp component
    pub millis: u64,
    /// Sequence within the millisecond
    pub seq: u64,
}

impl EntryId {
    /// Sentinel lower than every real id.
    pub const BEGINNING: EntryId = EntryId { millis: 0, seq: 0 };

    /// Create an id from its components.
    #[must_use]
    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Whether this is the "beginning" sentinel.
    #[must_use]
    pub fn is_beginning(&self) -> bool {
        *self == Self::BEGINNING
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidInput(format!("malformed entry id '{}'", s));
        match s.split_once('-') {
            Some((millis, seq)) => Ok(Self {
                millis: millis.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            // Redis accepts a bare millisecond value, meaning sequence 0.
            None => Ok(Self {
                millis: s.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

impl TryFrom<String> for EntryId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.to_string()
    }
}

/// Name of one append-only log partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Create a channel key from an arbitrary name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty or whitespace-only names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("channel key must not be empty".to_string()));
        }
        Ok(Self(name))
    }

    /// Per-workflow progress channel (`workflow:<id>`).
    #[must_use]
    pub fn workflow(workflow_id: &str) -> Self {
        Self(format!("workflow:{}", workflow_id))
    }

    /// Per-file analysis channel (`file:<id>`).
    #[must_use]
    pub fn file(file_id: &str) -> Self {
        Self(format!("file:{}", file_id))
    }

    /// One of the global feeds (`pip-ai:...`).
    #[must_use]
    pub fn feed(name: &'static str) -> Self {
        Self(name.to_string())
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four global feeds merged into per-identity streams.
#[must_use]
pub fn global_channels() -> Vec<ChannelKey> {
    [
        WORKFLOW_PROGRESS_FEED,
        FILE_ANALYSIS_FEED,
        AI_PROCESSING_FEED,
        NOTIFICATIONS_FEED,
    ]
    .into_iter()
    .map(ChannelKey::feed)
    .collect()
}

/// One immutable entry of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Position inside the channel
    pub id: EntryId,
    /// Channel the entry belongs to
    pub channel: ChannelKey,
    /// Free-form payload
    pub fields: Fields,
}

impl LogEntry {
    /// The `event_type` field, if the publisher set one.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.fields.get("event_type").map(String::as_str)
    }
}

/// Result of one `read`: entries per channel, each list in increasing id order.
///
/// Channels without new entries are absent.
pub type ReadBatch = BTreeMap<ChannelKey, Vec<LogEntry>>;

/// Ordered, per-channel append log with long-poll reads.
///
/// Implementations must allow many concurrent readers of one channel at
/// different offsets; a read never mutates reader-visible state.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Append an entry, trimming the channel to `max_len` entries when given.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the log cannot accept writes. Never drops
    /// silently.
    async fn append(
        &self,
        channel: &ChannelKey,
        fields: &Fields,
        max_len: Option<usize>,
    ) -> Result<EntryId>;

    /// Read entries newer than each channel's cursor.
    ///
    /// Blocks up to `max_wait` until at least one channel has data and
    /// returns as soon as any does. Timing out is not an error: it yields an
    /// empty batch.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the connection to the log is lost.
    async fn read(
        &self,
        cursors: &[(ChannelKey, EntryId)],
        limit_per_channel: usize,
        max_wait: Duration,
    ) -> Result<ReadBatch>;

    /// Connectivity check.
    async fn ping(&self) -> Result<()>;
}

#[cfg(test)]
mod tests;
