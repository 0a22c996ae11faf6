//! In-process log backend.
//!
//! Data is lost on restart. Intended for development, single-node
//! deployments without Redis, and tests.

use super::{ChannelKey, EntryId, LogEntry, LogSource, ReadBatch};
use crate::error::{Error, Result};
use crate::event::Fields;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct Inner {
    channels: HashMap<ChannelKey, VecDeque<LogEntry>>,
    last_id: EntryId,
}

impl Inner {
    /// Next id: current millisecond, or a bumped sequence if the clock has
    /// not advanced (or went backwards) since the previous append.
    fn next_id(&mut self) -> EntryId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let id = if now > self.last_id.millis {
            EntryId::new(now, 0)
        } else {
            EntryId::new(self.last_id.millis, self.last_id.seq + 1)
        };
        self.last_id = id;
        id
    }

    fn collect(&self, cursors: &[(ChannelKey, EntryId)], limit: usize) -> ReadBatch {
        let mut batch = ReadBatch::new();
        for (key, after) in cursors {
            let Some(entries) = self.channels.get(key) else {
                continue;
            };
            let start = entries.partition_point(|e| e.id <= *after);
            let fresh: Vec<LogEntry> = entries.iter().skip(start).take(limit).cloned().collect();
            if !fresh.is_empty() {
                batch.insert(key.clone(), fresh);
            }
        }
        batch
    }
}

/// In-memory append log with long-poll reads.
pub struct MemoryLog {
    inner: RwLock<Inner>,
    appended: Notify,
}

impl MemoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            appended: Notify::new(),
        }
    }

    /// Number of retained entries in a channel.
    pub async fn len(&self, channel: &ChannelKey) -> usize {
        self.inner
            .read()
            .await
            .channels
            .get(channel)
            .map_or(0, VecDeque::len)
    }

    /// Whether the log holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        self.inner
            .read()
            .await
            .channels
            .values()
            .all(VecDeque::is_empty)
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSource for MemoryLog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(
        &self,
        channel: &ChannelKey,
        fields: &Fields,
        max_len: Option<usize>,
    ) -> Result<EntryId> {
        if fields.is_empty() {
            return Err(Error::InvalidInput("entry must carry at least one field".to_string()));
        }

        let id = {
            let mut inner = self.inner.write().await;
            let id = inner.next_id();
            let entries = inner.channels.entry(channel.clone()).or_default();
            entries.push_back(LogEntry {
                id,
                channel: channel.clone(),
                fields: fields.clone(),
            });
            if let Some(max_len) = max_len {
                while entries.len() > max_len {
                    entries.pop_front();
                }
            }
            id
        };

        debug!(channel = %channel, id = %id, "Entry appended to memory log");
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read(
        &self,
        cursors: &[(ChannelKey, EntryId)],
        limit_per_channel: usize,
        max_wait: Duration,
    ) -> Result<ReadBatch> {
        let deadline = Instant::now() + max_wait;
        loop {
            // Register interest before looking, so an append between the
            // check and the wait is not missed.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let batch = self.inner.read().await.collect(cursors, limit_per_channel);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(ReadBatch::new());
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
