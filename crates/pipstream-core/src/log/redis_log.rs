//! Redis streams backend.
//!
//! Each channel key is one Redis stream. Appends use `XADD ... MAXLEN = n`,
//! reads use non-blocking `XREAD` polled until data arrives or `max_wait`
//! elapses, so a slow stream never ties up the shared multiplexed
//! connection other subscriptions read through.

use super::{ChannelKey, EntryId, LogEntry, LogSource, ReadBatch};
use crate::error::{Error, Result};
use crate::event::Fields;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default interval between `XREAD` attempts while long-polling.
const DEFAULT_POLL_STEP: Duration = Duration::from_millis(100);

/// Raw `XREAD` reply: `[[stream, [[id, {field: value}], ...]], ...]`, or nil.
type XReadReply = Option<Vec<(String, Vec<(String, Fields)>)>>;

/// Redis-streams log source.
///
/// # Security Features
///
/// - Consider enabling Redis AUTH and TLS (`rediss://`) in production
pub struct RedisLog {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    poll_step: Duration,
}

impl RedisLog {
    /// Create a new Redis log
    ///
    /// # Errors
    ///
    /// Returns error if Redis URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Configuration(format!("invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            poll_step: DEFAULT_POLL_STEP,
        })
    }

    /// Override the interval between `XREAD` attempts.
    #[must_use]
    pub fn with_poll_step(mut self, poll_step: Duration) -> Self {
        self.poll_step = poll_step;
        self
    }

    /// Get the shared async connection, connecting on first use.
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Redis connection failed: {}", e)))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Map a command error, dropping the cached connection when the
    /// failure was at the transport level.
    async fn command_failed(&self, command: &str, e: redis::RedisError) -> Error {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
        {
            warn!(command, error = %e, "Redis connection lost, resetting");
            *self.connection.lock().await = None;
        }
        Error::BackendUnavailable(format!("Redis {} failed: {}", command, e))
    }

    async fn read_once(
        &self,
        cursors: &[(ChannelKey, EntryId)],
        limit_per_channel: usize,
    ) -> Result<ReadBatch> {
        let mut conn = self.get_connection().await?;

        let mut cmd = redis::cmd("XREAD");
        cmd.arg("COUNT").arg(limit_per_channel).arg("STREAMS");
        for (key, _) in cursors {
            cmd.arg(key.as_str());
        }
        for (_, after) in cursors {
            cmd.arg(after.to_string());
        }

        let reply: XReadReply = match cmd.query_async(&mut conn).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.command_failed("XREAD", e).await),
        };

        let mut batch = ReadBatch::new();
        for (stream, entries) in reply.unwrap_or_default() {
            let channel = ChannelKey::new(stream)?;
            let mut parsed = Vec::with_capacity(entries.len());
            for (id, fields) in entries {
                parsed.push(LogEntry {
                    id: id.parse()?,
                    channel: channel.clone(),
                    fields,
                });
            }
            if !parsed.is_empty() {
                batch.insert(channel, parsed);
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl LogSource for RedisLog {
    fn name(&self) -> &'static str {
        "redis"
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

        let mut conn = self.get_connection().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(channel.as_str());
        if let Some(max_len) = max_len {
            cmd.arg("MAXLEN").arg("=").arg(max_len);
        }
        cmd.arg("*");
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }

        let id: String = match cmd.query_async(&mut conn).await {
            Ok(id) => id,
            Err(e) => return Err(self.command_failed("XADD", e).await),
        };

        debug!(channel = %channel, id = %id, "Entry appended to Redis stream");
        id.parse()
    }

    async fn read(
        &self,
        cursors: &[(ChannelKey, EntryId)],
        limit_per_channel: usize,
        max_wait: Duration,
    ) -> Result<ReadBatch> {
        if cursors.is_empty() {
            tokio::time::sleep(max_wait).await;
            return Ok(ReadBatch::new());
        }

        let deadline = Instant::now() + max_wait;
        loop {
            let batch = self.read_once(cursors, limit_per_channel).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep(self.poll_step.min(deadline - now)).await;
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.command_failed("PING", e).await),
        }
    }
}
