//! pipstream Core - Event-Stream Relay
//!
//! This crate provides the relay that turns append-only, cursor-addressable
//! channel logs into per-client push streams, including:
//! - Log: channel keys, entry ids and the log source adapters (memory, Redis streams)
//! - Cursor: per-subscription read positions
//! - Subscription: the per-client state machine that polls, merges and emits
//! - Registry: the process-wide table of live subscriptions
//! - Publisher: the write side with bounded channel retention
//! - Workflow: the orchestration engine boundary and status poller
//! - Relay: the facade transports attach through
//! - Shutdown: coordinated teardown of every live subscription

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cursor;
pub mod error;
pub mod event;
pub mod log;
pub mod publisher;
pub mod registry;
pub mod relay;
pub mod shutdown;
pub mod subscription;
pub mod workflow;

pub use cursor::CursorTracker;
pub use error::{Error, Result};
pub use event::{format_event, EventKind, Fields, OutboundEvent, RelayEvent, WireEvent};
pub use log::{
    global_channels, ChannelKey, EntryId, LogEntry, LogSource, MemoryLog, ReadBatch, RedisLog,
};
pub use publisher::{Publisher, PublisherConfig};
pub use registry::{RelayRegistry, SubscriptionId, SubscriptionInfo};
pub use relay::{AttachOptions, AttachedStream, ComponentStatus, Relay, RelayConfig, RelayHealth};
pub use shutdown::{wait_for_shutdown_signal, ShutdownController, ShutdownPhase};
pub use subscription::{
    EventFilter, StreamTarget, Subscription, SubscriptionConfig, SubscriptionState,
};
pub use workflow::{
    QueryOutcome, StatusPoller, TemporalHttpConfig, TemporalHttpEngine, WorkflowEngine,
    WorkflowStatus, CANCEL_SIGNAL, DEFAULT_STATUS_QUERY,
};
