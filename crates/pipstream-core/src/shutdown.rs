//! Graceful Shutdown
//!
//! Coordinates teardown of every live subscription.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! let registry = Arc::new(RelayRegistry::with_root(shutdown.token()));
//!
//! // ... serve ...
//!
//! shutdown.shutdown(&registry).await;
//! ```
//!
//! Cancelling the controller's token cancels every subscription token the
//! registry handed out. Each subscription then drains on its own (emitting
//! `disconnected`) and unregisters; the controller waits for the registry
//! to empty, up to the configured timeout.

use crate::registry::RelayRegistry;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default drain timeout in seconds
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// How often the registry is checked while draining
const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// No new subscriptions accepted
    Stopping,
    /// Waiting for subscriptions to send `disconnected` and unregister
    Draining,
    /// Timeout hit with subscriptions still registered
    Terminating,
    /// Shutdown complete
    Terminated,
}

impl ShutdownPhase {
    fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            2 => Self::Draining,
            3 => Self::Terminating,
            _ => Self::Terminated,
        }
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Shutdown controller
pub struct ShutdownController {
    cancel_token: CancellationToken,
    shutdown_tx: broadcast::Sender<ShutdownPhase>,
    phase: AtomicU32,
    shutdown_initiated: AtomicBool,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the default drain timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }

    /// Create a controller with a custom drain timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            shutdown_tx,
            phase: AtomicU32::new(ShutdownPhase::Running as u32),
            shutdown_initiated: AtomicBool::new(false),
            timeout,
        })
    }

    /// Token cancelled when shutdown begins
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Subscribe to phase changes
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownPhase> {
        self.shutdown_tx.subscribe()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u32(self.phase.load(Ordering::SeqCst))
    }

    /// Whether shutdown has been initiated
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Whether new subscriptions are still accepted
    #[must_use]
    pub fn is_accepting_work(&self) -> bool {
        self.phase() == ShutdownPhase::Running
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u32, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(phase);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Cancel every subscription and wait for `registry` to drain.
    ///
    /// Returns the number of subscriptions still registered when the wait
    /// ended (zero on a clean drain). A second call is a no-op returning 0.
    pub async fn shutdown(self: &Arc<Self>, registry: &RelayRegistry) -> usize {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return 0;
        }

        info!(active_streams = registry.count(), "Initiating graceful shutdown");
        self.set_phase(ShutdownPhase::Stopping);

        self.set_phase(ShutdownPhase::Draining);
        self.cancel_token.cancel();
        // Covers registries built with an unrelated root token.
        registry.stop_all();

        let drain_start = tokio::time::Instant::now();
        let remaining = loop {
            let active = registry.count();
            if active == 0 {
                info!("All subscriptions drained");
                break 0;
            }

            let elapsed = drain_start.elapsed();
            if elapsed >= self.timeout {
                warn!(
                    active_streams = active,
                    timeout_secs = self.timeout.as_secs(),
                    "Shutdown timeout exceeded, abandoning remaining subscriptions"
                );
                self.set_phase(ShutdownPhase::Terminating);
                break active;
            }

            debug!(
                active_streams = active,
                elapsed_ms = elapsed.as_millis() as u64,
                "Waiting for subscriptions to drain"
            );
            tokio::time::sleep(DRAIN_CHECK_INTERVAL).await;
        };

        self.set_phase(ShutdownPhase::Terminated);
        info!("Graceful shutdown complete");
        remaining
    }

    /// Cancel everything without waiting
    pub fn force_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!("Force shutdown initiated");
            self.set_phase(ShutdownPhase::Terminating);
            self.cancel_token.cancel();
            self.set_phase(ShutdownPhase::Terminated);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
