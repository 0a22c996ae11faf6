//! Server initialization
//!
//! Contains the main `run()` function that wires the relay and serves HTTP.

use super::config::{AppConfig, LogBackend, LogConfig};
use super::loader::load_config;
use super::validation::validate_production_config;
use crate::api::{api_router, WorkflowDefaults};
use anyhow::{Context, Result};
use axum::Router;
use pipstream_core::{
    wait_for_shutdown_signal, ComponentStatus, LogSource, MemoryLog, RedisLog, Relay,
    ShutdownController, TemporalHttpEngine,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting pipstream relay v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    validate_production_config(&config)?;

    let shutdown_controller = ShutdownController::with_timeout(Duration::from_secs(
        config.relay.shutdown_timeout_secs,
    ));
    let relay = build_relay(&config, shutdown_controller.token())?;

    match relay.health().await.log {
        ComponentStatus::Healthy => info!("Event log reachable"),
        _ => warn!("Event log unreachable at startup; streams will report errors until it recovers"),
    }

    let app = build_app(&config, relay.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Drain subscriptions first: open SSE responses end only after `disconnected`.
    let server_shutdown = shutdown_controller.clone();
    let server_relay = relay.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            let remaining = server_shutdown.shutdown(server_relay.registry()).await;
            if remaining > 0 {
                warn!(active_streams = remaining, "Stopping with subscriptions still draining");
            }
        })
        .await
        .context("HTTP server error")?;

    info!("pipstream shutdown complete");
    Ok(())
}

/// Open the configured event log.
pub fn build_log(config: &LogConfig) -> Result<Arc<dyn LogSource>> {
    let log: Arc<dyn LogSource> = match config.backend {
        LogBackend::Redis => {
            info!("Using Redis event log");
            Arc::new(RedisLog::new(&config.redis_url).context("Failed to create Redis log")?)
        }
        LogBackend::Memory => {
            warn!("Using in-memory event log; events do not survive a restart");
            Arc::new(MemoryLog::new())
        }
    };
    Ok(log)
}

/// Build the relay, attaching the workflow engine when enabled.
pub fn build_relay(config: &AppConfig, root: CancellationToken) -> Result<Relay> {
    let log = build_log(&config.log)?;
    let relay = Relay::new(log, config.relay_config(), root);

    if !config.workflow.enabled {
        info!("Workflow engine disabled");
        return Ok(relay);
    }

    let engine = TemporalHttpEngine::new(config.workflow.http_config())
        .context("Failed to create workflow engine client")?;
    info!(
        endpoint = %config.workflow.endpoint,
        namespace = %config.workflow.namespace,
        "Workflow engine enabled"
    );
    Ok(relay.with_workflow_engine(Arc::new(engine)))
}

/// Router with tracing and CORS layers.
pub fn build_app(config: &AppConfig, relay: Relay) -> Router {
    let defaults = WorkflowDefaults {
        task_queue: config.workflow.task_queue.clone(),
    };
    let app = api_router(relay, defaults).layer(TraceLayer::new_for_http());

    if config.server.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
