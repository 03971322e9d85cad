//! Shelly Bridge - REST/WebSocket bridge for Shelly switches
//!
//! Polls a fixed set of Shelly Gen2 relays over JSON-RPC, keeps their latest
//! telemetry in memory, and serves it over HTTP and WebSocket. Switch commands
//! are forwarded to the devices on demand.

mod api;
mod config;
mod control;
mod error;
mod hub;
mod models;
mod poller;
mod registry;
mod shelly;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::BridgeState;
use crate::control::DeviceController;
use crate::hub::BroadcastHub;
use crate::poller::Poller;
use crate::shelly::{RpcTransport, ShellyClient};
use crate::state::StateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelly_bridge=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting Shelly Bridge...");

    // Load configuration
    let config = config::Config::load()?;
    let registry = Arc::new(config.registry()?);
    tracing::info!("Configuration loaded: {} devices", registry.len());
    for device in registry.iter() {
        tracing::info!("  {} ({}) -> {}", device.id, device.name, device.base_url);
    }

    let poll_interval = config.poll.interval();
    let rpc_timeout = config.poll.rpc_timeout();
    if rpc_timeout < std::time::Duration::from_millis(config.poll.rpc_timeout_ms) {
        tracing::warn!(
            "RPC timeout lowered to {:?} to stay below the {:?} poll interval",
            rpc_timeout,
            poll_interval
        );
    }

    // Shared state
    let store = StateStore::new(&registry);
    let hub = BroadcastHub::new(store.clone(), config.poll.interval_secs, config.hub.capacity);
    let rpc: Arc<dyn RpcTransport> = Arc::new(ShellyClient::new(rpc_timeout)?);

    let poller = Arc::new(Poller::new(
        store.clone(),
        hub.clone(),
        rpc.clone(),
        poll_interval,
        rpc_timeout,
    ));

    let mut controller = DeviceController::new(registry.clone(), rpc);
    if config.poll.refresh_after_command {
        controller = controller.with_refresh(poller.clone());
    }

    // Background polling
    let shutdown = CancellationToken::new();
    let poll_task = tokio::spawn(poller.run(shutdown.clone()));

    // Build application router
    let state = BridgeState {
        registry,
        store,
        hub,
        controller: Arc::new(controller),
    };

    let app = api::routes(&config.server.ws_path)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {} (WebSocket at {})", addr, config.server.ws_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    if let Err(e) = poll_task.await {
        tracing::error!("Poller task failed: {}", e);
    }

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
