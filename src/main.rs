//! WhatsApp Notification Bridge - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use wa_bridge::{api, config::Config, ratelimit::RateLimiter, session::SessionManager, transport::HttpTransport};

/// Sweep cadence for stale rate limit buckets, and how long a bucket may
/// sit idle before it is dropped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const BUCKET_MAX_IDLE: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wa_bridge=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting WhatsApp notification bridge"
    );

    let shutdown = CancellationToken::new();

    // Transport to the messaging gateway, with its event pump
    let transport = Arc::new(HttpTransport::new(&config.gateway_url)?);
    Arc::clone(&transport).spawn_event_pump(shutdown.clone());

    // Session state machine
    let session = SessionManager::new(transport, config.reconnect.clone(), shutdown.clone());
    session.spawn_event_loop();

    // Initial connect is best-effort: handlers retry lazily through
    // ensure_connected, and the reconnect loop covers later drops.
    if let Err(e) = session.connect().await {
        tracing::warn!(error = %e, "initial connect failed, will retry on demand");
    }

    // Rate limiter with background bucket sweeper
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    Arc::clone(&rate_limiter).spawn_sweeper(SWEEP_INTERVAL, BUCKET_MAX_IDLE, shutdown.clone());

    // Build application state and router
    let state = api::AppState::new(Arc::clone(&session), rate_limiter, config.clone());
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C signal handler");
            info!("Received shutdown signal, cleaning up...");
            shutdown.cancel();
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    session.disconnect().await;
    shutdown.cancel();

    info!("Server shutdown complete");

    Ok(())
}
