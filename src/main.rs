//! ==============================================================================
//! main.rs - field gateway entry point
//! ==============================================================================
//!
//! purpose:
//!     sits between the esp32 field devices and the browser control page.
//!
//! responsibilities:
//!     - load gateway.toml (or defaults)
//!     - set up logging
//!     - open the telemetry log and audio directories
//!     - serve the http + websocket surface until ctrl-c
//!
//! architecture:
//!
//!     ┌──────────────┐   http / ws   ┌──────────────────────────────────┐
//!     │ esp32 device │ ────────────▶ │ server.rs / ws.rs                │
//!     └──────────────┘               │              │                   │
//!     ┌──────────────┐   http / ws   │       ┌──────┴──────┐            │
//!     │   browser    │ ────────────▶ │       │ dispatcher  │            │
//!     └──────────────┘               │       └──────┬──────┘            │
//!                                    │   ┌──────────┼──────────┐        │
//!                                    │ telemetry  audio   selection     │
//!                                    │ (jsonl)    (wav)   (one cell)    │
//!                                    └──────────────────────────────────┘
//!                                           │ relay.rs (optional)
//!                                           ▼
//!                               device push / second database
//!
//! ==============================================================================

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use field_gateway::config::GatewayConfig;
use field_gateway::{server, GatewayDispatcher};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let (config, config_note) = GatewayConfig::load_or_default();

    // step 2: logging, RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("===========================================================");
    tracing::info!("  Field Gateway - telemetry, audio prompts, language relay");
    tracing::info!("===========================================================");
    tracing::info!("[CONFIG] {}", config_note);
    config.log_summary();

    // step 3: open the stores
    let dispatcher = GatewayDispatcher::open(&config)
        .await
        .context("failed to open gateway storage")?;
    tracing::info!("[STARTUP] ✓ storage ready");

    // step 4: serve until ctrl-c
    let app = server::router(dispatcher, config.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("[STARTUP] ✓ listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("[SHUTDOWN] bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SHUTDOWN] could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
