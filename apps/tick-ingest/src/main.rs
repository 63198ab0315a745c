//! Tick Ingest Binary
//!
//! Starts the tick ingestion service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-ingest
//! ```
//!
//! # Environment Variables
//!
//! All optional; see the config module for defaults.
//!
//! - `TICK_INGEST_BIND_HOST` / `TICK_INGEST_BIND_PORT`: listener address
//! - `TICK_INGEST_MAX_CONNECTIONS`: soft connection cap
//! - `TICK_INGEST_IDLE_TIMEOUT_SECS`: idle window before a connection is closed
//! - `TICK_LOG_BROKERS`: comma-separated tick log broker addresses
//! - `TICK_LOG_TOPIC` / `TICK_LOG_ACKS` / `TICK_LOG_RETRIES`: publish settings
//! - `TICK_VALIDATION_MODE`: strict | permissive
//! - `TICK_MAX_PRICE_DEVIATION` / `TICK_MAX_TIMESTAMP_AGE_SECS`: validation limits
//! - `RUST_LOG`: log filter (default: info)
//!
//! # Exit Codes
//!
//! 0 on clean shutdown; non-zero when the listener cannot bind or the tick
//! log is unreachable after the initial connect budget.

use std::sync::Arc;

use anyhow::Context;
use tick_ingest::application::ports::TickPublisher;
use tick_ingest::application::services::IngestPipeline;
use tick_ingest::domain::enrichment::Enricher;
use tick_ingest::domain::validation::ValidationEngine;
use tick_ingest::infrastructure::config::IngestConfig;
use tick_ingest::infrastructure::publish::{LogConfig, LogPublisher};
use tick_ingest::infrastructure::server::{IngestServer, ServerConfig};
use tick_ingest::infrastructure::{metrics, telemetry};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting tick ingest service");
    metrics::register_metrics();

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown = CancellationToken::new();

    // Startup failures past this point exit non-zero.
    let publisher = Arc::new(
        LogPublisher::connect(LogConfig::from(config.log.clone()))
            .await
            .context("tick log unreachable")?,
    );

    let engine = ValidationEngine::new(config.validation.clone().into());
    let pipeline = Arc::new(IngestPipeline::new(
        engine,
        Enricher::new(),
        Arc::clone(&publisher) as Arc<dyn TickPublisher>,
    ));

    let server = IngestServer::bind(
        ServerConfig::from(config.server.clone()),
        pipeline,
        shutdown.clone(),
    )
    .await
    .context("listener startup failed")?;

    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        joined = &mut server_task => {
            joined.context("server task panicked")?;
        }
        () = await_shutdown_signal() => {
            shutdown.cancel();
            server_task.await.context("server task panicked")?;
        }
    }

    let lost = publisher.shutdown().await;
    if lost > 0 {
        tracing::warn!(lost, "shutdown completed with unflushed records");
    }

    tracing::info!("tick ingest stopped");
    Ok(())
}

/// Load a `.env` file from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        bind = %config.server.bind_addr(),
        max_connections = config.server.max_connections,
        idle_secs = config.server.idle_timeout.as_secs(),
        "Server configuration loaded"
    );
    tracing::info!(
        brokers = ?config.log.brokers,
        topic = %config.log.topic,
        acks = config.log.acks.as_str(),
        retries = config.log.max_retries,
        "Tick log configuration loaded"
    );
    tracing::info!(
        mode = config.validation.mode.as_str(),
        max_deviation = %config.validation.max_deviation,
        max_age_secs = config.validation.max_timestamp_age.as_secs(),
        "Validation configuration loaded"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
