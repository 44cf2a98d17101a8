//! # sshx Signaling Server
//!
//! Standalone rendezvous service. Peers exchange connection-setup payloads
//! through `POST /push/{key}` and `GET /pull/{key}`.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `SSHX_SIGNALING_CONFIG` file, env overrides)
//! 2. Initialize logging
//! 3. Bind `SSHX_SIGNALING_HOST:SSHX_SIGNALING_PORT` (default `0.0.0.0:8080`)
//! 4. Serve until Ctrl-C, then release waiting pulls and drain connections

use std::sync::Arc;

use anyhow::{Context, Result};
use sshx_signaling::domain::config::LoggingConfig;
use sshx_signaling::{SignalingConfig, SignalingService, VERSION};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.level)
        .with_context(|| format!("invalid log filter '{}'", logging.level))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = SignalingConfig::load().context("failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("sshx signaling v{}", VERSION);
    if std::env::var_os("SSHX_SIGNALING_PORT").is_none() {
        info!(port = config.http.port, "Defaulting port");
    }

    let service = Arc::new(SignalingService::new(config).context("invalid configuration")?);

    let signal_service = Arc::clone(&service);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal_service.shutdown();
    });

    service.start().await.context("rendezvous service failed")?;

    info!("Shutdown complete");
    Ok(())
}
