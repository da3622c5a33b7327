//! Lodge - resident log-collection and query agent
//!
//! # Usage
//!
//! ```bash
//! lodge
//! lodge --config /etc/lodge/config.yaml
//! lodge --log-level debug
//! ```
//!
//! The agent stays up through all steady-state errors; only configuration
//! and store-open failures exit non-zero. SIGINT or SIGTERM triggers an
//! orderly shutdown: HTTP server first (1 s deadline), then inputs,
//! offsets, and storage.

mod app;
mod config;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::app::App;
use crate::config::Config;

/// Resident log-collection and query agent
#[derive(Parser, Debug)]
#[command(name = "lodge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/lodge/config.yaml")]
    config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Config::from_file(&cli.config)?;
    let app = App::open(config).await?;

    shutdown_signal().await;
    tracing::info!("shutting down");
    app.close().await;

    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}
