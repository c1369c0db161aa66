//! Event forecast service
//!
//! Forecasts the total daily event quantity from a historical event log and
//! splits it across drivers, locations and event types in proportion to
//! their history.
//!
//! Module structure:
//! - `domain/` - Core types (EventRecord, Forecast, errors)
//! - `io/` - External interfaces (CSV, uploads, HTTP API, remote model)
//! - `services/` - Cleaning, forecasting, allocation, snapshots
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use event_forecast::infra::{Config, Metrics};
use event_forecast::io::exclusions::load_exclusions;
use event_forecast::io::http::{start_server, AppState};
use event_forecast::services::{build_forecaster, Predictor};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Event forecast service - daily forecast and allocation API
#[derive(Parser, Debug)]
#[command(name = "event-forecast", version, about)]
struct Args {
    /// Path to TOML configuration file [default: $CONFIG_FILE, then config/dev.toml]
    #[arg(short, long)]
    config: Option<String>,

    /// Override the event log path from the config file
    #[arg(short, long)]
    data: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "event-forecast starting");

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(data) = args.data {
        config = config.with_data_path(data);
    }

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        data_path = %config.data_path(),
        model_mode = %config.model_mode().as_str(),
        horizon_days = %config.horizon_days(),
        top_n = %config.top_n(),
        event_types = ?config.event_types(),
        "config_loaded"
    );

    let exclusions = load_exclusions(config.exclusions_file())?;
    let forecaster = build_forecaster(&config)?;
    let metrics = Arc::new(Metrics::new());
    let predictor = Arc::new(Predictor::new(config.clone(), forecaster, exclusions, metrics.clone()));

    // A missing data file is not fatal: the service waits for an upload
    if Path::new(config.data_path()).exists() {
        predictor
            .load_file(config.data_path())
            .await
            .with_context(|| format!("Failed to load event log {}", config.data_path()))?;
    } else {
        warn!(path = %config.data_path(), "data_file_not_found_waiting_for_upload");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Periodic metrics summary in the log
    let reporter = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            reporter.summary().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let state = Arc::new(AppState::new(predictor, config.max_upload_bytes()));
    if let Err(e) = start_server(config.bind_address(), config.port(), state, shutdown_rx).await {
        error!(error = %e, "http_server_error");
        return Err(e).context("HTTP server failed");
    }

    info!("event-forecast shutdown complete");
    Ok(())
}
