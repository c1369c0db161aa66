//! Forecast Report - offline forecast and allocation for one event log
//!
//! Runs the same cleaning, model and allocation as the service and prints
//! the report as JSON, without starting the HTTP server.
//!
//! Usage:
//!   forecast-report data/events.csv
//!   forecast-report data/events.csv --date 2024-03-02 --config config/dev.toml
//!   forecast-report data/events.csv --series

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use event_forecast::domain::types::ForecastPoint;
use event_forecast::infra::{Config, Metrics};
use event_forecast::io::exclusions::load_exclusions;
use event_forecast::services::{build_forecaster, Predictor};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Forecast Report - print the forecast and allocations for a CSV event log
#[derive(Parser, Debug)]
#[command(name = "forecast-report", version, about, long_about = None)]
struct Args {
    /// Event log CSV to forecast from
    csv: String,

    /// Path to TOML configuration file [default: $CONFIG_FILE, then config/dev.toml]
    #[arg(short, long)]
    config: Option<String>,

    /// Date to report (YYYY-MM-DD). Defaults to the first day after the history.
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Include the full forecast series in the output
    #[arg(long)]
    series: bool,
}

#[derive(Serialize)]
struct Output<'a, T: Serialize> {
    source: &'a str,
    rows: usize,
    rows_dropped: usize,
    days: usize,
    report: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<&'a [ForecastPoint]>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?
        .with_data_path(args.csv.clone())
        .with_persist_uploads(false);
    let exclusions = load_exclusions(config.exclusions_file())?;
    let forecaster = build_forecaster(&config)?;
    let predictor = Predictor::new(config, forecaster, exclusions, Arc::new(Metrics::new()));

    let snapshot = predictor
        .load_file(&args.csv)
        .await
        .with_context(|| format!("Failed to load event log {}", args.csv))?;

    let date = match args.date {
        Some(date) => date,
        None => snapshot
            .daily()
            .last()
            .and_then(|day| day.date.succ_opt())
            .context("event log has no history")?,
    };
    info!(date = %date, "report_date");

    let report = predictor.predict(date).with_context(|| format!("No report for {date}"))?;
    let stats = snapshot.stats();
    let output = Output {
        source: &args.csv,
        rows: snapshot.records().len(),
        rows_dropped: stats.rows_dropped,
        days: snapshot.daily().len(),
        report,
        series: args.series.then(|| snapshot.forecast().points()),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
