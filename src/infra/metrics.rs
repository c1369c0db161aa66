//! Lock-free service metrics and periodic reporting
//!
//! Counters are monotonic; gauges describe the snapshot in service.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are
//! statistical counters only, never used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Prediction failure classes tracked separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictFailure {
    InvalidDate,
    NotReady,
    OutOfHorizon,
    NoEstimate,
    InsufficientData,
}

#[derive(Debug, Default)]
pub struct Metrics {
    predictions_total: AtomicU64,
    invalid_date_total: AtomicU64,
    not_ready_total: AtomicU64,
    out_of_horizon_total: AtomicU64,
    no_estimate_total: AtomicU64,
    insufficient_data_total: AtomicU64,
    uploads_accepted_total: AtomicU64,
    uploads_rejected_total: AtomicU64,
    snapshot_swaps_total: AtomicU64,
    /// Records in the snapshot currently served
    snapshot_rows: AtomicU64,
    /// Rows dropped for bad dates when the snapshot was built
    snapshot_rows_dropped: AtomicU64,
    snapshot_days: AtomicU64,
    forecast_points: AtomicU64,
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub predictions_total: u64,
    pub invalid_date_total: u64,
    pub not_ready_total: u64,
    pub out_of_horizon_total: u64,
    pub no_estimate_total: u64,
    pub insufficient_data_total: u64,
    pub uploads_accepted_total: u64,
    pub uploads_rejected_total: u64,
    pub snapshot_swaps_total: u64,
    pub snapshot_rows: u64,
    pub snapshot_rows_dropped: u64,
    pub snapshot_days: u64,
    pub forecast_points: u64,
}

impl MetricsSummary {
    pub fn prediction_errors_total(&self) -> u64 {
        self.invalid_date_total
            + self.not_ready_total
            + self.out_of_horizon_total
            + self.no_estimate_total
            + self.insufficient_data_total
    }

    /// Log the summary as a structured event
    pub fn log(&self) {
        info!(
            predictions = %self.predictions_total,
            prediction_errors = %self.prediction_errors_total(),
            out_of_horizon = %self.out_of_horizon_total,
            not_ready = %self.not_ready_total,
            uploads_accepted = %self.uploads_accepted_total,
            uploads_rejected = %self.uploads_rejected_total,
            snapshot_swaps = %self.snapshot_swaps_total,
            snapshot_rows = %self.snapshot_rows,
            snapshot_days = %self.snapshot_days,
            "metrics"
        );
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_prediction(&self) {
        self.predictions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_prediction_failure(&self, failure: PredictFailure) {
        let counter = match failure {
            PredictFailure::InvalidDate => &self.invalid_date_total,
            PredictFailure::NotReady => &self.not_ready_total,
            PredictFailure::OutOfHorizon => &self.out_of_horizon_total,
            PredictFailure::NoEstimate => &self.no_estimate_total,
            PredictFailure::InsufficientData => &self.insufficient_data_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_upload(&self, accepted: bool) {
        if accepted {
            self.uploads_accepted_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_rejected_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a snapshot swap and the shape of the new snapshot
    pub fn record_snapshot(&self, rows: usize, rows_dropped: usize, days: usize, points: usize) {
        self.snapshot_swaps_total.fetch_add(1, Ordering::Relaxed);
        self.snapshot_rows.store(rows as u64, Ordering::Relaxed);
        self.snapshot_rows_dropped.store(rows_dropped as u64, Ordering::Relaxed);
        self.snapshot_days.store(days as u64, Ordering::Relaxed);
        self.forecast_points.store(points as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            predictions_total: self.predictions_total.load(Ordering::Relaxed),
            invalid_date_total: self.invalid_date_total.load(Ordering::Relaxed),
            not_ready_total: self.not_ready_total.load(Ordering::Relaxed),
            out_of_horizon_total: self.out_of_horizon_total.load(Ordering::Relaxed),
            no_estimate_total: self.no_estimate_total.load(Ordering::Relaxed),
            insufficient_data_total: self.insufficient_data_total.load(Ordering::Relaxed),
            uploads_accepted_total: self.uploads_accepted_total.load(Ordering::Relaxed),
            uploads_rejected_total: self.uploads_rejected_total.load(Ordering::Relaxed),
            snapshot_swaps_total: self.snapshot_swaps_total.load(Ordering::Relaxed),
            snapshot_rows: self.snapshot_rows.load(Ordering::Relaxed),
            snapshot_rows_dropped: self.snapshot_rows_dropped.load(Ordering::Relaxed),
            snapshot_days: self.snapshot_days.load(Ordering::Relaxed),
            forecast_points: self.forecast_points.load(Ordering::Relaxed),
        }
    }
}
