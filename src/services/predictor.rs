//! Snapshot building and prediction requests
//!
//! `Predictor` owns the snapshot store. Loading cleans an event log, fits
//! the forecaster and swaps the result in; a failed load leaves the served
//! snapshot untouched. Predictions read one snapshot and allocate the
//! forecast for the requested date from its history.

use crate::domain::error::{LoadError, PredictError, UploadError};
use crate::domain::types::{AllocationEntry, EntityKind, ExclusionList, Horizon};
use crate::infra::config::Config;
use crate::infra::metrics::{Metrics, PredictFailure};
use crate::io::event_log::{self, RawTable};
use crate::services::allocation::{allocate, event_type_breakdown, EventTypeAllocation};
use crate::services::cleaning;
use crate::services::forecaster::Forecaster;
use crate::services::snapshot::{Snapshot, SnapshotStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Answer to a prediction request
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub date: NaiveDate,
    pub forecast_total: f64,
    pub horizon: Horizon,
    pub top_drivers: Vec<AllocationEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_locations: Option<Vec<AllocationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_types: Option<BTreeMap<String, EventTypeAllocation>>,
    pub snapshot_id: String,
}

/// Allocation settings applied to every report
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub top_n: usize,
    pub event_types: Vec<String>,
    pub event_type_top_n: usize,
}

impl ReportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_n: config.top_n(),
            event_types: config.event_types().to_vec(),
            event_type_top_n: config.event_type_top_n(),
        }
    }
}

/// Build the report for `date` from one snapshot
pub fn predict_from(
    snapshot: &Snapshot,
    date: NaiveDate,
    exclusions: &ExclusionList,
    settings: &ReportSettings,
) -> Result<PredictionReport, PredictError> {
    let horizon = snapshot.horizon().ok_or(PredictError::NotReady)?;
    if !horizon.contains(date) {
        return Err(PredictError::OutOfHorizon { date, horizon });
    }
    // remote models may leave gaps inside the range
    let forecast_total =
        snapshot.forecast().value_at(date).ok_or(PredictError::NoEstimate { date, horizon })?;

    let records = snapshot.records();
    let top_drivers =
        allocate(records, EntityKind::Driver, forecast_total, exclusions, settings.top_n)?;
    let top_locations = snapshot
        .has_locations()
        .then(|| allocate(records, EntityKind::Location, forecast_total, exclusions, settings.top_n))
        .transpose()?;
    let event_types = snapshot
        .has_event_types()
        .then(|| {
            event_type_breakdown(
                records,
                forecast_total,
                &settings.event_types,
                exclusions,
                settings.event_type_top_n,
            )
        })
        .transpose()?;

    Ok(PredictionReport {
        date,
        forecast_total,
        horizon,
        top_drivers,
        top_locations,
        event_types,
        snapshot_id: snapshot.id().to_string(),
    })
}

pub struct Predictor {
    config: Config,
    settings: ReportSettings,
    forecaster: Forecaster,
    exclusions: ExclusionList,
    store: SnapshotStore,
    metrics: Arc<Metrics>,
    /// Serializes retrains so the persisted file matches the snapshot in service
    retrain_lock: Mutex<()>,
}

impl Predictor {
    pub fn new(
        config: Config,
        forecaster: Forecaster,
        exclusions: ExclusionList,
        metrics: Arc<Metrics>,
    ) -> Self {
        let settings = ReportSettings::from_config(&config);
        Self {
            config,
            settings,
            forecaster,
            exclusions,
            store: SnapshotStore::new(),
            metrics,
            retrain_lock: Mutex::new(()),
        }
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Clean and fit without touching the served snapshot
    pub async fn build_snapshot(&self, table: &RawTable, source: &str) -> Result<Snapshot, LoadError> {
        let start = Instant::now();
        let log = cleaning::clean(table, self.config.columns())?;
        let forecast = self.forecaster.forecast(&log.daily, self.config.horizon_days()).await?;

        if let Some(horizon) = forecast.horizon() {
            info!(
                source = %source,
                model = %self.forecaster.name(),
                days = %log.daily.len(),
                horizon_start = %horizon.start,
                horizon_end = %horizon.end,
                fit_ms = %start.elapsed().as_millis(),
                "model_fitted"
            );
        }
        Ok(Snapshot::new(source, log, forecast))
    }

    /// Put a snapshot into service
    pub fn install(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let stats = snapshot.stats();
        self.metrics.record_snapshot(
            snapshot.records().len(),
            stats.rows_dropped,
            snapshot.daily().len(),
            snapshot.forecast().points().len(),
        );
        let previous = self.store.replace(snapshot.clone());
        info!(
            snapshot_id = %snapshot.id(),
            previous_id = ?previous.map(|p| p.id()),
            source = %snapshot.source(),
            rows = %snapshot.records().len(),
            "snapshot_installed"
        );
        snapshot
    }

    /// Load the configured event log file and put it into service
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Snapshot>, LoadError> {
        let path = path.as_ref();
        let table = event_log::read_path(path, self.config.delimiter())
            .map_err(LoadError::Cleaning)?;
        let snapshot = self.build_snapshot(&table, &path.display().to_string()).await?;
        Ok(self.install(snapshot))
    }

    /// Retrain from an uploaded CSV. The snapshot is only replaced once
    /// the upload has been cleaned, fitted and (optionally) persisted.
    pub async fn retrain_from_upload(&self, bytes: &[u8]) -> Result<Arc<Snapshot>, UploadError> {
        let result = self.try_retrain(bytes).await;
        self.metrics.record_upload(result.is_ok());
        if let Err(e) = &result {
            warn!(error = %e, reason = %e.reason(), bytes = %bytes.len(), "upload_rejected");
        }
        result
    }

    async fn try_retrain(&self, bytes: &[u8]) -> Result<Arc<Snapshot>, UploadError> {
        let _guard = self.retrain_lock.lock().await;

        let table =
            event_log::read_bytes(bytes, self.config.delimiter()).map_err(LoadError::Cleaning)?;
        let snapshot = self.build_snapshot(&table, "upload").await?;
        if self.config.persist_uploads() {
            persist_upload(self.config.data_path(), bytes, snapshot.id()).await?;
        }
        Ok(self.install(snapshot))
    }

    /// Forecast and allocations for `date` from the snapshot in service
    pub fn predict(&self, date: NaiveDate) -> Result<PredictionReport, PredictError> {
        let result = self
            .store
            .current()
            .ok_or(PredictError::NotReady)
            .and_then(|snapshot| predict_from(&snapshot, date, &self.exclusions, &self.settings));

        match &result {
            Ok(report) => {
                self.metrics.record_prediction();
                info!(
                    date = %date,
                    forecast_total = %report.forecast_total,
                    drivers = %report.top_drivers.len(),
                    "prediction_served"
                );
            }
            Err(e) => {
                self.metrics.record_prediction_failure(match e {
                    PredictError::NotReady => PredictFailure::NotReady,
                    PredictError::OutOfHorizon { .. } => PredictFailure::OutOfHorizon,
                    PredictError::NoEstimate { .. } => PredictFailure::NoEstimate,
                    PredictError::InsufficientData => PredictFailure::InsufficientData,
                });
                info!(date = %date, reason = %e.reason(), "prediction_rejected");
            }
        }
        result
    }
}

/// Overwrite the data file via a temporary file (unique per snapshot) and rename
async fn persist_upload(path: &str, bytes: &[u8], snapshot_id: Uuid) -> std::io::Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{snapshot_id}.tmp"));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    info!(path = %path.display(), bytes = %bytes.len(), "upload_persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::CleaningError;
    use crate::domain::types::{DailyAggregate, EventRecord, Forecast, ForecastPoint};
    use crate::services::cleaning::{CleanedLog, CleaningStats};
    use crate::services::forecaster::SeasonalTrendModel;
    use tempfile::tempdir;

    const LOG: &str = "DATA;MOTORISTA;QUANTIDADE;LOCALIDADE;EVENTO\n\
        01/01/2024;A;3;North;speeding\n\
        01/01/2024;B;1;South;braking\n\
        02/01/2024;A;2;North;braking\n";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn predictor(config: Config, exclusions: ExclusionList) -> Predictor {
        let forecaster = Forecaster::Local(SeasonalTrendModel::new(false, false));
        Predictor::new(config, forecaster, exclusions, Arc::new(Metrics::new()))
    }

    fn test_config() -> Config {
        Config::default().with_persist_uploads(false)
    }

    #[tokio::test]
    async fn test_not_ready_before_load() {
        let predictor = predictor(test_config(), ExclusionList::default());
        assert_eq!(predictor.predict(d(2024, 1, 3)).unwrap_err(), PredictError::NotReady);
        assert_eq!(predictor.metrics().summary().not_ready_total, 1);
    }

    #[tokio::test]
    async fn test_predict_after_upload() {
        let predictor = predictor(test_config(), ExclusionList::default());
        predictor.retrain_from_upload(LOG.as_bytes()).await.unwrap();

        let report = predictor.predict(d(2024, 1, 2)).unwrap();
        assert!(report.forecast_total > 0.0);
        assert_eq!(report.horizon, Horizon { start: d(2024, 1, 1), end: d(2024, 1, 9) });
        assert_eq!(report.top_drivers[0].entity_id, "A");

        let sum: f64 = report.top_drivers.iter().map(|e| e.share).sum();
        assert!((sum - report.forecast_total).abs() < 1e-9);

        let locations = report.top_locations.unwrap();
        assert_eq!(locations[0].entity_id, "North");
        assert_eq!(report.event_types.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_horizon_reports_bounds() {
        let predictor = predictor(test_config(), ExclusionList::default());
        predictor.retrain_from_upload(LOG.as_bytes()).await.unwrap();

        for date in [d(2023, 12, 31), d(2024, 1, 10)] {
            let err = predictor.predict(date).unwrap_err();
            assert_eq!(
                err,
                PredictError::OutOfHorizon {
                    date,
                    horizon: Horizon { start: d(2024, 1, 1), end: d(2024, 1, 9) }
                }
            );
        }
    }

    #[tokio::test]
    async fn test_zero_totals_insufficient_data() {
        let predictor = predictor(test_config(), ExclusionList::default());
        predictor
            .retrain_from_upload(b"DATA;MOTORISTA;QUANTIDADE\n01/01/2024;A;0\n02/01/2024;B;0\n")
            .await
            .unwrap();
        assert_eq!(predictor.predict(d(2024, 1, 2)).unwrap_err(), PredictError::InsufficientData);
    }

    #[tokio::test]
    async fn test_exclusions_removed_from_report() {
        let predictor = predictor(test_config(), ExclusionList::new(["A"]));
        predictor.retrain_from_upload(LOG.as_bytes()).await.unwrap();

        let report = predictor.predict(d(2024, 1, 2)).unwrap();
        assert!(report.top_drivers.iter().all(|e| e.entity_id != "A"));
        for entry in report.event_types.unwrap().values() {
            if let EventTypeAllocation::Drivers(drivers) = entry {
                assert!(drivers.iter().all(|e| e.entity_id != "A"));
            }
        }
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_snapshot() {
        let predictor = predictor(test_config(), ExclusionList::default());
        let first = predictor.retrain_from_upload(LOG.as_bytes()).await.unwrap();

        let err = predictor.retrain_from_upload(b"DATA;QUANTIDADE\n01/01/2024;3\n").await.unwrap_err();
        assert!(matches!(err, UploadError::Load(LoadError::Cleaning(CleaningError::MissingColumn(_)))));

        // single day of history cannot be fitted
        let err = predictor
            .retrain_from_upload(b"DATA;MOTORISTA;QUANTIDADE\n01/01/2024;A;3\n")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "model_fit_failed");

        assert_eq!(predictor.current_snapshot().unwrap().id(), first.id());
        let summary = predictor.metrics().summary();
        assert_eq!(summary.uploads_accepted_total, 1);
        assert_eq!(summary.uploads_rejected_total, 2);
    }

    #[tokio::test]
    async fn test_upload_persisted_to_data_path() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("nested").join("events.csv");
        let config = Config::default().with_data_path(data_path.to_str().unwrap());
        let predictor = predictor(config, ExclusionList::default());

        predictor.retrain_from_upload(LOG.as_bytes()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&data_path).unwrap(), LOG);

        // reload from the persisted file
        let snapshot = predictor.load_file(&data_path).await.unwrap();
        assert_eq!(snapshot.records().len(), 3);
    }

    fn single_driver_log(driver: &str) -> String {
        format!("DATA;MOTORISTA;QUANTIDADE\n01/01/2024;{driver};3\n02/01/2024;{driver};2\n")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_uploads_persist_served_snapshot() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("events.csv");
        let config = Config::default().with_data_path(data_path.to_str().unwrap());
        let predictor = Arc::new(predictor(config, ExclusionList::default()));

        for round in 0..25 {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let predictor = predictor.clone();
                    let log = single_driver_log(&format!("R{round}D{i}"));
                    tokio::spawn(async move { predictor.retrain_from_upload(log.as_bytes()).await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let served = predictor.current_snapshot().unwrap();
            let on_disk = std::fs::read_to_string(&data_path).unwrap();
            assert_eq!(on_disk, single_driver_log(&served.records()[0].driver_id));
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(predictor.metrics().summary().uploads_accepted_total, 100);
    }

    #[test]
    fn test_gap_inside_horizon_is_no_estimate() {
        let date = d(2024, 1, 1);
        let log = CleanedLog {
            records: vec![EventRecord {
                date,
                driver_id: "A".to_string(),
                location: None,
                event_type: None,
                quantity: 2.0,
            }],
            daily: vec![DailyAggregate { date, total_quantity: 2.0 }],
            stats: CleaningStats::default(),
        };
        // no point for Jan 2, as when a remote model returns a null yhat
        let forecast = Forecast::from_points(vec![
            ForecastPoint { date, value: 2.0 },
            ForecastPoint { date: d(2024, 1, 3), value: 1.0 },
        ]);
        let snapshot = Snapshot::new("test", log, forecast);
        let settings = ReportSettings::from_config(&Config::default());

        let err = predict_from(&snapshot, d(2024, 1, 2), &ExclusionList::default(), &settings)
            .unwrap_err();
        assert_eq!(err.reason(), "no_estimate");
        assert_eq!(err.horizon(), Some(Horizon { start: date, end: d(2024, 1, 3) }));

        let err = predict_from(&snapshot, d(2024, 1, 4), &ExclusionList::default(), &settings)
            .unwrap_err();
        assert_eq!(err.reason(), "date_out_of_horizon");
        assert!(predict_from(&snapshot, d(2024, 1, 3), &ExclusionList::default(), &settings).is_ok());
    }
}
