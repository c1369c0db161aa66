//! End-to-end tests: CSV file -> cleaning -> model -> allocation

use chrono::{Duration, NaiveDate};
use event_forecast::domain::{ExclusionList, Horizon, PredictError};
use event_forecast::infra::{Config, Metrics};
use event_forecast::services::allocation::EventTypeAllocation;
use event_forecast::services::{build_forecaster, Predictor};
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Four weeks of events for three drivers at two locations
fn event_log() -> String {
    let mut csv = String::from("data;motorista;quantidade;localidade;evento\n");
    let start = d(2024, 3, 1);
    for offset in 0..28 {
        let date = start + Duration::days(offset);
        let day = date.format("%d/%m/%Y");
        csv.push_str(&format!("{day};D1;{};North;speeding\n", 3 + offset % 3));
        csv.push_str(&format!("{day};D2;2;South;braking\n"));
        if offset % 2 == 0 {
            csv.push_str(&format!("{day};D3;1;North;speeding\n"));
        }
    }
    // unparseable date is dropped, blank quantity is imputed
    csv.push_str("not a date;D1;9;North;speeding\n");
    csv.push_str("05/03/2024;D2;;South;braking\n");
    csv
}

fn write_log(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn predictor(exclusions: ExclusionList) -> Predictor {
    let config = Config::default().with_persist_uploads(false);
    let forecaster = build_forecaster(&config).unwrap();
    Predictor::new(config, forecaster, exclusions, Arc::new(Metrics::new()))
}

#[tokio::test]
async fn test_file_load_and_predict_whole_horizon() {
    let file = write_log(&event_log());
    let predictor = predictor(ExclusionList::default());

    let snapshot = predictor.load_file(file.path()).await.unwrap();
    assert_eq!(snapshot.stats().rows_dropped, 1);
    assert_eq!(snapshot.daily().len(), 28);

    let horizon = snapshot.horizon().unwrap();
    assert_eq!(horizon, Horizon { start: d(2024, 3, 1), end: d(2024, 4, 4) });

    let mut date = horizon.start;
    while date <= horizon.end {
        let report = predictor.predict(date).unwrap();
        assert!(report.forecast_total >= 0.0);
        assert_eq!(report.top_drivers.len(), 3);

        // top_n covers every driver so shares add up to the forecast
        let sum: f64 = report.top_drivers.iter().map(|e| e.share).sum();
        assert!((sum - report.forecast_total).abs() < 1e-6);
        assert!(report.top_drivers.windows(2).all(|w| w[0].historical_total >= w[1].historical_total));
        date = date.succ_opt().unwrap();
    }
}

#[tokio::test]
async fn test_dates_outside_horizon_rejected() {
    let file = write_log(&event_log());
    let predictor = predictor(ExclusionList::default());
    predictor.load_file(file.path()).await.unwrap();

    for date in [d(2024, 2, 29), d(2024, 4, 5)] {
        let err = predictor.predict(date).unwrap_err();
        assert_eq!(err.reason(), "date_out_of_horizon");
        assert_eq!(err.horizon(), Some(Horizon { start: d(2024, 3, 1), end: d(2024, 4, 4) }));
    }
    assert_eq!(predictor.metrics().summary().out_of_horizon_total, 2);
}

#[tokio::test]
async fn test_excluded_driver_keeps_denominator() {
    let file = write_log(&event_log());
    let all = predictor(ExclusionList::default());
    let filtered = predictor(ExclusionList::new(["D1"]));
    all.load_file(file.path()).await.unwrap();
    filtered.load_file(file.path()).await.unwrap();

    let date = d(2024, 3, 29);
    let full = all.predict(date).unwrap();
    let report = filtered.predict(date).unwrap();

    assert!(report.top_drivers.iter().all(|e| e.entity_id != "D1"));
    for entry in &report.top_drivers {
        let same = full.top_drivers.iter().find(|e| e.entity_id == entry.entity_id).unwrap();
        assert!((same.share - entry.share).abs() < 1e-9);
    }

    let event_types = report.event_types.unwrap();
    match &event_types["speeding"] {
        EventTypeAllocation::Drivers(drivers) => {
            assert_eq!(drivers.len(), 1);
            assert_eq!(drivers[0].entity_id, "D3");
        }
        other => panic!("unexpected allocation {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_file_leaves_service_not_ready() {
    let dir = tempdir().unwrap();
    let predictor = predictor(ExclusionList::default());

    assert!(predictor.load_file(dir.path().join("absent.csv")).await.is_err());
    assert_eq!(predictor.predict(d(2024, 3, 1)).unwrap_err(), PredictError::NotReady);
}

#[tokio::test]
async fn test_upload_replaces_file_snapshot() {
    let file = write_log(&event_log());
    let predictor = predictor(ExclusionList::default());
    let first = predictor.load_file(file.path()).await.unwrap();

    let upload = "DATA;MOTORISTA;QUANTIDADE\n01/06/2024;Z;4\n02/06/2024;Z;6\n";
    let second = predictor.retrain_from_upload(upload.as_bytes()).await.unwrap();
    assert_ne!(first.id(), second.id());

    let report = predictor.predict(d(2024, 6, 3)).unwrap();
    assert_eq!(report.top_drivers.len(), 1);
    assert_eq!(report.top_drivers[0].entity_id, "Z");
    assert!(report.top_locations.is_none());
    assert!(report.event_types.is_none());
    assert_eq!(predictor.predict(d(2024, 3, 10)).unwrap_err().reason(), "date_out_of_horizon");
}
