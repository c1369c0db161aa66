//! Immutable served state and its atomic swap point
//!
//! A `Snapshot` bundles one cleaned event log with the forecast fitted on
//! it. Readers grab an `Arc<Snapshot>` and work on it without holding the
//! lock; a retrain builds a complete new snapshot and swaps it in.

use crate::domain::types::{DailyAggregate, EventRecord, Forecast, Horizon};
use crate::services::cleaning::{CleanedLog, CleaningStats};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub struct Snapshot {
    id: Uuid,
    source: String,
    loaded_at: DateTime<Utc>,
    records: Vec<EventRecord>,
    daily: Vec<DailyAggregate>,
    stats: CleaningStats,
    forecast: Forecast,
}

impl Snapshot {
    pub fn new(source: impl Into<String>, log: CleanedLog, forecast: Forecast) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            loaded_at: Utc::now(),
            records: log.records,
            daily: log.daily,
            stats: log.stats,
            forecast,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Where the event log came from (file path or "upload")
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn daily(&self) -> &[DailyAggregate] {
        &self.daily
    }

    pub fn stats(&self) -> CleaningStats {
        self.stats
    }

    pub fn forecast(&self) -> &Forecast {
        &self.forecast
    }

    pub fn horizon(&self) -> Option<Horizon> {
        self.forecast.horizon()
    }

    pub fn has_locations(&self) -> bool {
        self.records.first().is_some_and(|r| r.location.is_some())
    }

    pub fn has_event_types(&self) -> bool {
        self.records.first().is_some_and(|r| r.event_type.is_some())
    }
}

/// Holder of the snapshot currently in service
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot in service, if one has been loaded
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    /// Swap in a new snapshot, returning the one it replaced
    pub fn replace(&self, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        self.current.write().replace(snapshot)
    }
}
