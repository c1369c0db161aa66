//! Proportional allocation of a forecast total across entities
//!
//! share = entity_total / grand_total * forecast, clamped at zero.
//! Ranking is by historical total (descending, ties by id). Exclusions
//! are removed before truncating to top-N so the list is never under-filled.

use crate::domain::error::AllocationError;
use crate::domain::types::{AllocationEntry, EntityKind, EventRecord, ExclusionList};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Message reported for an event type with no history
pub const NO_EVENTS: &str = "no_events";

/// Historical totals per entity, ranked
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTotals {
    ranked: Vec<(String, f64)>,
    grand_total: f64,
}

impl EntityTotals {
    /// Group records by the given key. Records without the key are skipped.
    pub fn from_records<'a, I>(records: I, kind: EntityKind) -> Self
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut totals: FxHashMap<&str, f64> = FxHashMap::default();
        for record in records {
            if let Some(key) = record.key(kind) {
                *totals.entry(key).or_insert(0.0) += record.quantity;
            }
        }

        let mut ranked: Vec<(String, f64)> =
            totals.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let grand_total = ranked.iter().map(|(_, v)| v).sum();

        Self { ranked, grand_total }
    }

    pub fn grand_total(&self) -> f64 {
        self.grand_total
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Entities in rank order with their totals
    pub fn ranked(&self) -> &[(String, f64)] {
        &self.ranked
    }

    /// Shares against an explicit denominator
    fn shares_against(
        &self,
        denominator: f64,
        forecast: f64,
    ) -> Result<impl Iterator<Item = AllocationEntry> + '_, AllocationError> {
        if denominator.is_nan() || denominator <= 0.0 {
            return Err(AllocationError::InsufficientData);
        }
        Ok(self.ranked.iter().map(move |(id, total)| AllocationEntry {
            entity_id: id.clone(),
            historical_total: *total,
            share: (total / denominator * forecast).max(0.0),
        }))
    }

    /// Every entity with its share, no filtering or truncation
    pub fn full_allocation(&self, forecast: f64) -> Result<Vec<AllocationEntry>, AllocationError> {
        Ok(self.shares_against(self.grand_total, forecast)?.collect())
    }

    /// Ranked top-N shares, with excluded entities removed first
    pub fn top(
        &self,
        forecast: f64,
        exclusions: Option<&ExclusionList>,
        top_n: usize,
    ) -> Result<Vec<AllocationEntry>, AllocationError> {
        self.top_against(self.grand_total, forecast, exclusions, top_n)
    }

    fn top_against(
        &self,
        denominator: f64,
        forecast: f64,
        exclusions: Option<&ExclusionList>,
        top_n: usize,
    ) -> Result<Vec<AllocationEntry>, AllocationError> {
        Ok(self
            .shares_against(denominator, forecast)?
            .filter(|e| !exclusions.is_some_and(|x| x.contains(&e.entity_id)))
            .take(top_n)
            .collect())
    }
}

/// Allocate a forecast over one grouping. Exclusions only apply to drivers.
pub fn allocate(
    records: &[EventRecord],
    kind: EntityKind,
    forecast: f64,
    exclusions: &ExclusionList,
    top_n: usize,
) -> Result<Vec<AllocationEntry>, AllocationError> {
    let totals = EntityTotals::from_records(records, kind);
    let exclusions = (kind == EntityKind::Driver).then_some(exclusions);
    totals.top(forecast, exclusions, top_n)
}

/// Top drivers for one event type, or a marker when the type has no history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventTypeAllocation {
    Drivers(Vec<AllocationEntry>),
    Empty { message: &'static str },
}

/// Per event type, split that type's share of the forecast across the
/// drivers who had it. An empty `event_types` list means every observed type.
pub fn event_type_breakdown(
    records: &[EventRecord],
    forecast: f64,
    event_types: &[String],
    exclusions: &ExclusionList,
    top_n: usize,
) -> Result<BTreeMap<String, EventTypeAllocation>, AllocationError> {
    let all = EntityTotals::from_records(records, EntityKind::EventType);
    let grand_total = EntityTotals::from_records(records, EntityKind::Driver).grand_total();
    if grand_total.is_nan() || grand_total <= 0.0 {
        return Err(AllocationError::InsufficientData);
    }

    let wanted: Vec<String> = if event_types.is_empty() {
        all.ranked().iter().map(|(t, _)| t.clone()).collect()
    } else {
        event_types.iter().map(|t| t.trim().to_string()).collect()
    };

    let mut breakdown = BTreeMap::new();
    for event_type in wanted {
        let drivers = EntityTotals::from_records(
            records.iter().filter(|r| r.event_type.as_deref() == Some(event_type.as_str())),
            EntityKind::Driver,
        );
        let entry = if drivers.grand_total() > 0.0 {
            EventTypeAllocation::Drivers(drivers.top_against(
                grand_total,
                forecast,
                Some(exclusions),
                top_n,
            )?)
        } else {
            EventTypeAllocation::Empty { message: NO_EVENTS }
        };
        breakdown.insert(event_type, entry);
    }
    Ok(breakdown)
}
