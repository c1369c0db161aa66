//! Shared types for the forecast service

use chrono::NaiveDate;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Placeholder for a categorical column that has no values at all
pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

/// One cleaned row of the event log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub date: NaiveDate,
    pub driver_id: String,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub quantity: f64,
}

impl EventRecord {
    /// Key of this record for the given grouping, if the column exists
    pub fn key(&self, kind: EntityKind) -> Option<&str> {
        match kind {
            EntityKind::Driver => Some(&self.driver_id),
            EntityKind::Location => self.location.as_deref(),
            EntityKind::EventType => self.event_type.as_deref(),
        }
    }
}

/// Sum of quantities for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub total_quantity: f64,
}

/// Grouping key used for allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Driver,
    Location,
    EventType,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Driver => "driver",
            EntityKind::Location => "location",
            EntityKind::EventType => "event_type",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked entity with its slice of the forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationEntry {
    pub entity_id: String,
    pub historical_total: f64,
    pub share: f64,
}

/// Driver identifiers that never appear in allocation output
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    drivers: FxHashSet<String>,
}

impl ExclusionList {
    pub fn new<I, S>(drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { drivers: drivers.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, driver_id: &str) -> bool {
        self.drivers.contains(driver_id)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Inclusive date range covered by a forecast run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Horizon {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Point estimates for historical and future dates, ordered by date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    points: Vec<ForecastPoint>,
}

impl Forecast {
    /// Build from unordered points; negative estimates are clamped to zero
    /// and duplicate dates keep the last value
    pub fn from_points(mut points: Vec<ForecastPoint>) -> Self {
        for p in &mut points {
            p.value = if p.value.is_finite() { p.value.max(0.0) } else { 0.0 };
        }
        points.reverse();
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { points }
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn horizon(&self) -> Option<Horizon> {
        let start = self.points.first()?.date;
        let end = self.points.last()?.date;
        Some(Horizon { start, end })
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_forecast_sorted_and_clamped() {
        let forecast = Forecast::from_points(vec![
            ForecastPoint { date: d(2024, 1, 3), value: 2.0 },
            ForecastPoint { date: d(2024, 1, 1), value: -1.5 },
            ForecastPoint { date: d(2024, 1, 2), value: f64::NAN },
        ]);

        assert_eq!(forecast.points()[0].date, d(2024, 1, 1));
        assert_eq!(forecast.value_at(d(2024, 1, 1)), Some(0.0));
        assert_eq!(forecast.value_at(d(2024, 1, 2)), Some(0.0));
        assert_eq!(forecast.value_at(d(2024, 1, 3)), Some(2.0));
        assert_eq!(forecast.value_at(d(2024, 1, 4)), None);
    }

    #[test]
    fn test_forecast_duplicate_dates_keep_last() {
        let forecast = Forecast::from_points(vec![
            ForecastPoint { date: d(2024, 1, 1), value: 1.0 },
            ForecastPoint { date: d(2024, 1, 1), value: 5.0 },
        ]);
        assert_eq!(forecast.points().len(), 1);
        assert_eq!(forecast.value_at(d(2024, 1, 1)), Some(5.0));
    }

    #[test]
    fn test_horizon_bounds() {
        let forecast = Forecast::from_points(vec![
            ForecastPoint { date: d(2024, 1, 1), value: 1.0 },
            ForecastPoint { date: d(2024, 1, 9), value: 1.0 },
        ]);
        let horizon = forecast.horizon().unwrap();
        assert_eq!(horizon, Horizon { start: d(2024, 1, 1), end: d(2024, 1, 9) });
        assert!(horizon.contains(d(2024, 1, 5)));
        assert!(!horizon.contains(d(2024, 1, 10)));
        assert!(Forecast::default().horizon().is_none());
    }

    #[test]
    fn test_exclusion_list() {
        let list = ExclusionList::new(["A", "B"]);
        assert!(list.contains("A"));
        assert!(!list.contains("C"));
        assert_eq!(list.len(), 2);
        assert!(ExclusionList::default().is_empty());
    }
}
