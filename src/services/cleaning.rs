//! Event log cleaning and per-day aggregation
//!
//! Turns a `RawTable` into typed `EventRecord`s and `DailyAggregate`s:
//! - required columns (date, driver, quantity) must exist
//! - dates are parsed day-first; rows with unparseable dates are dropped
//! - empty categorical cells take the column mode
//! - empty quantities take the column mean, unparseable ones become 0

use crate::domain::error::CleaningError;
use crate::domain::types::{DailyAggregate, EventRecord, UNKNOWN_CATEGORY};
use crate::infra::config::ColumnConfig;
use crate::io::event_log::RawTable;
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Counters describing one cleaning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub categorical_filled: usize,
    pub quantity_filled: usize,
    pub quantity_invalid: usize,
}

#[derive(Debug, Clone)]
pub struct CleanedLog {
    pub records: Vec<EventRecord>,
    pub daily: Vec<DailyAggregate>,
    pub stats: CleaningStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantityCell {
    Missing,
    Invalid,
    Value(f64),
}

/// Parse a quantity cell, accepting a decimal comma
pub fn parse_quantity(raw: &str) -> QuantityCell {
    let raw = raw.trim();
    if raw.is_empty() {
        return QuantityCell::Missing;
    }
    let parsed = raw.parse::<f64>().ok().or_else(|| {
        let normalized = if raw.contains('.') && raw.contains(',') {
            raw.replace('.', "").replace(',', ".")
        } else {
            raw.replace(',', ".")
        };
        normalized.parse::<f64>().ok()
    });
    match parsed {
        Some(v) if v.is_finite() => QuantityCell::Value(v),
        _ => QuantityCell::Invalid,
    }
}

/// Parse a date with the day-first convention.
///
/// Accepts `dd/mm/yyyy`, `dd-mm-yyyy`, `dd.mm.yyyy`, two-digit years
/// (00-68 => 20xx, 69-99 => 19xx) and ISO `yyyy-mm-dd`. Anything after a
/// space or `T` (time of day) is ignored.
pub fn parse_date_dayfirst(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split([' ', 'T']).next()?;
    let mut parts = date_part.split(['/', '-', '.']);
    let (a, b, c) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    if ![a, b, c].iter().all(|p| !p.is_empty() && p.bytes().all(|ch| ch.is_ascii_digit())) {
        return None;
    }

    let (year, month, day) = if a.len() == 4 {
        (a.parse::<i32>().ok()?, b.parse::<u32>().ok()?, c.parse::<u32>().ok()?)
    } else {
        let year = match c.len() {
            4 => c.parse::<i32>().ok()?,
            1 | 2 => {
                let yy = c.parse::<i32>().ok()?;
                if yy < 69 {
                    2000 + yy
                } else {
                    1900 + yy
                }
            }
            _ => return None,
        };
        (year, b.parse::<u32>().ok()?, a.parse::<u32>().ok()?)
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Most frequent value; ties resolve to the smallest value
fn column_mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for v in values.filter(|v| !v.is_empty()) {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
        .map(|(v, _)| v.to_string())
}

/// Fill a categorical column in place, returns the number of filled cells
fn fill_categorical(values: &mut [String]) -> usize {
    let missing = values.iter().filter(|v| v.is_empty()).count();
    if missing == 0 {
        return 0;
    }
    let fill =
        column_mode(values.iter().map(String::as_str)).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
    for v in values.iter_mut().filter(|v| v.is_empty()) {
        v.clone_from(&fill);
    }
    missing
}

/// Sum quantities per date; one aggregate per distinct date, sorted by date
pub fn aggregate_daily(records: &[EventRecord]) -> Vec<DailyAggregate> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.date).or_insert(0.0) += record.quantity;
    }
    totals
        .into_iter()
        .map(|(date, total_quantity)| DailyAggregate { date, total_quantity })
        .collect()
}

/// Clean a raw event log and aggregate it per day
pub fn clean(table: &RawTable, columns: &ColumnConfig) -> Result<CleanedLog, CleaningError> {
    if table.is_empty() {
        return Err(CleaningError::Empty);
    }

    let require = |name: &str| {
        table.column(name).ok_or_else(|| CleaningError::MissingColumn(name.to_string()))
    };
    let date_col = require(&columns.date)?;
    let driver_col = require(&columns.driver)?;
    let quantity_col = require(&columns.quantity)?;
    let location_col = columns.location.as_deref().and_then(|c| table.column(c));
    let event_type_col = columns.event_type.as_deref().and_then(|c| table.column(c));

    if columns.location.is_some() && location_col.is_none() {
        warn!(column = ?columns.location, "location_column_absent");
    }
    if columns.event_type.is_some() && event_type_col.is_none() {
        warn!(column = ?columns.event_type, "event_type_column_absent");
    }

    let mut stats = CleaningStats { rows_read: table.len(), ..Default::default() };

    let kept: Vec<(usize, NaiveDate)> = (0..table.len())
        .filter_map(|row| parse_date_dayfirst(table.cell(row, date_col)).map(|d| (row, d)))
        .collect();
    stats.rows_dropped = table.len() - kept.len();
    if stats.rows_dropped > 0 {
        warn!(dropped = %stats.rows_dropped, rows_read = %stats.rows_read, "invalid_dates_dropped");
    }
    if kept.is_empty() {
        return Err(CleaningError::NoValidDates { dropped: stats.rows_dropped });
    }

    let column_values = |col: usize| -> Vec<String> {
        kept.iter().map(|&(row, _)| table.cell(row, col).to_string()).collect()
    };

    let mut drivers = column_values(driver_col);
    stats.categorical_filled += fill_categorical(&mut drivers);

    let mut locations = location_col.map(column_values);
    if let Some(values) = locations.as_mut() {
        stats.categorical_filled += fill_categorical(values);
    }

    let mut event_types = event_type_col.map(column_values);
    if let Some(values) = event_types.as_mut() {
        stats.categorical_filled += fill_categorical(values);
    }

    let cells: Vec<QuantityCell> =
        kept.iter().map(|&(row, _)| parse_quantity(table.cell(row, quantity_col))).collect();
    let (sum, count) = cells.iter().fold((0.0, 0usize), |(s, n), c| match c {
        QuantityCell::Value(v) => (s + v, n + 1),
        _ => (s, n),
    });
    let mean = if count > 0 { sum / count as f64 } else { 0.0 };

    let mut records = Vec::with_capacity(kept.len());
    for (i, &(_, date)) in kept.iter().enumerate() {
        let quantity = match cells[i] {
            QuantityCell::Value(v) => v,
            QuantityCell::Missing => {
                stats.quantity_filled += 1;
                mean
            }
            QuantityCell::Invalid => {
                stats.quantity_invalid += 1;
                0.0
            }
        };
        records.push(EventRecord {
            date,
            driver_id: std::mem::take(&mut drivers[i]),
            location: locations.as_mut().map(|v| std::mem::take(&mut v[i])),
            event_type: event_types.as_mut().map(|v| std::mem::take(&mut v[i])),
            quantity,
        });
    }

    let daily = aggregate_daily(&records);

    info!(
        rows_read = %stats.rows_read,
        rows_kept = %records.len(),
        rows_dropped = %stats.rows_dropped,
        categorical_filled = %stats.categorical_filled,
        quantity_filled = %stats.quantity_filled,
        quantity_invalid = %stats.quantity_invalid,
        days = %daily.len(),
        "event_log_cleaned"
    );

    Ok(CleanedLog { records, daily, stats })
}
