//! Forecasting capability
//!
//! The service only needs "given a daily series, produce point estimates
//! for the historical dates plus `horizon_days` future days". Two models,
//! selected by `model.mode`:
//! - `SeasonalTrendModel` runs in-process
//! - `HttpForecaster` (io::remote_model) delegates to an external service

use crate::domain::error::ModelError;
use crate::domain::types::{DailyAggregate, Forecast, ForecastPoint};
use crate::infra::config::{Config, ModelMode};
use crate::io::remote_model::HttpForecaster;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Minimum distinct days of history a model accepts
pub const MIN_HISTORY_DAYS: usize = 2;

const WEEKLY_MIN_DAYS: usize = 14;
const YEARLY_MIN_DAYS: usize = 365;

pub enum Forecaster {
    Local(SeasonalTrendModel),
    Http(HttpForecaster),
}

impl Forecaster {
    pub fn name(&self) -> &'static str {
        match self {
            Forecaster::Local(_) => "seasonal_trend",
            Forecaster::Http(_) => "http",
        }
    }

    /// Predict every historical date and `horizon_days` days after the last one
    pub async fn forecast(
        &self,
        history: &[DailyAggregate],
        horizon_days: u32,
    ) -> Result<Forecast, ModelError> {
        match self {
            Forecaster::Local(model) => model.forecast(history, horizon_days),
            Forecaster::Http(client) => client.forecast(history, horizon_days).await,
        }
    }
}

/// Create the forecaster selected by `model.mode`
pub fn build_forecaster(config: &Config) -> anyhow::Result<Forecaster> {
    let forecaster = match config.model_mode() {
        ModelMode::Local => Forecaster::Local(SeasonalTrendModel::new(
            config.weekly_seasonality(),
            config.yearly_seasonality(),
        )),
        ModelMode::Http => Forecaster::Http(HttpForecaster::new(
            config.model_url(),
            std::time::Duration::from_millis(config.model_timeout_ms()),
        )?),
    };
    info!(model = %forecaster.name(), horizon_days = %config.horizon_days(), "forecaster_initialized");
    Ok(forecaster)
}

/// Additive model: least-squares linear trend, plus mean residual per
/// weekday and per calendar month when the history is long enough.
/// Days missing from the history count as zero events.
#[derive(Debug, Clone)]
pub struct SeasonalTrendModel {
    weekly: bool,
    yearly: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct FittedModel {
    start: NaiveDate,
    intercept: f64,
    slope: f64,
    weekly: Option<[f64; 7]>,
    yearly: Option<[f64; 12]>,
}

impl FittedModel {
    fn predict(&self, date: NaiveDate) -> f64 {
        let t = (date - self.start).num_days() as f64;
        let mut y = self.intercept + self.slope * t;
        if let Some(weekly) = &self.weekly {
            y += weekly[date.weekday().num_days_from_monday() as usize];
        }
        if let Some(yearly) = &self.yearly {
            y += yearly[date.month0() as usize];
        }
        y
    }
}

/// Mean of `values` per bucket, centered so the buckets that have data sum to zero
fn centered_bucket_means<const N: usize>(values: impl Iterator<Item = (usize, f64)>) -> [f64; N] {
    let mut sums = [0.0; N];
    let mut counts = [0usize; N];
    for (bucket, v) in values {
        sums[bucket] += v;
        counts[bucket] += 1;
    }

    let mut means = [0.0; N];
    let mut filled = 0usize;
    let mut total = 0.0;
    for i in 0..N {
        if counts[i] > 0 {
            means[i] = sums[i] / counts[i] as f64;
            total += means[i];
            filled += 1;
        }
    }
    if filled > 0 {
        let offset = total / filled as f64;
        for i in 0..N {
            if counts[i] > 0 {
                means[i] -= offset;
            }
        }
    }
    means
}

impl SeasonalTrendModel {
    pub fn new(weekly: bool, yearly: bool) -> Self {
        Self { weekly, yearly }
    }

    fn fit(&self, history: &[DailyAggregate]) -> Result<FittedModel, ModelError> {
        let by_date: BTreeMap<NaiveDate, f64> =
            history.iter().fold(BTreeMap::new(), |mut acc, agg| {
                *acc.entry(agg.date).or_insert(0.0) += agg.total_quantity;
                acc
            });
        if by_date.len() < MIN_HISTORY_DAYS {
            return Err(ModelError::InsufficientHistory {
                needed: MIN_HISTORY_DAYS,
                got: by_date.len(),
            });
        }

        let (Some((&start, _)), Some((&end, _))) = (by_date.first_key_value(), by_date.last_key_value())
        else {
            return Err(ModelError::InsufficientHistory { needed: MIN_HISTORY_DAYS, got: 0 });
        };
        let series: Vec<(NaiveDate, f64)> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| (d, by_date.get(&d).copied().unwrap_or(0.0)))
            .collect();
        let n = series.len() as f64;

        let mean_t = (n - 1.0) / 2.0;
        let mean_y = series.iter().map(|(_, y)| y).sum::<f64>() / n;
        let (sxy, sxx) = series.iter().enumerate().fold((0.0, 0.0), |(sxy, sxx), (t, (_, y))| {
            let dt = t as f64 - mean_t;
            (sxy + dt * (y - mean_y), sxx + dt * dt)
        });
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_t;

        let mut residuals: Vec<f64> = series
            .iter()
            .enumerate()
            .map(|(t, (_, y))| y - (intercept + slope * t as f64))
            .collect();

        let weekly = (self.weekly && series.len() >= WEEKLY_MIN_DAYS).then(|| {
            let means: [f64; 7] = centered_bucket_means(
                series
                    .iter()
                    .zip(&residuals)
                    .map(|((d, _), r)| (d.weekday().num_days_from_monday() as usize, *r)),
            );
            for ((d, _), r) in series.iter().zip(residuals.iter_mut()) {
                *r -= means[d.weekday().num_days_from_monday() as usize];
            }
            means
        });

        let yearly = (self.yearly && series.len() >= YEARLY_MIN_DAYS).then(|| {
            let means: [f64; 12] = centered_bucket_means(
                series.iter().zip(&residuals).map(|((d, _), r)| (d.month0() as usize, *r)),
            );
            means
        });

        debug!(
            days = %series.len(),
            slope = %slope,
            intercept = %intercept,
            weekly = %weekly.is_some(),
            yearly = %yearly.is_some(),
            "seasonal_trend_fitted"
        );

        Ok(FittedModel { start, intercept, slope, weekly, yearly })
    }
}

impl SeasonalTrendModel {
    /// Fit on `history` and predict from its first date to `horizon_days` past its last
    pub fn forecast(
        &self,
        history: &[DailyAggregate],
        horizon_days: u32,
    ) -> Result<Forecast, ModelError> {
        let model = self.fit(history)?;
        let end = history.iter().map(|a| a.date).max().unwrap_or(model.start)
            + Duration::days(i64::from(horizon_days));

        let points = model
            .start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|date| ForecastPoint { date, value: model.predict(date) })
            .collect();
        Ok(Forecast::from_points(points))
    }
}
