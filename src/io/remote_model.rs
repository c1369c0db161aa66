//! HTTP client for an external forecasting service
//!
//! Request:  POST {url}  {"history":[{"ds":"2024-01-01","y":4.0}],"periods":7}
//! Response: {"forecast":[{"ds":"2024-01-01","yhat":3.9}, ...]}
//!
//! Column names follow the Prophet convention (`ds`, `y`, `yhat`).
//! `ds` in the response may carry a time part, which is ignored.

use crate::domain::error::ModelError;
use crate::domain::types::{DailyAggregate, Forecast, ForecastPoint};
use crate::services::forecaster::MIN_HISTORY_DAYS;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct HistoryRow {
    ds: NaiveDate,
    y: f64,
}

#[derive(Debug, Serialize)]
struct ForecastRequest {
    history: Vec<HistoryRow>,
    periods: u32,
}

#[derive(Debug, Deserialize)]
struct ForecastRow {
    ds: String,
    yhat: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    forecast: Vec<ForecastRow>,
}

pub struct HttpForecaster {
    url: String,
    client: reqwest::Client,
}

impl HttpForecaster {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ModelError> {
        // Single client for connection pooling
        let client = reqwest::Client::builder().timeout(timeout).http1_only().build()?;
        Ok(Self { url: url.to_string(), client })
    }

    fn encode_request(history: &[DailyAggregate], periods: u32) -> Result<Vec<u8>, ModelError> {
        let request = ForecastRequest {
            history: history.iter().map(|a| HistoryRow { ds: a.date, y: a.total_quantity }).collect(),
            periods,
        };
        serde_json::to_vec(&request).map_err(|e| ModelError::InvalidResponse(e.to_string()))
    }

    fn decode_response(body: &[u8]) -> Result<Forecast, ModelError> {
        let response: ForecastResponse =
            serde_json::from_slice(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let mut points = Vec::with_capacity(response.forecast.len());
        for row in response.forecast {
            let date_part = row.ds.get(..10).unwrap_or(&row.ds);
            let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .map_err(|e| ModelError::InvalidResponse(format!("bad ds {:?}: {}", row.ds, e)))?;
            // yhat is null where the model has no estimate
            if let Some(value) = row.yhat {
                points.push(ForecastPoint { date, value });
            }
        }
        if points.is_empty() {
            return Err(ModelError::InvalidResponse("empty forecast".to_string()));
        }
        Ok(Forecast::from_points(points))
    }

    pub async fn forecast(
        &self,
        history: &[DailyAggregate],
        horizon_days: u32,
    ) -> Result<Forecast, ModelError> {
        if history.len() < MIN_HISTORY_DAYS {
            return Err(ModelError::InsufficientHistory {
                needed: MIN_HISTORY_DAYS,
                got: history.len(),
            });
        }

        let start = Instant::now();
        let body = Self::encode_request(history, horizon_days)?;
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .inspect_err(|e| error!(url = %self.url, error = %e, "remote_model_request_failed"))?;

        let status = response.status();
        if !status.is_success() {
            error!(url = %self.url, status = %status.as_u16(), "remote_model_error_status");
            return Err(ModelError::RemoteStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let forecast = Self::decode_response(&bytes)?;
        info!(
            url = %self.url,
            points = %forecast.points().len(),
            latency_ms = %start.elapsed().as_millis(),
            "remote_model_forecast"
        );
        Ok(forecast)
    }
}
