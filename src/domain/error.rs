//! Error types for loading, fitting and serving forecasts

use crate::domain::types::Horizon;
use chrono::NaiveDate;
use thiserror::Error;

/// Failures while turning a raw event log into records and daily totals.
/// All of these are fatal at startup and rejected on upload.
#[derive(Debug, Error)]
pub enum CleaningError {
    #[error("event log has no data rows")]
    Empty,

    #[error("required column missing from event log: {0}")]
    MissingColumn(String),

    #[error("all {dropped} rows have unparseable dates")]
    NoValidDates { dropped: usize },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the forecasting capability
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("need at least {needed} days of history, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("remote model request failed: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("remote model returned status {0}")]
    RemoteStatus(u16),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("historical total is zero, cannot compute shares")]
    InsufficientData,
}

/// Per-request prediction failures, reported to the client
#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    #[error("model is not loaded yet, try again later")]
    NotReady,

    #[error("no forecast for {date}, available range is {} to {}", .horizon.start, .horizon.end)]
    OutOfHorizon { date: NaiveDate, horizon: Horizon },

    #[error("model has no estimate for {date} (range {} to {})", .horizon.start, .horizon.end)]
    NoEstimate { date: NaiveDate, horizon: Horizon },

    #[error("not enough historical data to compute shares")]
    InsufficientData,
}

impl PredictError {
    /// Machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            PredictError::NotReady => "model_not_ready",
            PredictError::OutOfHorizon { .. } => "date_out_of_horizon",
            PredictError::NoEstimate { .. } => "no_estimate",
            PredictError::InsufficientData => "insufficient_data",
        }
    }

    pub fn horizon(&self) -> Option<Horizon> {
        match self {
            PredictError::OutOfHorizon { horizon, .. } | PredictError::NoEstimate { horizon, .. } => {
                Some(*horizon)
            }
            _ => None,
        }
    }
}

impl From<AllocationError> for PredictError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InsufficientData => PredictError::InsufficientData,
        }
    }
}

/// Failures while building a snapshot from an event log
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Cleaning(#[from] CleaningError),

    #[error("model fit failed: {0}")]
    Model(#[from] ModelError),
}

/// Failures of the retrain-on-upload path
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request has no 'file' field")]
    MissingFile,

    #[error("upload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] multer::Error),

    #[error("could not read request body: {0}")]
    Body(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("could not persist upload: {0}")]
    Persist(#[from] std::io::Error),
}

impl UploadError {
    /// Machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            UploadError::MissingFile => "missing_file",
            UploadError::TooLarge { .. } => "upload_too_large",
            UploadError::Multipart(_) | UploadError::Body(_) => "invalid_upload",
            UploadError::Load(LoadError::Cleaning(CleaningError::MissingColumn(_))) => {
                "missing_column"
            }
            UploadError::Load(LoadError::Cleaning(CleaningError::Empty)) => "empty_file",
            UploadError::Load(LoadError::Cleaning(CleaningError::NoValidDates { .. })) => {
                "no_valid_dates"
            }
            UploadError::Load(LoadError::Cleaning(_)) => "invalid_upload",
            UploadError::Load(LoadError::Model(_)) => "model_fit_failed",
            UploadError::Persist(_) => "persist_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_horizon_message_has_bounds() {
        let horizon = Horizon {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
        };
        let err = PredictError::OutOfHorizon {
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            horizon,
        };
        assert_eq!(err.reason(), "date_out_of_horizon");
        assert_eq!(err.horizon(), Some(horizon));
        let msg = err.to_string();
        assert!(msg.contains("2024-01-01"));
        assert!(msg.contains("2024-01-09"));
    }

    #[test]
    fn test_upload_reason_codes() {
        let err = UploadError::from(LoadError::from(CleaningError::MissingColumn("DATA".to_string())));
        assert_eq!(err.reason(), "missing_column");
        assert_eq!(UploadError::MissingFile.reason(), "missing_file");
        let err = UploadError::from(LoadError::from(ModelError::RemoteStatus(500)));
        assert_eq!(err.reason(), "model_fit_failed");
        assert_eq!(PredictError::from(AllocationError::InsufficientData).reason(), "insufficient_data");
    }
}
