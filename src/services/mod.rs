//! Services - business logic and state management
//!
//! - `cleaning` - Date parsing, imputation and daily aggregation
//! - `forecaster` - Forecaster trait and the in-process seasonal model
//! - `allocation` - Proportional split of a forecast across entities
//! - `snapshot` - Immutable served state and its swap point
//! - `predictor` - Load, retrain and prediction orchestration

pub mod allocation;
pub mod cleaning;
pub mod forecaster;
pub mod predictor;
pub mod snapshot;

// Re-export commonly used types
pub use forecaster::{build_forecaster, Forecaster, SeasonalTrendModel};
pub use predictor::{PredictionReport, Predictor};
pub use snapshot::{Snapshot, SnapshotStore};
