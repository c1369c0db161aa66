//! Domain models - core data types and error taxonomy
//!
//! - `EventRecord` - one cleaned row of the event log
//! - `DailyAggregate` - total quantity per calendar day
//! - `Forecast` / `Horizon` - point estimates and the dates they cover
//! - `AllocationEntry` - an entity's share of a forecast total
//! - `error` - typed failures for cleaning, fitting, prediction and uploads

pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use error::{AllocationError, CleaningError, LoadError, ModelError, PredictError, UploadError};
pub use types::{
    AllocationEntry, DailyAggregate, EntityKind, EventRecord, ExclusionList, Forecast,
    ForecastPoint, Horizon,
};
