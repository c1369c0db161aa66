//! IO modules - external interfaces
//!
//! - `event_log` - CSV reading into a raw table
//! - `exclusions` - Driver exclusion list file
//! - `upload` - CSV extraction from multipart or raw request bodies
//! - `http` - HTTP API (predict, upload, health, metrics)
//! - `prometheus` - Prometheus text format rendering
//! - `remote_model` - HTTP client for an external forecasting service

pub mod event_log;
pub mod exclusions;
pub mod http;
pub mod prometheus;
pub mod remote_model;
pub mod upload;

// Re-export commonly used types
pub use event_log::RawTable;
pub use http::{start_server, AppState};
pub use remote_model::HttpForecaster;
