//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Environment variable naming the config file when `--config` is absent
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
pub const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    /// In-process seasonal trend model
    Local,
    /// External forecasting service over HTTP
    Http,
}

impl ModelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelMode::Local => "local",
            ModelMode::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Event log loaded at startup and overwritten by uploads
    #[serde(default = "default_data_path")]
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_driver_column")]
    pub driver_column: String,
    #[serde(default = "default_quantity_column")]
    pub quantity_column: String,
    /// Empty string disables location allocation
    #[serde(default = "default_location_column")]
    pub location_column: String,
    /// Empty string disables the event type breakdown
    #[serde(default = "default_event_type_column")]
    pub event_type_column: String,
    /// Driver ids to leave out of allocations, one per line
    #[serde(default)]
    pub exclusions_file: Option<String>,
    #[serde(default = "default_persist_uploads")]
    pub persist_uploads: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            delimiter: default_delimiter(),
            date_column: default_date_column(),
            driver_column: default_driver_column(),
            quantity_column: default_quantity_column(),
            location_column: default_location_column(),
            event_type_column: default_event_type_column(),
            exclusions_file: None,
            persist_uploads: default_persist_uploads(),
        }
    }
}

fn default_data_path() -> String {
    "data/events.csv".to_string()
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_date_column() -> String {
    "DATA".to_string()
}

fn default_driver_column() -> String {
    "MOTORISTA".to_string()
}

fn default_quantity_column() -> String {
    "QUANTIDADE".to_string()
}

fn default_location_column() -> String {
    "LOCALIDADE".to_string()
}

fn default_event_type_column() -> String {
    "EVENTO".to_string()
}

fn default_persist_uploads() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_mode")]
    pub mode: ModelMode,
    /// Future days predicted past the last historical date
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_true")]
    pub weekly_seasonality: bool,
    #[serde(default = "default_true")]
    pub yearly_seasonality: bool,
    #[serde(default = "default_model_url")]
    pub url: String,
    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mode: default_model_mode(),
            horizon_days: default_horizon_days(),
            weekly_seasonality: true,
            yearly_seasonality: true,
            url: default_model_url(),
            timeout_ms: default_model_timeout_ms(),
        }
    }
}

fn default_model_mode() -> ModelMode {
    ModelMode::Local
}

fn default_horizon_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

fn default_model_url() -> String {
    "http://localhost:8500/forecast".to_string()
}

fn default_model_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Event types broken down per driver; empty means every observed type
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default = "default_event_type_top_n")]
    pub event_type_top_n: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            event_types: Vec::new(),
            event_type_top_n: default_event_type_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

fn default_event_type_top_n() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Column names of the event log, compared after trim + upper-case
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConfig {
    pub date: String,
    pub driver: String,
    pub quantity: String,
    pub location: Option<String>,
    pub event_type: Option<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            date: default_date_column(),
            driver: default_driver_column(),
            quantity: default_quantity_column(),
            location: Some(default_location_column()),
            event_type: Some(default_event_type_column()),
        }
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    max_upload_bytes: usize,
    data_path: String,
    delimiter: u8,
    columns: ColumnConfig,
    exclusions_file: Option<String>,
    persist_uploads: bool,
    model_mode: ModelMode,
    horizon_days: u32,
    weekly_seasonality: bool,
    yearly_seasonality: bool,
    model_url: String,
    model_timeout_ms: u64,
    top_n: usize,
    event_types: Vec<String>,
    event_type_top_n: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerConfig::default();
        let data = DataConfig::default();
        let model = ModelConfig::default();
        let allocation = AllocationConfig::default();
        Self {
            bind_address: server.bind_address,
            port: server.port,
            max_upload_bytes: server.max_upload_bytes,
            data_path: data.path,
            delimiter: b';',
            columns: ColumnConfig::default(),
            exclusions_file: None,
            persist_uploads: data.persist_uploads,
            model_mode: model.mode,
            horizon_days: model.horizon_days,
            weekly_seasonality: model.weekly_seasonality,
            yearly_seasonality: model.yearly_seasonality,
            model_url: model.url,
            model_timeout_ms: model.timeout_ms,
            top_n: allocation.top_n,
            event_types: allocation.event_types,
            event_type_top_n: allocation.event_type_top_n,
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

fn normalize_column(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_uppercase())
}

impl Config {
    /// Config file path: the `--config` value, then `CONFIG_FILE`, then the default
    pub fn resolve_config_path(cli: Option<&str>) -> String {
        if let Some(path) = cli.filter(|p| !p.is_empty()) {
            return path.to_string();
        }

        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            if !path.is_empty() {
                return path;
            }
        }

        DEFAULT_CONFIG_PATH.to_string()
    }

    fn from_toml(toml_config: TomlConfig, source: &str) -> anyhow::Result<Self> {
        let TomlConfig { server, data, model, allocation, metrics } = toml_config;

        let delimiter = match data.delimiter.as_bytes() {
            [b] if b.is_ascii() => *b,
            _ => bail!("data.delimiter must be a single ASCII character, got {:?}", data.delimiter),
        };
        if allocation.top_n == 0 {
            bail!("allocation.top_n must be at least 1");
        }

        let columns = ColumnConfig {
            date: normalize_column(&data.date_column).context("data.date_column is empty")?,
            driver: normalize_column(&data.driver_column).context("data.driver_column is empty")?,
            quantity: normalize_column(&data.quantity_column)
                .context("data.quantity_column is empty")?,
            location: normalize_column(&data.location_column),
            event_type: normalize_column(&data.event_type_column),
        };

        Ok(Self {
            bind_address: server.bind_address,
            port: server.port,
            max_upload_bytes: server.max_upload_bytes,
            data_path: data.path,
            delimiter,
            columns,
            exclusions_file: data.exclusions_file.filter(|p| !p.trim().is_empty()),
            persist_uploads: data.persist_uploads,
            model_mode: model.mode,
            horizon_days: model.horizon_days,
            weekly_seasonality: model.weekly_seasonality,
            yearly_seasonality: model.yearly_seasonality,
            model_url: model.url,
            model_timeout_ms: model.timeout_ms,
            top_n: allocation.top_n,
            event_types: allocation.event_types,
            event_type_top_n: allocation.event_type_top_n,
            metrics_interval_secs: metrics.interval_secs.max(1),
            config_file: source.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::from_toml(toml_config, &path.display().to_string())
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load configuration from a path. A missing file falls back to defaults;
    /// a file that exists but does not parse is an error.
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            warn!(config_file = %path, "config_file_not_found_using_defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Load configuration using `--config`, `CONFIG_FILE` or the default path
    pub fn load(cli: Option<&str>) -> anyhow::Result<Self> {
        Self::load_from_path(&Self::resolve_config_path(cli))
    }

    /// Override the event log path (CLI tools)
    pub fn with_data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_persist_uploads(mut self, persist: bool) -> Self {
        self.persist_uploads = persist;
        self
    }

    // Getters for all config fields
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn data_path(&self) -> &str {
        &self.data_path
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn columns(&self) -> &ColumnConfig {
        &self.columns
    }

    pub fn exclusions_file(&self) -> Option<&str> {
        self.exclusions_file.as_deref()
    }

    pub fn persist_uploads(&self) -> bool {
        self.persist_uploads
    }

    pub fn model_mode(&self) -> ModelMode {
        self.model_mode
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn weekly_seasonality(&self) -> bool {
        self.weekly_seasonality
    }

    pub fn yearly_seasonality(&self) -> bool {
        self.yearly_seasonality
    }

    pub fn model_url(&self) -> &str {
        &self.model_url
    }

    pub fn model_timeout_ms(&self) -> u64 {
        self.model_timeout_ms
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    pub fn event_type_top_n(&self) -> usize {
        self.event_type_top_n
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 5000);
        assert_eq!(config.delimiter(), b';');
        assert_eq!(config.columns().date, "DATA");
        assert_eq!(config.columns().location.as_deref(), Some("LOCALIDADE"));
        assert_eq!(config.model_mode(), ModelMode::Local);
        assert_eq!(config.horizon_days(), 7);
        assert_eq!(config.top_n(), 10);
        assert!(config.exclusions_file().is_none());
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_column_names_normalized() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[data]
date_column = " date "
location_column = ""
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline").unwrap();
        assert_eq!(config.columns().date, "DATE");
        assert_eq!(config.columns().location, None);
        assert_eq!(config.columns().event_type.as_deref(), Some("EVENTO"));
    }

    #[test]
    fn test_invalid_delimiter_rejected() {
        let toml_config: TomlConfig = toml::from_str("[data]\ndelimiter = \";;\"\n").unwrap();
        assert!(Config::from_toml(toml_config, "inline").is_err());
    }

    #[test]
    fn test_zero_top_n_rejected() {
        let toml_config: TomlConfig = toml::from_str("[allocation]\ntop_n = 0\n").unwrap();
        assert!(Config::from_toml(toml_config, "inline").is_err());
    }

    // only test touching CONFIG_FILE, cases kept together so they run in order
    #[test]
    fn test_resolve_config_path_precedence() {
        env::remove_var(CONFIG_FILE_ENV);
        assert_eq!(Config::resolve_config_path(None), DEFAULT_CONFIG_PATH);
        assert_eq!(Config::resolve_config_path(Some("config/prod.toml")), "config/prod.toml");

        env::set_var(CONFIG_FILE_ENV, "/etc/forecast/staging.toml");
        assert_eq!(Config::resolve_config_path(None), "/etc/forecast/staging.toml");
        assert_eq!(Config::resolve_config_path(Some("")), "/etc/forecast/staging.toml");
        assert_eq!(Config::resolve_config_path(Some("config/prod.toml")), "config/prod.toml");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[server]\nport = 6001\n").unwrap();
        env::set_var(CONFIG_FILE_ENV, file.path());
        let config = Config::load(None).unwrap();
        assert_eq!(config.port(), 6001);
        assert_eq!(config.config_file(), file.path().display().to_string());

        env::remove_var(CONFIG_FILE_ENV);
    }
}
