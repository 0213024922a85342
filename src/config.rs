// Configuration management for grid-backtest

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::backtesting::{GridParams, StrategyType};
use crate::candles::kraken::DEFAULT_REST_URL;
use crate::candles::Interval;

/// Template written by `grid-backtest init`.
pub const CONFIG_TEMPLATE: &str = include_str!("../config.toml.example");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Defaults for `backtest run` when flags are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: Interval,
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    #[serde(default = "default_max_price")]
    pub max_price: f64,
    #[serde(default = "default_grid_count")]
    pub grid_count: u32,
    #[serde(default = "default_investment")]
    pub investment: f64,
    #[serde(default = "default_strategy_type")]
    pub strategy_type: StrategyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_db_path() -> String { "data/candles.db".to_string() }
fn default_symbol() -> String { "BTCUSDT".to_string() }
fn default_interval() -> Interval { Interval::OneMinute }
fn default_min_price() -> f64 { 40000.0 }
fn default_max_price() -> f64 { 50000.0 }
fn default_grid_count() -> u32 { 10 }
fn default_investment() -> f64 { 10000.0 }
fn default_strategy_type() -> StrategyType { StrategyType::Spot }
fn default_rest_url() -> String { DEFAULT_REST_URL.to_string() }
fn default_requests_per_minute() -> u32 { 15 }
fn default_page_delay_ms() -> u64 { 1000 }
fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            grid_count: default_grid_count(),
            investment: default_investment(),
            strategy_type: default_strategy_type(),
            leverage: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            requests_per_minute: default_requests_per_minute(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            backtest: BacktestConfig::default(),
            ingest: IngestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// The `[backtest]` section as grid parameters.
    pub fn grid_params(&self) -> GridParams {
        GridParams {
            min_price: self.backtest.min_price,
            max_price: self.backtest.max_price,
            grid_count: self.backtest.grid_count,
            investment: self.backtest.investment,
            strategy_type: self.backtest.strategy_type,
            leverage: self.backtest.leverage,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Validation("database.path must not be empty".to_string()));
        }

        if self.backtest.symbol.trim().is_empty() {
            return Err(ConfigError::Validation("backtest.symbol must not be empty".to_string()));
        }

        self.grid_params()
            .validate()
            .map_err(|e| ConfigError::Validation(format!("[backtest] {}", e)))?;

        if self.ingest.requests_per_minute == 0 {
            return Err(ConfigError::Validation(
                "ingest.requests_per_minute must be greater than 0".to_string(),
            ));
        }

        if !self.ingest.rest_url.starts_with("http://") && !self.ingest.rest_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "ingest.rest_url must be an http(s) URL, got '{}'",
                self.ingest.rest_url
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
