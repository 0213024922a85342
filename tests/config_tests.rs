// Integration tests for configuration loading and validation

mod common;

use common::create_test_config;
use grid_backtest::{Config, ConfigError, EngineError, GridParams, Interval, StrategyType};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config_creation() {
    let config = create_test_config("data/test.db");

    assert_eq!(config.backtest.symbol, "BTCUSDT");
    assert_eq!(config.backtest.interval, Interval::OneMinute);
    assert_eq!(config.backtest.strategy_type, StrategyType::Spot);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_serialization_deserialization() {
    let config = create_test_config("data/test.db");

    let toml_string = toml::to_string(&config).expect("Failed to serialize config");
    assert!(toml_string.contains("interval = \"1m\""));
    assert!(toml_string.contains("strategy_type = \"spot\""));

    let deserialized: Config = toml::from_str(&toml_string).expect("Failed to deserialize config");
    assert_eq!(deserialized, config);
}

#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    let mut config = create_test_config("candles.db");
    config.backtest.grid_count = 25;
    config.to_file(&path).expect("Failed to write config");

    let loaded = Config::from_file(&path).expect("Failed to load config");
    assert_eq!(loaded.backtest.grid_count, 25);
    assert_eq!(loaded.database.path, "candles.db");
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    assert!(!path.exists());

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config, Config::default());

    // Second call reads the file back
    let again = Config::load_or_create(&path).unwrap();
    assert_eq!(again, config);
}

#[test]
fn test_missing_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let err = Config::from_file(temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));

    let engine: EngineError = err.into();
    assert_eq!(engine.category(), "config");
    assert!(engine.user_message().contains("grid-backtest init"));
}

#[test]
fn test_invalid_grid_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[backtest]\nmin_price = 50000.0\nmax_price = 40000.0\n").unwrap();

    let err = Config::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("min_price")));
}

#[test]
fn test_unknown_interval_is_parse_error() {
    let err = Config::from_toml_str("[backtest]\ninterval = \"3m\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(ref msg) if msg.contains("3m")));
}

#[test]
fn test_grid_params_from_config() {
    let config = Config::from_toml_str(
        "[backtest]\nmin_price = 1.5\nmax_price = 2.5\ngrid_count = 20\ninvestment = 500.0\n",
    )
    .unwrap();

    assert_eq!(config.grid_params(), GridParams::spot(1.5, 2.5, 20, 500.0));
}
