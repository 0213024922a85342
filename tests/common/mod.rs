// Common test utilities and helpers
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use grid_backtest::{Candle, Config, GridParams, Interval, RandomWalk};
use std::path::PathBuf;
use tempfile::TempDir;

/// Midnight UTC on 2024-01-01, the start of every fixture series
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// The BTC scenario grid: 40000-50000, 10 gaps, 10000 invested
pub fn btc_params() -> GridParams {
    GridParams::spot(40000.0, 50000.0, 10, 10000.0)
}

/// Create a test configuration pointing at `db_path`
pub fn create_test_config(db_path: &str) -> Config {
    let mut config = Config::default();
    config.database.path = db_path.to_string();
    config.backtest.symbol = "BTCUSDT".to_string();
    config
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

/// One day of 1m candles starting at `start`: price climbs linearly from
/// `low` to `high` over the first 12 hours and falls back over the next 12.
pub fn rising_then_falling_day(start: DateTime<Utc>, low: f64, high: f64) -> Vec<Candle> {
    let half = 720.0;
    (0..1440)
        .map(|minute| {
            let m = minute as f64;
            let open = if m < half { low + (high - low) * m / half } else { high - (high - low) * (m - half) / half };
            let next = m + 1.0;
            let close = if next < half {
                low + (high - low) * next / half
            } else {
                high - (high - low) * (next - half) / half
            };
            let high_px = open.max(close) + 5.0;
            let low_px = open.min(close) - 5.0;
            Candle::new(start + Duration::minutes(minute), open, high_px, low_px, close, 1.0)
        })
        .collect()
}

/// `days` consecutive days of seeded random-walk 1m candles
pub fn random_walk_days(start: DateTime<Utc>, days: usize, start_price: f64, seed: u64) -> Vec<Candle> {
    RandomWalk::new(start_price, 0.002, seed).generate(start, Interval::OneMinute, days * 1440)
}

/// Candles every `minutes` minutes, flat at `price`
pub fn flat_candles(start: DateTime<Utc>, count: usize, minutes: i64, price: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| Candle::new(start + Duration::minutes(i as i64 * minutes), price, price, price, price, 1.0))
        .collect()
}

/// Assert two floats agree to within `tolerance`
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} to be within {} of {}",
        actual,
        tolerance,
        expected
    );
}
