//! Candle sources consumed by the backtesting core.
//!
//! The core only sees the [`CandleSource`] trait; the SQLite store, the
//! in-memory fixture source and the Kraken ingestion client live here.

pub mod kraken;
pub mod memory;
pub mod store;
pub mod synthetic;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backtesting::Candle;

pub use kraken::{ingest_range, IngestError, IngestSummary, KrakenApiError, KrakenOhlcClient, OhlcPage};
pub use memory::MemoryCandleSource;
pub use store::CandleStore;

/// Ordered OHLC records for a symbol and interval, queried by time window.
pub trait CandleSource {
    /// Candles with `from <= open_time < to`, ascending by `open_time`.
    /// Missing periods are simply absent.
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleSourceError>;
}

impl<S: CandleSource + ?Sized> CandleSource for &S {
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleSourceError> {
        (**self).fetch_candles(symbol, interval, from, to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    OneDay,
    OneWeek,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
        Interval::OneWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Interval::OneMinute => 1,
            Interval::FiveMinutes => 5,
            Interval::FifteenMinutes => 15,
            Interval::ThirtyMinutes => 30,
            Interval::OneHour => 60,
            Interval::FourHours => 240,
            Interval::OneDay => 1440,
            Interval::OneWeek => 10080,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|interval| interval.minutes() == minutes)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = CandleSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CandleSourceError::UnknownInterval(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = CandleSourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.as_str().to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CandleSourceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt candle row: {0}")]
    Corrupt(String),

    #[error("Candle source unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown interval '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w)")]
    UnknownInterval(String),
}
