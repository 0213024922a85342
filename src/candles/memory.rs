// In-memory candle source for fixtures and demos

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use crate::backtesting::Candle;
use crate::candles::{CandleSource, CandleSourceError, Interval};

#[derive(Debug, Default)]
pub struct MemoryCandleSource {
    series: HashMap<(String, Interval), Vec<Candle>>,
    queries: AtomicUsize,
}

impl MemoryCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add candles for a series, keeping the series sorted by open time.
    pub fn insert(&mut self, symbol: &str, interval: Interval, candles: impl IntoIterator<Item = Candle>) {
        let series = self.series.entry((symbol.to_string(), interval)).or_default();
        series.extend(candles);
        series.sort_by_key(|candle| candle.open_time);
    }

    pub fn with_series(mut self, symbol: &str, interval: Interval, candles: impl IntoIterator<Item = Candle>) -> Self {
        self.insert(symbol, interval, candles);
        self
    }

    /// Number of `fetch_candles` calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl CandleSource for MemoryCandleSource {
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleSourceError> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let Some(series) = self.series.get(&(symbol.to_string(), interval)) else {
            return Ok(Vec::new());
        };

        let start = series.partition_point(|candle| candle.open_time < from);
        let end = series.partition_point(|candle| candle.open_time < to);
        Ok(series[start..end.max(start)].to_vec())
    }
}
