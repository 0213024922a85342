//! SQLite-backed candle store
//!
//! Holds the candles written by the ingestion job and serves day-window
//! range queries to the streaming backtest.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::backtesting::Candle;
use crate::candles::{CandleSource, CandleSourceError, Interval};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Candle store sharing one connection between handles.
#[derive(Debug, Clone)]
pub struct CandleStore {
    conn: Arc<Mutex<Connection>>,
}

impl CandleStore {
    /// Open (or create) the store at `path` and bring its schema up to date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CandleSourceError> {
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        store.run_migrations()?;
        Ok(store)
    }

    /// In-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, CandleSourceError> {
        let store = Self::from_connection(Connection::open_in_memory()?)?;
        store.run_migrations()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Result<Self, CandleSourceError> {
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CandleSourceError> {
        self.conn
            .lock()
            .map_err(|_| CandleSourceError::Unavailable("connection lock poisoned".to_string()))
    }

    pub fn run_migrations(&self) -> Result<(), CandleSourceError> {
        let mut conn = self.conn()?;
        let report = embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| CandleSourceError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            debug!("Applied migration {}", migration);
        }
        Ok(())
    }

    /// Insert candles, replacing rows that share `(symbol, interval, open_time)`.
    pub fn upsert_candles(&self, symbol: &str, interval: Interval, candles: &[Candle]) -> Result<usize, CandleSourceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO candles (symbol, timeframe, open_time, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(symbol, timeframe, open_time) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume",
            )?;

            for candle in candles {
                stmt.execute(params![
                    symbol,
                    interval.as_str(),
                    candle.open_time.timestamp_millis(),
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(candles.len())
    }

    pub fn count(&self, symbol: &str, interval: Interval) -> Result<usize, CandleSourceError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM candles WHERE symbol = ?1 AND timeframe = ?2",
            params![symbol, interval.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Open time of the first and last stored candle of a series.
    pub fn time_bounds(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, CandleSourceError> {
        let conn = self.conn()?;
        let bounds: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT MIN(open_time), MAX(open_time) FROM candles WHERE symbol = ?1 AND timeframe = ?2",
                params![symbol, interval.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match bounds {
            Some((Some(first), Some(last))) => Ok(Some((millis_to_time(first)?, millis_to_time(last)?))),
            _ => Ok(None),
        }
    }

    /// Every `(symbol, interval)` series with its candle count.
    pub fn series(&self) -> Result<Vec<(String, String, usize)>, CandleSourceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, timeframe, COUNT(*) FROM candles GROUP BY symbol, timeframe ORDER BY symbol, timeframe",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)? as usize))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CandleSourceError::from)
    }

    pub fn health_check(&self) -> Result<bool, CandleSourceError> {
        let conn = self.conn()?;
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}

impl CandleSource for CandleStore {
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CandleSourceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT open_time, open, high, low, close, volume
             FROM candles
             WHERE symbol = ?1 AND timeframe = ?2 AND open_time >= ?3 AND open_time < ?4
             ORDER BY open_time ASC",
        )?;

        let rows = stmt.query_map(
            params![symbol, interval.as_str(), from.timestamp_millis(), to.timestamp_millis()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            },
        )?;

        let mut candles = Vec::new();
        for row in rows {
            let (open_time, open, high, low, close, volume) = row?;
            candles.push(Candle::new(millis_to_time(open_time)?, open, high, low, close, volume));
        }
        Ok(candles)
    }
}

fn millis_to_time(millis: i64) -> Result<DateTime<Utc>, CandleSourceError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| CandleSourceError::Corrupt(format!("open_time {} out of range", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candle(time: DateTime<Utc>, close: f64) -> Candle {
        Candle::new(time, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn test_store_creation() {
        let store = CandleStore::open_in_memory().unwrap();
        assert!(store.health_check().unwrap());
        assert_eq!(store.count("BTCUSDT", Interval::OneMinute).unwrap(), 0);
        assert!(store.time_bounds("BTCUSDT", Interval::OneMinute).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing_rows() {
        let store = CandleStore::open_in_memory().unwrap();
        let t0 = DateTime::from_timestamp(1_704_067_200, 0).unwrap();

        store
            .upsert_candles("BTCUSDT", Interval::OneMinute, &[candle(t0, 100.0), candle(t0 + Duration::minutes(1), 101.0)])
            .unwrap();
        store
            .upsert_candles("BTCUSDT", Interval::OneMinute, &[candle(t0, 200.0)])
            .unwrap();

        assert_eq!(store.count("BTCUSDT", Interval::OneMinute).unwrap(), 2);
        let candles = store
            .fetch_candles("BTCUSDT", Interval::OneMinute, t0, t0 + Duration::hours(1))
            .unwrap();
        assert_eq!(candles[0].close, 200.0);
        assert_eq!(candles[1].close, 101.0);
    }

    #[test]
    fn test_series_are_isolated() {
        let store = CandleStore::open_in_memory().unwrap();
        let t0 = DateTime::from_timestamp(1_704_067_200, 0).unwrap();

        store.upsert_candles("BTCUSDT", Interval::OneMinute, &[candle(t0, 1.0)]).unwrap();
        store.upsert_candles("BTCUSDT", Interval::OneHour, &[candle(t0, 2.0)]).unwrap();
        store.upsert_candles("ETHUSDT", Interval::OneMinute, &[candle(t0, 3.0)]).unwrap();

        let series = store.series().unwrap();
        assert_eq!(series.len(), 3);
        let hourly = store
            .fetch_candles("BTCUSDT", Interval::OneHour, t0, t0 + Duration::days(1))
            .unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].close, 2.0);
    }
}
