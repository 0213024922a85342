//! Day-windowed candle streaming.
//!
//! Splits a requested range into calendar days (UTC) and hands each day's
//! candles to a callback before fetching the next one, so at most one day
//! of candles is held in memory regardless of how long the range is.

use std::ops::ControlFlow;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::debug;

use crate::backtesting::{BacktestError, Candle};
use crate::candles::{CandleSource, Interval};

const DAY_MILLIS: i64 = 86_400_000;

/// Time range of a backtest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktestRange {
    /// Whole calendar years. The range spans from January 1 of the earliest
    /// year to January 1 after the latest one, including any gap years.
    Years(Vec<i32>),
    /// Explicit `[start, end)` range. `start` is floored to midnight UTC.
    Between { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl BacktestRange {
    pub fn years(years: impl IntoIterator<Item = i32>) -> Self {
        BacktestRange::Years(years.into_iter().collect())
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        BacktestRange::Between { start, end }
    }

    /// Resolve to a half-open `[start, end)` range starting at midnight UTC.
    pub fn normalize(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), BacktestError> {
        match self {
            BacktestRange::Years(years) => {
                let (Some(&first), Some(&last)) = (years.iter().min(), years.iter().max()) else {
                    return Err(BacktestError::InvalidParameter {
                        param: "range",
                        reason: "no years given".to_string(),
                    });
                };
                Ok((new_year(first)?, new_year(last + 1)?))
            }
            BacktestRange::Between { start, end } => {
                if end <= start {
                    return Err(BacktestError::InvalidParameter {
                        param: "range",
                        reason: format!("end {} is not after start {}", end, start),
                    });
                }
                Ok((midnight(start.date_naive())?, *end))
            }
        }
    }
}

fn new_year(year: i32) -> Result<DateTime<Utc>, BacktestError> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| BacktestError::InvalidParameter {
            param: "range",
            reason: format!("year {} is out of range", year),
        })
}

fn midnight(date: NaiveDate) -> Result<DateTime<Utc>, BacktestError> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| BacktestError::InvalidParameter {
            param: "range",
            reason: format!("cannot floor {} to midnight", date),
        })
}

/// Number of calendar-day windows covering `[start, end)`, rounding a
/// trailing partial day up.
pub fn count_days(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let millis = (end - start).num_milliseconds().max(0);
    let days = (millis + DAY_MILLIS - 1) / DAY_MILLIS;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Position of one batch within the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// Zero-based day index.
    pub index: u32,
    pub total_days: u32,
    pub date: NaiveDate,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DayWindow {
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total_days
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_records: usize,
    pub total_days: u32,
    /// Days handed to the callback. Less than `total_days` when the
    /// callback stopped the walk early.
    pub days_walked: u32,
}

impl StreamSummary {
    pub fn is_complete(&self) -> bool {
        self.days_walked == self.total_days
    }
}

/// Walk `range` one calendar day at a time, issuing one query per day and
/// calling `on_batch` with that day's candles before moving on.
///
/// Returning `ControlFlow::Break` from the callback stops the walk after
/// the current day. A source error aborts the walk and is returned as is.
pub fn stream_candles_by_day<S, F>(
    source: &S,
    symbol: &str,
    interval: Interval,
    range: &BacktestRange,
    mut on_batch: F,
) -> Result<StreamSummary, BacktestError>
where
    S: CandleSource + ?Sized,
    F: FnMut(&[Candle], &DayWindow) -> ControlFlow<()>,
{
    let (start, end) = range.normalize()?;
    let total_days = count_days(start, end);

    debug!(
        "Streaming {} {} over {} days from {}",
        symbol,
        interval,
        total_days,
        start.format("%Y-%m-%d")
    );

    let mut summary = StreamSummary {
        start,
        end,
        total_records: 0,
        total_days,
        days_walked: 0,
    };

    for index in 0..total_days {
        let from = start + Duration::days(i64::from(index));
        let to = (from + Duration::days(1)).min(end);
        let window = DayWindow {
            index,
            total_days,
            date: from.date_naive(),
            from,
            to,
        };

        let batch = source.fetch_candles(symbol, interval, from, to)?;
        summary.total_records += batch.len();
        summary.days_walked += 1;

        debug!("Day {}/{} ({}): {} candles", index + 1, total_days, window.date, batch.len());

        let flow = on_batch(&batch, &window);
        drop(batch);

        if flow.is_break() {
            debug!("Stream stopped by caller after {} of {} days", summary.days_walked, total_days);
            break;
        }
    }

    Ok(summary)
}
