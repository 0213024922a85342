// Backtest orchestration: bulk path, streaming path and parameter sweeps

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::backtesting::analytics::finalize_backtest;
use crate::backtesting::state::{init_backtest_state, process_batch, BacktestState};
use crate::backtesting::streamer::{stream_candles_by_day, BacktestRange, DayWindow, StreamSummary};
use crate::backtesting::{BacktestError, BacktestResult, Candle, GridParams};
use crate::candles::{CandleSource, Interval};

/// Run a spot grid over an in-memory, time-ordered candle slice.
///
/// An empty slice is not an error: it yields [`BacktestResult::empty`].
pub fn backtest_spot_grid(params: &GridParams, candles: &[Candle]) -> Result<BacktestResult, BacktestError> {
    params.validate()?;

    let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
        info!("No candles supplied, returning empty result");
        return Ok(BacktestResult::empty(params));
    };

    let mut state = init_backtest_state(params, first)?;
    process_batch(&mut state, candles);

    let total_days = calendar_days_spanned(first.open_time, last.open_time);
    Ok(finalize_backtest(&state, params, total_days))
}

/// Calendar days (UTC) touched between two instants, at least 1.
pub fn calendar_days_spanned(first: DateTime<Utc>, last: DateTime<Utc>) -> u32 {
    let days = (last.date_naive() - first.date_naive()).num_days() + 1;
    u32::try_from(days.max(1)).unwrap_or(u32::MAX)
}

/// Single-writer driver that feeds streamed day batches into one state.
///
/// The state is created lazily from the first candle that arrives, so a
/// range with no data never produces a state at all.
#[derive(Debug)]
pub struct StreamingBacktest {
    params: GridParams,
    state: Option<BacktestState>,
}

impl StreamingBacktest {
    pub fn new(params: GridParams) -> Result<Self, BacktestError> {
        params.validate()?;
        Ok(Self { params, state: None })
    }

    pub fn on_batch(&mut self, candles: &[Candle]) -> Result<(), BacktestError> {
        if self.state.is_none() {
            let Some(first) = candles.first() else {
                return Ok(());
            };
            self.state = Some(init_backtest_state(&self.params, first)?);
        }

        if let Some(state) = self.state.as_mut() {
            process_batch(state, candles);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    pub fn state(&self) -> Option<&BacktestState> {
        self.state.as_ref()
    }

    /// Finalize over `total_days`. `None` when no candle was ever seen.
    pub fn finish(self, total_days: u32) -> Option<BacktestResult> {
        let params = self.params;
        self.state.map(|state| finalize_backtest(&state, &params, total_days))
    }
}

/// Stream `range` from `source` day by day and backtest it.
pub fn run_streaming_backtest<S: CandleSource + ?Sized>(
    source: &S,
    symbol: &str,
    interval: Interval,
    range: &BacktestRange,
    params: &GridParams,
) -> Result<BacktestResult, BacktestError> {
    run_streaming_backtest_with(source, symbol, interval, range, params, |_, _| ControlFlow::Continue(()))
}

/// Like [`run_streaming_backtest`], calling `observer` after each day with
/// the window and the number of candles it held. Breaking from the observer
/// ends the run early; the result then covers only the days walked.
pub fn run_streaming_backtest_with<S, F>(
    source: &S,
    symbol: &str,
    interval: Interval,
    range: &BacktestRange,
    params: &GridParams,
    mut observer: F,
) -> Result<BacktestResult, BacktestError>
where
    S: CandleSource + ?Sized,
    F: FnMut(&DayWindow, usize) -> ControlFlow<()>,
{
    let mut backtest = StreamingBacktest::new(params.clone())?;
    let mut failure = None;

    info!(
        "Streaming backtest {} {}: {}-{} x{} grids, investment {}",
        symbol, interval, params.min_price, params.max_price, params.grid_count, params.investment
    );

    let summary: StreamSummary = stream_candles_by_day(source, symbol, interval, range, |batch, window| {
        if let Err(e) = backtest.on_batch(batch) {
            failure = Some(e);
            return ControlFlow::Break(());
        }
        observer(window, batch.len())
    })?;

    if let Some(e) = failure {
        return Err(e);
    }

    debug!(
        "Walked {}/{} days, {} candles",
        summary.days_walked, summary.total_days, summary.total_records
    );

    let result = backtest
        .finish(summary.days_walked)
        .ok_or_else(|| BacktestError::NoHistoricalData {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            start: summary.start,
            end: summary.end,
        })?;

    info!(
        "Backtest finished: total profit {:.2} ({:.2}%), {} round trips over {} days",
        result.total_profit, result.profit_rate, result.arbitrage_times, result.total_days
    );

    Ok(result)
}

/// One parameter set of a sweep and its outcome.
#[derive(Debug)]
pub struct SweepOutcome {
    pub params: GridParams,
    pub result: Result<BacktestResult, BacktestError>,
}

impl SweepOutcome {
    pub fn total_profit(&self) -> Option<f64> {
        self.result.as_ref().ok().map(|r| r.total_profit)
    }
}

/// Backtest every parameter set against the same candles in parallel.
/// Each run owns its state; outcomes come back in input order.
pub fn sweep_spot_grid(candles: &[Candle], param_sets: &[GridParams]) -> Vec<SweepOutcome> {
    debug!("Sweeping {} parameter sets over {} candles", param_sets.len(), candles.len());

    param_sets
        .par_iter()
        .map(|params| SweepOutcome {
            params: params.clone(),
            result: backtest_spot_grid(params, candles),
        })
        .collect()
}

/// Outcome with the highest total profit, ignoring failed runs.
pub fn best_outcome(outcomes: &[SweepOutcome]) -> Option<&SweepOutcome> {
    outcomes
        .iter()
        .filter_map(|outcome| outcome.total_profit().map(|profit| (outcome, profit)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(outcome, _)| outcome)
}
