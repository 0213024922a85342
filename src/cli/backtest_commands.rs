// Backtest command implementations
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use grid_backtest::backtesting::streamer::count_days;
use grid_backtest::{
    backtest_spot_grid, best_outcome, run_streaming_backtest_with, sweep_spot_grid, BacktestRange, BacktestResult,
    CandleSource, CandleStore, Config, EngineError, EngineResult, GridParams, Interval, RandomWalk, Spinner,
    StrategyType, StreamProgress,
};
use tracing::{info, warn};

/// Flags shared by `backtest run` and `backtest sweep`. Unset values fall
/// back to the `[backtest]` section of the config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub years: Vec<i32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub grid_count: Option<u32>,
    pub investment: Option<f64>,
    pub strategy: Option<String>,
}

impl RunOptions {
    fn symbol(&self, config: &Config) -> String {
        self.symbol.clone().unwrap_or_else(|| config.backtest.symbol.clone())
    }

    fn interval(&self, config: &Config) -> EngineResult<Interval> {
        match &self.interval {
            Some(interval) => Ok(interval.parse::<Interval>()?),
            None => Ok(config.backtest.interval),
        }
    }

    fn grid_params(&self, config: &Config) -> EngineResult<GridParams> {
        let mut params = config.grid_params();
        if let Some(min_price) = self.min_price {
            params.min_price = min_price;
        }
        if let Some(max_price) = self.max_price {
            params.max_price = max_price;
        }
        if let Some(grid_count) = self.grid_count {
            params.grid_count = grid_count;
        }
        if let Some(investment) = self.investment {
            params.investment = investment;
        }
        if let Some(strategy) = &self.strategy {
            params.strategy_type = strategy.parse::<StrategyType>()?;
        }
        params.validate()?;
        Ok(params)
    }

    fn range(&self) -> EngineResult<BacktestRange> {
        if !self.years.is_empty() {
            return Ok(BacktestRange::years(self.years.iter().copied()));
        }

        let start = match &self.start {
            Some(start) => parse_date(start)?,
            None => {
                return Err(EngineError::InvalidParameter(
                    "start".to_string(),
                    "required unless --years is given".to_string(),
                ))
            }
        };
        let end = match &self.end {
            Some(end) => parse_date(end)?,
            None => start + Duration::days(1),
        };
        Ok(BacktestRange::between(start, end))
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date(value: &str) -> EngineResult<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            EngineError::InvalidParameter(
                "date".to_string(),
                format!("'{}' is neither YYYY-MM-DD nor RFC 3339", value),
            )
        })
}

pub async fn run_backtest(opts: RunOptions, output: Option<String>, config: &Config) -> EngineResult<()> {
    let symbol = opts.symbol(config);
    let interval = opts.interval(config)?;
    let params = opts.grid_params(config)?;
    let range = opts.range()?;
    let (start, end) = range.normalize()?;

    info!("🚀 Backtesting {} {} from {} to {}", symbol, interval, start.format("%Y-%m-%d"), end.format("%Y-%m-%d"));
    info!(
        "   Grid: {:.2} - {:.2}, {} gaps, investment {:.2}",
        params.min_price, params.max_price, params.grid_count, params.investment
    );

    let store = CandleStore::open(&config.database.path)?;

    // Ctrl-C stops the walk after the current day
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let mut progress = StreamProgress::new(count_days(start, end));
    let worker_flag = Arc::clone(&interrupted);
    let outcome = tokio::task::spawn_blocking(move || {
        let result = run_streaming_backtest_with(&store, &symbol, interval, &range, &params, |window, candles| {
            progress.on_day(window, candles);
            if worker_flag.load(Ordering::SeqCst) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        match &result {
            Ok(result) => progress.finish(result.arbitrage_times, result.profit_rate),
            Err(e) => progress.finish_with_error(&e.to_string()),
        }
        result
    })
    .await
    .map_err(|e| EngineError::Internal(format!("backtest worker failed: {}", e)))?;

    let result = outcome?;
    if interrupted.load(Ordering::SeqCst) {
        warn!("⚠️  Interrupted: results cover the first {} days only", result.total_days);
    }

    print_report(&result);

    if let Some(path) = output {
        write_report(&result, &path)?;
        info!("📝 Report written to {}", path);
    }

    Ok(())
}

pub async fn run_demo(seed: u64, output: Option<String>, config: &Config) -> EngineResult<()> {
    let params = config.grid_params();
    params.validate()?;

    let spinner = Spinner::new("Generating one synthetic day of 1m candles...");
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().ok_or_else(|| {
        EngineError::Internal("invalid demo start date".to_string())
    })?;
    let walk = RandomWalk::new((params.min_price + params.max_price) / 2.0, 0.002, seed);
    let candles = walk.generate(start, Interval::OneMinute, 1440);
    spinner.finish(&format!("Generated {} candles (seed {})", candles.len(), seed));

    let result = backtest_spot_grid(&params, &candles)?;
    print_report(&result);

    if let Some(path) = output {
        write_report(&result, &path)?;
        info!("📝 Report written to {}", path);
    }

    Ok(())
}

pub async fn run_sweep(opts: RunOptions, grid_counts: Vec<u32>, config: &Config) -> EngineResult<()> {
    let symbol = opts.symbol(config);
    let interval = opts.interval(config)?;
    let base = opts.grid_params(config)?;
    let (start, end) = opts.range()?.normalize()?;

    let counts = if grid_counts.is_empty() { vec![base.grid_count] } else { grid_counts };
    let param_sets: Vec<GridParams> = counts
        .iter()
        .map(|&grid_count| GridParams { grid_count, ..base.clone() })
        .collect();

    let spinner = Spinner::new(&format!("Loading {} {} candles...", symbol, interval));
    let store = CandleStore::open(&config.database.path)?;
    let candles = store.fetch_candles(&symbol, interval, start, end)?;
    spinner.finish(&format!("Loaded {} candles", candles.len()));

    if candles.is_empty() {
        return Err(EngineError::NoHistoricalData(
            symbol,
            interval.to_string(),
            format!("{} .. {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
        ));
    }

    info!("🔍 Sweeping {} grid counts in parallel", param_sets.len());
    let outcomes = sweep_spot_grid(&candles, &param_sets);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => info!(
                "  {:>4} gaps | profit {:>12.2} ({:>7.2}%) | {:>6} round trips",
                outcome.params.grid_count, result.total_profit, result.profit_rate, result.arbitrage_times
            ),
            Err(e) => warn!("  {:>4} gaps | ❌ {}", outcome.params.grid_count, e),
        }
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if let Some(best) = best_outcome(&outcomes) {
        info!("🏆 Best: {} gaps", best.params.grid_count);
    }

    Ok(())
}

fn print_report(result: &BacktestResult) {
    info!("📊 Backtest Report ({})", result.run_id);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("💰 Total profit:      {:.2} ({:.2}%)", result.total_profit, result.profit_rate);
    info!("   Grid profit:       {:.2}", result.grid_profit);
    info!("   Unrealized:        {:.2}", result.unrealized_profit);
    info!("   Fees paid:         {:.2}", result.fees_paid);
    info!("   Annualized:        {:.2}%", result.annualized_return);
    info!("🔄 Trades:            {} ({:.2}/day)", result.total_trades, result.daily_trades);
    info!("   Round trips:       {} ({:.2}/day)", result.arbitrage_times, result.daily_arbitrage_times);
    info!("📉 Max drawdown:      {:.2} ({:.2}%)", result.max_drawdown, result.max_drawdown_rate);
    info!("   Asset range:       {:.2} - {:.2}", result.min_asset, result.max_asset);
    info!("📈 Price:             {:.2} -> {:.2}", result.start_price, result.current_price);
    info!("📅 Days:              {}", result.total_days);
    if result.is_truncated() {
        info!("   Trade log keeps the last {} trades ({} older dropped)", result.trades.len(), result.trades_evicted);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

fn write_report(result: &BacktestResult, path: &str) -> EngineResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(|e| EngineError::FileWrite(format!("{}: {}", path, e)))?;
    Ok(())
}
