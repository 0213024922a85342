// Grid Backtest Library
//
// Day-streamed spot grid backtesting over stored OHLC candles

pub mod backtesting;
pub mod candles;
pub mod config;
pub mod error;     // Unified error handling
pub mod progress;  // Progress bars for streamed runs

// Re-export error types
pub use error::{EngineError, EngineResult};

// Re-export configuration
pub use config::{BacktestConfig, Config, ConfigError, DatabaseConfig, IngestConfig, LoggingConfig};

// Re-export progress helpers
pub use progress::{Spinner, StreamProgress};

// Re-export candle sources
pub use candles::{
    ingest_range, CandleSource, CandleSourceError, CandleStore, IngestError, IngestSummary, Interval,
    KrakenApiError, KrakenOhlcClient, MemoryCandleSource, OhlcPage,
    synthetic::RandomWalk,
};

// Re-export backtesting components
pub use backtesting::{
    BacktestError, BacktestResult, Candle, EquityPoint, GridParams, StrategyType, Trade, TradeSide,
    analytics::finalize_backtest,
    engine::{
        backtest_spot_grid, best_outcome, run_streaming_backtest, run_streaming_backtest_with, sweep_spot_grid,
        StreamingBacktest, SweepOutcome,
    },
    ladder::GridLadder,
    state::{init_backtest_state, process_batch, BacktestState},
    streamer::{stream_candles_by_day, BacktestRange, DayWindow, StreamSummary},
};
