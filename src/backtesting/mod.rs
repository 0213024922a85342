// Backtesting data structures and types

pub mod analytics;
pub mod engine;
pub mod ladder;
pub mod ring_buffer;
pub mod state;
pub mod streamer;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candles::CandleSourceError;

/// Capacity of the trade log. Older trades are evicted once it is full.
pub const MAX_TRADE_LOG: usize = 1000;

/// Capacity of the equity curve. Older samples are evicted once it is full.
pub const MAX_EQUITY_POINTS: usize = 1000;

/// Fee factor applied to every completed buy -> sell round trip (0.2%).
pub const ROUND_TRIP_FEE_RATE: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Spot,
    /// Leveraged contract grid. Accepted by the parser, rejected by validation.
    Contract,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyType::Spot => write!(f, "spot"),
            StrategyType::Contract => write!(f, "contract"),
        }
    }
}

impl FromStr for StrategyType {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(StrategyType::Spot),
            "contract" => Ok(StrategyType::Contract),
            other => Err(BacktestError::InvalidParameter {
                param: "strategy_type",
                reason: format!("unknown strategy type '{}'", other),
            }),
        }
    }
}

/// Input parameters of a grid backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub min_price: f64,
    pub max_price: f64,
    pub grid_count: u32,
    /// Quote-currency amount funding the whole ladder.
    pub investment: f64,
    pub strategy_type: StrategyType,
    /// Ignored while only spot grids are supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
}

impl GridParams {
    pub fn spot(min_price: f64, max_price: f64, grid_count: u32, investment: f64) -> Self {
        Self {
            min_price,
            max_price,
            grid_count,
            investment,
            strategy_type: StrategyType::Spot,
            leverage: None,
        }
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    /// Reject parameters that cannot describe a fundable spot ladder.
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.strategy_type != StrategyType::Spot {
            return Err(BacktestError::UnsupportedStrategy(self.strategy_type));
        }

        if !self.min_price.is_finite() || self.min_price <= 0.0 {
            return Err(BacktestError::InvalidParameter {
                param: "min_price",
                reason: "must be a positive number".to_string(),
            });
        }

        if !self.max_price.is_finite() || self.max_price <= 0.0 {
            return Err(BacktestError::InvalidParameter {
                param: "max_price",
                reason: "must be a positive number".to_string(),
            });
        }

        if self.min_price >= self.max_price {
            return Err(BacktestError::InvalidParameter {
                param: "min_price",
                reason: format!(
                    "must be below max_price ({} >= {})",
                    self.min_price, self.max_price
                ),
            });
        }

        if self.grid_count == 0 {
            return Err(BacktestError::InvalidParameter {
                param: "grid_count",
                reason: "must be greater than 0".to_string(),
            });
        }

        if !self.investment.is_finite() || self.investment <= 0.0 {
            return Err(BacktestError::InvalidParameter {
                param: "investment",
                reason: "must be a positive amount".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub time: DateTime<Utc>,
    pub side: TradeSide,
    pub price: f64,
    /// Base-asset quantity, always the ladder's unit size.
    pub amount: f64,
    /// Index of the ladder level that triggered the trade.
    pub level: usize,
    /// Realized grid profit, present on sells only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
}

/// One sample of the equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    /// Realized grid profit at `time`.
    pub profit: f64,
    /// Wallet value marked at the last close.
    pub asset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub run_id: Uuid,

    // Profit
    pub total_profit: f64,
    pub grid_profit: f64,
    pub unrealized_profit: f64,
    pub profit_rate: f64,
    pub annualized_return: f64,
    pub fees_paid: f64,

    // Trading statistics
    pub total_trades: usize,
    pub daily_trades: f64,
    pub arbitrage_times: usize,
    pub daily_arbitrage_times: f64,

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_rate: f64,
    pub min_asset: f64,
    pub max_asset: f64,

    pub start_price: f64,
    pub current_price: f64,
    pub total_days: u32,

    /// Trades dropped from the front of `trades` by the bounded log.
    pub trades_evicted: usize,
    pub trades: Vec<Trade>,
    pub profit_curve: Vec<EquityPoint>,
}

impl BacktestResult {
    /// Degenerate result of a run that never saw a candle.
    pub fn empty(params: &GridParams) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            total_profit: 0.0,
            grid_profit: 0.0,
            unrealized_profit: 0.0,
            profit_rate: 0.0,
            annualized_return: 0.0,
            fees_paid: 0.0,
            total_trades: 0,
            daily_trades: 0.0,
            arbitrage_times: 0,
            daily_arbitrage_times: 0.0,
            max_drawdown: 0.0,
            max_drawdown_rate: 0.0,
            min_asset: params.investment,
            max_asset: params.investment,
            start_price: 0.0,
            current_price: 0.0,
            total_days: 0,
            trades_evicted: 0,
            trades: Vec::new(),
            profit_curve: Vec::new(),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.trades_evicted > 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("Unsupported strategy type: {0} (only spot grids are supported)")]
    UnsupportedStrategy(StrategyType),

    #[error("No historical data available for {symbol} {interval} from {start} to {end}")]
    NoHistoricalData {
        symbol: String,
        interval: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Candle source error: {0}")]
    CandleSource(#[from] CandleSourceError),
}

impl BacktestError {
    /// True for errors raised before any state exists.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BacktestError::InvalidParameter { .. } | BacktestError::UnsupportedStrategy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_spot_params() {
        assert!(GridParams::spot(1000.0, 2000.0, 10, 5000.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let err = GridParams::spot(2000.0, 1000.0, 10, 5000.0).validate().unwrap_err();
        assert!(matches!(err, BacktestError::InvalidParameter { param: "min_price", .. }));

        let err = GridParams::spot(1000.0, 1000.0, 10, 5000.0).validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_non_positive_values() {
        assert!(GridParams::spot(0.0, 2000.0, 10, 5000.0).validate().is_err());
        assert!(GridParams::spot(1000.0, 2000.0, 0, 5000.0).validate().is_err());
        assert!(GridParams::spot(1000.0, 2000.0, 10, 0.0).validate().is_err());
        assert!(GridParams::spot(1000.0, f64::NAN, 10, 5000.0).validate().is_err());
    }

    #[test]
    fn test_contract_strategy_rejected() {
        let mut params = GridParams::spot(1000.0, 2000.0, 10, 5000.0).with_leverage(5);
        params.strategy_type = StrategyType::Contract;

        let err = params.validate().unwrap_err();
        assert!(matches!(err, BacktestError::UnsupportedStrategy(StrategyType::Contract)));
        assert!(err.to_string().contains("contract"));
    }

    #[test]
    fn test_strategy_type_parsing() {
        assert_eq!("SPOT".parse::<StrategyType>().unwrap(), StrategyType::Spot);
        assert_eq!("contract".parse::<StrategyType>().unwrap(), StrategyType::Contract);
        assert!("margin".parse::<StrategyType>().is_err());
    }

    #[test]
    fn test_trade_serializes_profit_only_when_present() {
        let buy = Trade {
            time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            side: TradeSide::Buy,
            price: 100.0,
            amount: 1.0,
            level: 0,
            profit: None,
        };
        let json = serde_json::to_string(&buy).unwrap();
        assert!(json.contains("\"side\":\"buy\""));
        assert!(!json.contains("profit"));
    }
}
