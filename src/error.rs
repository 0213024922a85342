//! Unified error handling for grid-backtest
//!
//! Module errors (`BacktestError`, `CandleSourceError`, `KrakenApiError`,
//! `ConfigError`) convert into [`EngineError`], which carries a category
//! for logging and an actionable message for the command line.

use std::fmt;
use std::io;

use crate::backtesting::BacktestError;
use crate::candles::{CandleSourceError, IngestError, KrakenApiError};
use crate::config::ConfigError;

/// Main error type for the command-line surface
#[derive(Debug)]
pub enum EngineError {
    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // Backtest errors
    InvalidParameter(String, String), // (parameter_name, reason)
    UnsupportedStrategy(String),
    NoHistoricalData(String, String, String), // (symbol, interval, range)

    // Database errors
    DatabaseConnection(String),
    DatabaseQuery(String),
    DatabaseMigration(String),
    DataCorrupt(String),

    // API errors
    ApiConnection(String),
    ApiRateLimit(String),
    ApiResponse(String),
    ApiTimeout(String),

    // IO errors
    FileNotFound(String),
    FileRead(String),
    FileWrite(String),

    // General errors
    Internal(String),
}

impl EngineError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            EngineError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: grid-backtest init\n\
                    2. Edit config.toml with your grid defaults\n\
                    3. Try again",
                    path
                )
            }
            EngineError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - min_price below max_price\n\
                    - Positive grid_count and investment\n\
                    - strategy_type = \"spot\"",
                    msg
                )
            }
            EngineError::InvalidParameter(param, reason) => {
                format!(
                    "Invalid parameter '{}': {}\n\n\
                    💡 Grid parameters need 0 < min_price < max_price,\n\
                    grid_count > 0 and investment > 0",
                    param, reason
                )
            }
            EngineError::UnsupportedStrategy(kind) => {
                format!(
                    "Unsupported strategy type: {}\n\n\
                    💡 Only spot grids can be backtested. Use --strategy spot",
                    kind
                )
            }
            EngineError::NoHistoricalData(symbol, interval, range) => {
                format!(
                    "No historical data available for {} {} in {}\n\n\
                    💡 Try:\n\
                    1. Run: grid-backtest status to see stored ranges\n\
                    2. Run: grid-backtest ingest --pair {} --interval {} --start ... --end ...\n\
                    3. Pick a range that overlaps the stored data",
                    symbol, interval, range, symbol, interval
                )
            }
            EngineError::DatabaseConnection(msg) => {
                format!(
                    "Database connection failed: {}\n\n\
                    💡 Try:\n\
                    1. Run: grid-backtest init\n\
                    2. Check data/ directory permissions\n\
                    3. Ensure disk space available",
                    msg
                )
            }
            EngineError::ApiRateLimit(msg) => {
                format!(
                    "API rate limit exceeded: {}\n\n\
                    💡 Please wait before retrying, or lower\n\
                    ingest.requests_per_minute in config.toml",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ApiTimeout(_)
                | EngineError::ApiConnection(_)
                | EngineError::ApiRateLimit(_)
                | EngineError::DatabaseConnection(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::ConfigNotFound(_)
            | EngineError::ConfigParse(_)
            | EngineError::ConfigValidation(_) => "config",

            EngineError::InvalidParameter(_, _)
            | EngineError::UnsupportedStrategy(_) => "validation",

            EngineError::NoHistoricalData(_, _, _) => "data",

            EngineError::DatabaseConnection(_)
            | EngineError::DatabaseQuery(_)
            | EngineError::DatabaseMigration(_)
            | EngineError::DataCorrupt(_) => "database",

            EngineError::ApiConnection(_)
            | EngineError::ApiRateLimit(_)
            | EngineError::ApiResponse(_)
            | EngineError::ApiTimeout(_) => "api",

            EngineError::FileNotFound(_)
            | EngineError::FileRead(_)
            | EngineError::FileWrite(_) => "io",

            EngineError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            EngineError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            EngineError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            EngineError::InvalidParameter(param, reason) => {
                write!(f, "Invalid parameter '{}': {}", param, reason)
            }
            EngineError::UnsupportedStrategy(kind) => {
                write!(f, "Unsupported strategy type: {}", kind)
            }
            EngineError::NoHistoricalData(symbol, interval, range) => {
                write!(f, "No historical data available for {} {} in {}", symbol, interval, range)
            }

            EngineError::DatabaseConnection(msg) => {
                write!(f, "Database connection error: {}", msg)
            }
            EngineError::DatabaseQuery(msg) => {
                write!(f, "Database query error: {}", msg)
            }
            EngineError::DatabaseMigration(msg) => {
                write!(f, "Database migration error: {}", msg)
            }
            EngineError::DataCorrupt(msg) => {
                write!(f, "Corrupt stored data: {}", msg)
            }

            EngineError::ApiConnection(msg) => {
                write!(f, "API connection error: {}", msg)
            }
            EngineError::ApiRateLimit(msg) => {
                write!(f, "API rate limit exceeded: {}", msg)
            }
            EngineError::ApiResponse(msg) => {
                write!(f, "API response error: {}", msg)
            }
            EngineError::ApiTimeout(msg) => {
                write!(f, "API timeout: {}", msg)
            }

            EngineError::FileNotFound(path) => {
                write!(f, "File not found: {}", path)
            }
            EngineError::FileRead(msg) => {
                write!(f, "File read error: {}", msg)
            }
            EngineError::FileWrite(msg) => {
                write!(f, "File write error: {}", msg)
            }

            EngineError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for EngineError {}

// Conversions from module errors

impl From<BacktestError> for EngineError {
    fn from(err: BacktestError) -> Self {
        match err {
            BacktestError::InvalidParameter { param, reason } => {
                EngineError::InvalidParameter(param.to_string(), reason)
            }
            BacktestError::UnsupportedStrategy(kind) => EngineError::UnsupportedStrategy(kind.to_string()),
            BacktestError::NoHistoricalData { symbol, interval, start, end } => EngineError::NoHistoricalData(
                symbol,
                interval,
                format!("{} .. {}", start.format("%Y-%m-%d %H:%M"), end.format("%Y-%m-%d %H:%M")),
            ),
            BacktestError::CandleSource(err) => err.into(),
        }
    }
}

impl From<CandleSourceError> for EngineError {
    fn from(err: CandleSourceError) -> Self {
        match err {
            CandleSourceError::Database(err) => err.into(),
            CandleSourceError::Migration(msg) => EngineError::DatabaseMigration(msg),
            CandleSourceError::Corrupt(msg) => EngineError::DataCorrupt(msg),
            CandleSourceError::Unavailable(msg) => EngineError::DatabaseConnection(msg),
            CandleSourceError::UnknownInterval(interval) => {
                EngineError::InvalidParameter("interval".to_string(), format!("unknown interval '{}'", interval))
            }
        }
    }
}

impl From<KrakenApiError> for EngineError {
    fn from(err: KrakenApiError) -> Self {
        match err {
            KrakenApiError::NetworkError(msg) => EngineError::ApiConnection(msg),
            KrakenApiError::HttpError(429) => EngineError::ApiRateLimit("HTTP 429".to_string()),
            KrakenApiError::HttpError(status) => EngineError::ApiResponse(format!("HTTP {}", status)),
            KrakenApiError::ParseError(msg) => EngineError::ApiResponse(msg),
            KrakenApiError::ApiError(msg) if msg.contains("Rate limit") => EngineError::ApiRateLimit(msg),
            KrakenApiError::ApiError(msg) => EngineError::ApiResponse(msg),
        }
    }
}

impl From<IngestError> for EngineError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Api(err) => err.into(),
            IngestError::Store(err) => err.into(),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => EngineError::ConfigNotFound(path),
            ConfigError::FileRead(msg) => EngineError::FileRead(msg),
            ConfigError::FileWrite(msg) => EngineError::FileWrite(msg),
            ConfigError::Parse(msg) => EngineError::ConfigParse(msg),
            ConfigError::Serialize(msg) => EngineError::Internal(format!("Config serialization: {}", msg)),
            ConfigError::Validation(msg) => EngineError::ConfigValidation(msg),
        }
    }
}

// Conversions from library errors

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => EngineError::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => EngineError::FileRead(err.to_string()),
            _ => EngineError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg) => {
                let detail = msg.unwrap_or_else(|| code.to_string());
                match code.code {
                    rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked => EngineError::DatabaseConnection(detail),
                    _ => EngineError::DatabaseQuery(detail),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                EngineError::DatabaseQuery("Query returned no rows".to_string())
            }
            _ => EngineError::DatabaseQuery(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::ApiTimeout(err.to_string())
        } else if err.is_status() {
            EngineError::ApiResponse(err.to_string())
        } else {
            EngineError::ApiConnection(err.to_string())
        }
    }
}

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError::Internal(msg)
    }
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::StrategyType;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_error_display() {
        let err = EngineError::ConfigNotFound("config.toml".to_string());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_error_category() {
        let err = EngineError::ConfigValidation("test".to_string());
        assert_eq!(err.category(), "config");

        let err = EngineError::DatabaseQuery("test".to_string());
        assert_eq!(err.category(), "database");

        let err = EngineError::ApiTimeout("test".to_string());
        assert_eq!(err.category(), "api");
    }

    #[test]
    fn test_retryable() {
        assert!(EngineError::ApiRateLimit("test".to_string()).is_retryable());
        assert!(!EngineError::ConfigNotFound("test".to_string()).is_retryable());
        assert!(!EngineError::UnsupportedStrategy("contract".to_string()).is_retryable());
    }

    #[test]
    fn test_backtest_error_conversion() {
        let err: EngineError = BacktestError::UnsupportedStrategy(StrategyType::Contract).into();
        assert!(matches!(err, EngineError::UnsupportedStrategy(ref kind) if kind == "contract"));
        assert_eq!(err.category(), "validation");

        let err: EngineError = BacktestError::NoHistoricalData {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
        .into();
        let msg = err.user_message();
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("grid-backtest ingest"));
        assert!(msg.contains("💡"));
    }

    #[test]
    fn test_kraken_rate_limit_conversion() {
        let err: EngineError = KrakenApiError::ApiError("EAPI:Rate limit exceeded".to_string()).into();
        assert!(matches!(err, EngineError::ApiRateLimit(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let engine_err: EngineError = io_err.into();
        assert!(matches!(engine_err, EngineError::FileNotFound(_)));
    }
}
