// Summary statistics computed from a finished backtest state

use tracing::warn;
use uuid::Uuid;

use crate::backtesting::state::BacktestState;
use crate::backtesting::{BacktestResult, GridParams};

/// Turn the accumulated state into a [`BacktestResult`].
///
/// Reads the state without mutating it, so finalizing a frozen state twice
/// yields the same figures. `total_days` is the number of calendar days the
/// run covered; callers that stopped streaming early must pass the days that
/// were actually walked.
pub fn finalize_backtest(state: &BacktestState, params: &GridParams, total_days: u32) -> BacktestResult {
    let days = f64::from(total_days);

    // Open inventory is marked against the start price, not per lot.
    let unrealized_profit = state.base_balance() * (state.last_price() - state.start_price());
    let grid_profit = state.realized_grid_profit();
    let total_profit = grid_profit + unrealized_profit;

    let profit_rate = total_profit / params.investment * 100.0;
    let annualized_return = if total_days > 0 {
        profit_rate / days * 365.0
    } else {
        0.0
    };

    let total_trades = state.buy_count() + state.sell_count();
    let arbitrage_times = state.sell_count();
    let (daily_trades, daily_arbitrage_times) = if total_days > 0 {
        (total_trades as f64 / days, arbitrage_times as f64 / days)
    } else {
        (0.0, 0.0)
    };

    let max_asset = state.max_asset_seen();
    let min_asset = state.min_asset_seen();
    let max_drawdown = max_asset - min_asset;
    let max_drawdown_rate = if max_asset != 0.0 {
        max_drawdown / max_asset * 100.0
    } else {
        0.0
    };

    let trades_evicted = state.trades().evicted();
    if trades_evicted > 0 {
        warn!(
            "Trade log truncated: {} oldest trades dropped, {} kept",
            trades_evicted,
            state.trades().len()
        );
    }

    BacktestResult {
        run_id: Uuid::new_v4(),
        total_profit,
        grid_profit,
        unrealized_profit,
        profit_rate,
        annualized_return,
        fees_paid: state.fees_paid(),
        total_trades,
        daily_trades,
        arbitrage_times,
        daily_arbitrage_times,
        max_drawdown,
        max_drawdown_rate,
        min_asset,
        max_asset,
        start_price: state.start_price(),
        current_price: state.last_price(),
        total_days,
        trades_evicted,
        trades: state.trades().to_vec(),
        profit_curve: state.equity_curve().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::state::{init_backtest_state, process_batch};
    use crate::backtesting::Candle;
    use chrono::DateTime;

    fn candle(minutes: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let time = DateTime::from_timestamp(1_704_067_200 + minutes * 60, 0).unwrap();
        Candle::new(time, open, high, low, close, 1.0)
    }

    #[test]
    fn test_unrealized_profit_marks_against_start_price() {
        let params = GridParams::spot(1000.0, 2000.0, 10, 10000.0);
        let mut state = init_backtest_state(&params, &candle(0, 1500.0, 1500.0, 1500.0, 1500.0)).unwrap();
        process_batch(&mut state, &[candle(1, 1500.0, 1500.0, 1400.0, 1450.0)]);

        let result = finalize_backtest(&state, &params, 1);
        let expected = state.base_balance() * (1450.0 - 1500.0);
        assert!((result.unrealized_profit - expected).abs() < 1e-9);
        assert!((result.total_profit - (result.grid_profit + expected)).abs() < 1e-9);
    }

    #[test]
    fn test_rates_and_daily_counts() {
        let params = GridParams::spot(1000.0, 2000.0, 10, 10000.0);
        let mut state = init_backtest_state(&params, &candle(0, 1550.0, 1550.0, 1550.0, 1550.0)).unwrap();
        process_batch(&mut state, &[candle(1, 1550.0, 1610.0, 1540.0, 1550.0)]);

        let result = finalize_backtest(&state, &params, 2);
        assert_eq!(result.arbitrage_times, 1);
        assert_eq!(result.daily_arbitrage_times, 0.5);
        assert!((result.profit_rate - result.total_profit / 10000.0 * 100.0).abs() < 1e-12);
        assert!((result.annualized_return - result.profit_rate / 2.0 * 365.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_days_guards_division() {
        let params = GridParams::spot(1000.0, 2000.0, 10, 10000.0);
        let state = init_backtest_state(&params, &candle(0, 1500.0, 1500.0, 1500.0, 1500.0)).unwrap();

        let result = finalize_backtest(&state, &params, 0);
        assert_eq!(result.annualized_return, 0.0);
        assert_eq!(result.daily_arbitrage_times, 0.0);
        assert_eq!(result.daily_trades, 0.0);
    }

    #[test]
    fn test_drawdown_spans_asset_extremes() {
        let params = GridParams::spot(1000.0, 2000.0, 10, 10000.0);
        let mut state = init_backtest_state(&params, &candle(0, 1500.0, 1500.0, 1500.0, 1500.0)).unwrap();
        process_batch(&mut state, &[candle(1, 1500.0, 1500.0, 1100.0, 1100.0)]);

        let result = finalize_backtest(&state, &params, 1);
        assert_eq!(result.max_drawdown, result.max_asset - result.min_asset);
        assert!(result.min_asset < 10000.0);
        assert!((result.max_drawdown_rate - result.max_drawdown / result.max_asset * 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_finalize_is_repeatable() {
        let params = GridParams::spot(1000.0, 2000.0, 10, 10000.0);
        let mut state = init_backtest_state(&params, &candle(0, 1500.0, 1500.0, 1500.0, 1500.0)).unwrap();
        process_batch(&mut state, &[candle(1, 1500.0, 1720.0, 1380.0, 1600.0)]);

        let first = finalize_backtest(&state, &params, 1);
        let second = finalize_backtest(&state, &params, 1);
        assert_eq!(first.total_profit, second.total_profit);
        assert_eq!(first.trades, second.trades);
        assert_eq!(first.profit_curve, second.profit_curve);
    }
}
