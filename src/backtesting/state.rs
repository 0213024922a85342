// Mutable backtest state and the per-batch candle processor

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::backtesting::ladder::GridLadder;
use crate::backtesting::ring_buffer::BoundedLog;
use crate::backtesting::{
    BacktestError, Candle, EquityPoint, GridParams, Trade, TradeSide, MAX_EQUITY_POINTS,
    MAX_TRADE_LOG, ROUND_TRIP_FEE_RATE,
};

/// Relative slack used when checking balances, so float rounding never
/// blocks the final rung of a fully funded ladder.
const BALANCE_TOLERANCE: f64 = 1e-9;

/// Simulation state of one run.
///
/// Created once by [`init_backtest_state`], advanced by [`process_batch`]
/// and read by `finalize_backtest`. A state belongs to exactly one run;
/// parallel runs each build their own.
#[derive(Debug, Clone)]
pub struct BacktestState {
    ladder: GridLadder,
    investment: f64,

    quote_balance: f64,
    base_balance: f64,
    position_flags: Vec<bool>,

    realized_grid_profit: f64,
    fees_paid: f64,

    trades: BoundedLog<Trade>,
    equity_curve: BoundedLog<EquityPoint>,

    start_time: DateTime<Utc>,
    last_time: DateTime<Utc>,
    start_price: f64,
    last_price: f64,
    max_asset_seen: f64,
    min_asset_seen: f64,

    buy_count: usize,
    sell_count: usize,
    skipped_buys: usize,
    skipped_sells: usize,
    candles_processed: usize,
}

/// Seed a new state from the parameters and the first candle of the range.
///
/// Every level strictly above the first open is bought immediately, as if
/// the grid had been running while price sat below those rungs.
pub fn init_backtest_state(params: &GridParams, first_candle: &Candle) -> Result<BacktestState, BacktestError> {
    let ladder = GridLadder::new(params)?;
    let start_price = first_candle.open;
    let t0 = first_candle.open_time;

    let mut state = BacktestState {
        position_flags: vec![false; ladder.len()],
        ladder,
        investment: params.investment,
        quote_balance: params.investment,
        base_balance: 0.0,
        realized_grid_profit: 0.0,
        fees_paid: 0.0,
        trades: BoundedLog::new(MAX_TRADE_LOG),
        equity_curve: BoundedLog::new(MAX_EQUITY_POINTS),
        start_time: t0,
        last_time: t0,
        start_price,
        last_price: start_price,
        max_asset_seen: params.investment,
        min_asset_seen: params.investment,
        buy_count: 0,
        sell_count: 0,
        skipped_buys: 0,
        skipped_sells: 0,
        candles_processed: 0,
    };

    let seeded: Vec<usize> = state.ladder.levels_above(start_price).collect();
    for index in seeded {
        if !state.try_buy(index, t0) {
            state.skipped_buys += 1;
        }
    }

    let asset = state.asset_value(start_price);
    state.equity_curve.push(EquityPoint {
        time: t0,
        profit: 0.0,
        asset,
    });

    debug!(
        "Initialized grid: {} levels, unit size {:.8}, {} seeded buys at start price {}",
        state.ladder.len(),
        state.ladder.unit_size(),
        state.buy_count,
        start_price
    );

    Ok(state)
}

/// Apply one ordered batch of candles to `state`.
pub fn process_batch(state: &mut BacktestState, candles: &[Candle]) {
    state.process_batch(candles);
}

impl BacktestState {
    pub fn process_batch(&mut self, candles: &[Candle]) {
        let trades_before = self.buy_count + self.sell_count;

        for (position, candle) in candles.iter().enumerate() {
            self.apply_candle(candle);
            self.sample_equity(candle.open_time, position == 0);
        }

        trace!(
            "Processed batch of {} candles, {} new trades",
            candles.len(),
            self.buy_count + self.sell_count - trades_before
        );
    }

    fn apply_candle(&mut self, candle: &Candle) {
        self.last_price = candle.close;
        self.last_time = candle.open_time;
        self.candles_processed += 1;

        for index in 0..self.ladder.len() {
            let level = self.ladder.levels()[index];

            if candle.low <= level && !self.position_flags[index] && !self.try_buy(index, candle.open_time) {
                self.skipped_buys += 1;
            }

            if candle.high >= level && self.position_flags[index] && !self.try_sell(index, candle.open_time) {
                self.skipped_sells += 1;
            }
        }
    }

    /// Buy one unit at `index`. Returns false when the quote balance cannot fund it.
    fn try_buy(&mut self, index: usize, time: DateTime<Utc>) -> bool {
        let price = self.ladder.levels()[index];
        let amount = self.ladder.unit_size();
        let cost = price * amount;

        if self.quote_balance + cost * BALANCE_TOLERANCE < cost {
            return false;
        }

        self.quote_balance -= cost;
        self.base_balance += amount;
        self.position_flags[index] = true;
        self.buy_count += 1;
        self.trades.push(Trade {
            time,
            side: TradeSide::Buy,
            price,
            amount,
            level: index,
            profit: None,
        });
        true
    }

    /// Sell the unit held at `index`, crediting one ladder gap of profit net of fees.
    fn try_sell(&mut self, index: usize, time: DateTime<Utc>) -> bool {
        let price = self.ladder.levels()[index];
        let amount = self.ladder.unit_size();

        if self.base_balance + amount * BALANCE_TOLERANCE < amount {
            return false;
        }

        let gross = self.ladder.spacing() * amount;
        let fee = gross * ROUND_TRIP_FEE_RATE;
        let profit = gross - fee;

        self.quote_balance += price * amount + profit;
        self.base_balance -= amount;
        self.position_flags[index] = false;
        self.realized_grid_profit += profit;
        self.fees_paid += fee;
        self.sell_count += 1;
        self.trades.push(Trade {
            time,
            side: TradeSide::Sell,
            price,
            amount,
            level: index,
            profit: Some(profit),
        });
        true
    }

    /// Record an equity sample if this is the first candle of a batch or an
    /// hour of candle time has passed since the previous sample. A sample at
    /// the same instant as the previous one replaces it.
    fn sample_equity(&mut self, time: DateTime<Utc>, first_in_batch: bool) {
        let due = first_in_batch
            || self
                .equity_curve
                .back()
                .map_or(true, |last| time - last.time >= Duration::hours(1));
        if !due {
            return;
        }

        let asset = self.asset_value(self.last_price);
        let point = EquityPoint {
            time,
            profit: self.realized_grid_profit,
            asset,
        };

        match self.equity_curve.back_mut() {
            Some(last) if last.time == time => *last = point,
            _ => self.equity_curve.push(point),
        }

        self.max_asset_seen = self.max_asset_seen.max(asset);
        self.min_asset_seen = self.min_asset_seen.min(asset);
    }

    /// Wallet value with the base balance marked at `price`.
    pub fn asset_value(&self, price: f64) -> f64 {
        self.quote_balance + self.base_balance * price
    }

    /// Wallet value with every open unit valued at the level it was bought at.
    /// Equals `investment + realized_grid_profit` for the whole run.
    pub fn cost_basis_value(&self) -> f64 {
        let held: f64 = self
            .position_flags
            .iter()
            .zip(self.ladder.levels())
            .filter(|&(&held, _)| held)
            .map(|(_, level)| level * self.ladder.unit_size())
            .sum();
        self.quote_balance + held
    }

    pub fn ladder(&self) -> &GridLadder {
        &self.ladder
    }

    pub fn investment(&self) -> f64 {
        self.investment
    }

    pub fn quote_balance(&self) -> f64 {
        self.quote_balance
    }

    pub fn base_balance(&self) -> f64 {
        self.base_balance
    }

    pub fn position_flags(&self) -> &[bool] {
        &self.position_flags
    }

    pub fn open_positions(&self) -> usize {
        self.position_flags.iter().filter(|&&held| held).count()
    }

    pub fn realized_grid_profit(&self) -> f64 {
        self.realized_grid_profit
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    pub fn trades(&self) -> &BoundedLog<Trade> {
        &self.trades
    }

    pub fn equity_curve(&self) -> &BoundedLog<EquityPoint> {
        &self.equity_curve
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_time(&self) -> DateTime<Utc> {
        self.last_time
    }

    pub fn start_price(&self) -> f64 {
        self.start_price
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn max_asset_seen(&self) -> f64 {
        self.max_asset_seen
    }

    pub fn min_asset_seen(&self) -> f64 {
        self.min_asset_seen
    }

    pub fn buy_count(&self) -> usize {
        self.buy_count
    }

    pub fn sell_count(&self) -> usize {
        self.sell_count
    }

    /// Triggered trades that were skipped for lack of funds, as (buys, sells).
    pub fn skipped_trades(&self) -> (usize, usize) {
        (self.skipped_buys, self.skipped_sells)
    }

    pub fn candles_processed(&self) -> usize {
        self.candles_processed
    }
}
