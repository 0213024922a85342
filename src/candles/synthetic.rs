// Seeded random-walk candle generator used by the demo and tests

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backtesting::Candle;
use crate::candles::Interval;

#[derive(Debug, Clone)]
pub struct RandomWalk {
    pub start_price: f64,
    /// Largest relative move of a single step, e.g. 0.002 for 0.2%.
    pub step_volatility: f64,
    pub seed: u64,
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            start_price: 10_000.0,
            step_volatility: 0.002,
            seed: 42,
        }
    }
}

impl RandomWalk {
    pub fn new(start_price: f64, step_volatility: f64, seed: u64) -> Self {
        Self {
            start_price,
            step_volatility,
            seed,
        }
    }

    /// `count` consecutive candles starting at `start`, spaced by `interval`.
    /// Each candle opens at the previous close, and the same seed always
    /// produces the same series.
    pub fn generate(&self, start: DateTime<Utc>, interval: Interval, count: usize) -> Vec<Candle> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let step = Duration::minutes(i64::from(interval.minutes()));
        let volatility = self.step_volatility.abs().max(f64::EPSILON);

        let mut candles = Vec::with_capacity(count);
        let mut price = self.start_price;
        let mut time = start;

        for _ in 0..count {
            let open = price;
            let close = (open * (1.0 + rng.gen_range(-volatility..volatility))).max(f64::MIN_POSITIVE);
            let wick_up = open.max(close) * rng.gen_range(0.0..volatility);
            let wick_down = open.min(close) * rng.gen_range(0.0..volatility);
            let high = open.max(close) + wick_up;
            let low = (open.min(close) - wick_down).max(f64::MIN_POSITIVE);
            let volume = rng.gen_range(0.1..10.0);

            candles.push(Candle::new(time, open, high, low, close, volume));

            price = close;
            time += step;
        }

        candles
    }
}
