// Arithmetic price ladder with an equal coin amount per rung

use crate::backtesting::{BacktestError, GridParams};

/// `grid_count + 1` equally spaced price levels and the base-asset quantity
/// traded at each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLadder {
    levels: Vec<f64>,
    spacing: f64,
    unit_size: f64,
}

impl GridLadder {
    /// Build the ladder for validated parameters.
    ///
    /// `unit_size = investment / sum(levels)`, so buying every rung costs
    /// exactly the funded investment.
    pub fn new(params: &GridParams) -> Result<Self, BacktestError> {
        params.validate()?;

        let count = params.grid_count as usize;
        let spacing = (params.max_price - params.min_price) / count as f64;

        let mut levels: Vec<f64> = (0..=count)
            .map(|i| params.min_price + spacing * i as f64)
            .collect();
        // Pin the top rung so accumulated rounding never pushes it past the bound.
        levels[count] = params.max_price;

        let level_sum: f64 = levels.iter().sum();
        let unit_size = params.investment / level_sum;

        Ok(Self {
            levels,
            spacing,
            unit_size,
        })
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<f64> {
        self.levels.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn unit_size(&self) -> f64 {
        self.unit_size
    }

    /// Quote value of one unit at every level.
    pub fn full_fill_cost(&self) -> f64 {
        self.levels.iter().map(|level| level * self.unit_size).sum()
    }

    /// Indices of the levels strictly above `price`, ascending.
    pub fn levels_above(&self, price: f64) -> impl Iterator<Item = usize> + '_ {
        self.levels
            .iter()
            .enumerate()
            .filter(move |&(_, &level)| level > price)
            .map(|(index, _)| index)
    }
}
