//! Progress bar utilities for long-running operations
//!
//! Visual feedback for day-by-day streaming backtests and ingestion runs,
//! built on the indicatif crate.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::backtesting::streamer::DayWindow;

/// Progress bar advancing once per streamed day
pub struct StreamProgress {
    pub progress: ProgressBar,
    records: usize,
}

impl StreamProgress {
    pub fn new(total_days: u32) -> Self {
        let progress = ProgressBar::new(u64::from(total_days));
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} days ({eta})\n{msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        Self { progress, records: 0 }
    }

    /// Hidden bar, for quiet runs and tests
    pub fn hidden() -> Self {
        Self {
            progress: ProgressBar::hidden(),
            records: 0,
        }
    }

    /// Record one finished day and the candles it held
    pub fn on_day(&mut self, window: &DayWindow, candles: usize) {
        self.records += candles;
        if self.progress.length() != Some(u64::from(window.total_days)) {
            self.progress.set_length(u64::from(window.total_days));
        }
        self.progress.set_position(u64::from(window.index) + 1);
        self.progress.set_message(format!("📊 {} | {} candles so far", window.date, self.records));
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(&self, round_trips: usize, profit_rate: f64) {
        self.progress.finish_with_message(format!(
            "✅ Backtest complete! {} round trips, {:.2}% return",
            round_trips, profit_rate
        ));
    }

    pub fn finish_with_error(&self, error: &str) {
        self.progress.abandon_with_message(format!("❌ Failed: {}", error));
    }
}

/// Spinner for quick operations
pub struct Spinner {
    pub spinner: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(message.to_string());

        Self { spinner }
    }

    pub fn update(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    /// Finish spinner with success
    pub fn finish(&self, message: &str) {
        self.spinner.finish_with_message(format!("✅ {}", message));
    }

    /// Finish spinner with error
    pub fn finish_with_error(&self, message: &str) {
        self.spinner.finish_with_message(format!("❌ {}", message));
    }
}
