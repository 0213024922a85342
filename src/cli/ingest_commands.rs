// Ingest and status command implementations
use std::path::Path;
use std::time::Duration;

use grid_backtest::{ingest_range, CandleStore, Config, EngineResult, Interval, KrakenOhlcClient, Spinner};
use tracing::{info, warn};

use crate::backtest_commands::parse_date;

pub async fn run_ingest(
    pair: &str,
    interval: Option<String>,
    start: &str,
    end: Option<String>,
    config: &Config,
) -> EngineResult<()> {
    let interval = match interval {
        Some(interval) => interval.parse::<Interval>()?,
        None => config.backtest.interval,
    };
    let start = parse_date(start)?;
    let end = match end {
        Some(end) => parse_date(&end)?,
        None => chrono::Utc::now(),
    };

    let store = CandleStore::open(&config.database.path)?;
    let mut client = KrakenOhlcClient::with_base_url(&config.ingest.rest_url)
        .with_rate_limit(config.ingest.requests_per_minute, Duration::from_secs(60));

    let spinner = Spinner::new(&format!("Fetching {} {} candles from Kraken...", pair, interval));
    let summary = match ingest_range(
        &mut client,
        &store,
        pair,
        interval,
        start,
        end,
        Duration::from_millis(config.ingest.page_delay_ms),
    )
    .await
    {
        Ok(summary) => summary,
        Err(e) => {
            spinner.finish_with_error(&e.to_string());
            return Err(e.into());
        }
    };
    spinner.finish(&format!("Stored {} candles from {} pages", summary.candles, summary.pages));

    if let Some((first, last)) = store.time_bounds(pair, interval)? {
        info!("💾 {} {} now covers {} to {}", pair, interval, first, last);
    }

    Ok(())
}

pub async fn show_status(config_path: &str, config: Option<&Config>) -> EngineResult<()> {
    info!("📊 System Status");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let Some(config) = config else {
        info!("⚙️  Config: NOT FOUND (run: grid-backtest init)");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        return Ok(());
    };
    info!("⚙️  Config: OK ({})", config_path);

    if !Path::new(&config.database.path).exists() {
        warn!("💾 Database: NOT FOUND at {} (run: grid-backtest init)", config.database.path);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        return Ok(());
    }

    let store = CandleStore::open(&config.database.path)?;
    if store.health_check()? {
        info!("💾 Database: OK ({})", config.database.path);
    } else {
        warn!("💾 Database: health check failed");
    }

    let series = store.series()?;
    if series.is_empty() {
        info!("📁 Candles: none stored yet (run: grid-backtest ingest)");
    }
    for (symbol, timeframe, count) in series {
        let bounds = timeframe
            .parse::<Interval>()
            .ok()
            .and_then(|interval| store.time_bounds(&symbol, interval).ok().flatten());
        match bounds {
            Some((first, last)) => info!(
                "📁 {} {}: {} candles, {} to {}",
                symbol,
                timeframe,
                count,
                first.format("%Y-%m-%d %H:%M"),
                last.format("%Y-%m-%d %H:%M")
            ),
            None => info!("📁 {} {}: {} candles", symbol, timeframe, count),
        }
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}
