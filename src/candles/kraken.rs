// Kraken OHLC client and the paginated fetch-and-upsert ingestion loop

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backtesting::Candle;
use crate::candles::{CandleSourceError, CandleStore, Interval};

pub const DEFAULT_REST_URL: &str = "https://api.kraken.com";

#[derive(Debug)]
pub struct KrakenOhlcClient {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

/// One page of the OHLC endpoint.
#[derive(Debug, Clone)]
pub struct OhlcPage {
    pub candles: Vec<Candle>,
    /// Cursor to pass as `since` for the next page (unix seconds).
    pub last: i64,
}

impl KrakenOhlcClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_REST_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(60, Duration::from_secs(60)), // 60 calls per minute
        }
    }

    pub fn with_rate_limit(mut self, max_calls: u32, window: Duration) -> Self {
        self.rate_limiter = RateLimiter::new(max_calls, window);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one page of candles starting after `since` (unix seconds).
    pub async fn fetch_page(
        &mut self,
        pair: &str,
        interval: Interval,
        since: Option<i64>,
    ) -> Result<OhlcPage, KrakenApiError> {
        self.rate_limiter.wait_if_needed().await;

        let mut params = vec![
            ("pair", pair.to_string()),
            ("interval", interval.minutes().to_string()),
        ];
        if let Some(since) = since {
            params.push(("since", since.to_string()));
        }

        let url = format!("{}/0/public/OHLC", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| KrakenApiError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KrakenApiError::HttpError(response.status().as_u16()));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| KrakenApiError::ParseError(e.to_string()))?;

        parse_ohlc_response(&json)
    }
}

impl Default for KrakenOhlcClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_price(value: &Value, field: &str) -> Result<f64, KrakenApiError> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .ok_or_else(|| KrakenApiError::ParseError(format!("Invalid {}", field)))
}

/// Parse `{"error": [...], "result": {"<PAIR>": [[time, o, h, l, c, vwap, volume, count], ...], "last": n}}`.
pub fn parse_ohlc_response(json: &Value) -> Result<OhlcPage, KrakenApiError> {
    if let Some(errors) = json["error"].as_array() {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect();
            return Err(KrakenApiError::ApiError(messages.join(", ")));
        }
    }

    let result = json["result"]
        .as_object()
        .ok_or_else(|| KrakenApiError::ParseError("Missing result field".to_string()))?;

    let last = result
        .get("last")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| KrakenApiError::ParseError("Missing last cursor".to_string()))?;

    let rows = result
        .iter()
        .find(|(key, _)| key.as_str() != "last")
        .and_then(|(_, v)| v.as_array())
        .ok_or_else(|| KrakenApiError::ParseError("Invalid OHLC data format".to_string()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row
            .as_array()
            .ok_or_else(|| KrakenApiError::ParseError("Invalid candle format".to_string()))?;

        if fields.len() < 7 {
            continue; // Skip malformed candles
        }

        let timestamp = fields[0]
            .as_i64()
            .ok_or_else(|| KrakenApiError::ParseError("Invalid timestamp".to_string()))?;
        let open_time = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| KrakenApiError::ParseError("Invalid timestamp conversion".to_string()))?;

        candles.push(Candle {
            open_time,
            open: parse_price(&fields[1], "open price")?,
            high: parse_price(&fields[2], "high price")?,
            low: parse_price(&fields[3], "low price")?,
            close: parse_price(&fields[4], "close price")?,
            volume: parse_price(&fields[6], "volume")?,
        });
    }

    candles.sort_by_key(|candle| candle.open_time);

    Ok(OhlcPage { candles, last })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub pages: usize,
    pub candles: usize,
}

/// Walk the OHLC endpoint from `start` to `end`, upserting every page into
/// the store. Stops when a page is empty, the cursor stops advancing or the
/// cursor passes `end`.
pub async fn ingest_range(
    client: &mut KrakenOhlcClient,
    store: &CandleStore,
    pair: &str,
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    page_delay: Duration,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();
    let mut since = start.timestamp();
    let end_secs = end.timestamp();

    info!(
        "Ingesting {} {} from {} to {}",
        pair,
        interval,
        start.format("%Y-%m-%d %H:%M"),
        end.format("%Y-%m-%d %H:%M")
    );

    while since < end_secs {
        let page = client.fetch_page(pair, interval, Some(since)).await?;
        summary.pages += 1;

        let in_range: Vec<Candle> = page
            .candles
            .into_iter()
            .filter(|candle| candle.open_time >= start && candle.open_time < end)
            .collect();

        if !in_range.is_empty() {
            summary.candles += store.upsert_candles(pair, interval, &in_range)?;
        }

        debug!(
            "Page {}: {} candles stored, cursor {} -> {}",
            summary.pages,
            in_range.len(),
            since,
            page.last
        );

        if in_range.is_empty() || page.last <= since {
            break;
        }
        since = page.last;

        if !page_delay.is_zero() {
            sleep(page_delay).await;
        }
    }

    if summary.candles == 0 {
        warn!("No candles returned for {} {} in the requested range", pair, interval);
    } else {
        info!("Stored {} candles from {} pages", summary.candles, summary.pages);
    }

    Ok(summary)
}

#[derive(Debug)]
struct RateLimiter {
    max_calls: u32,
    window_duration: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    fn new(max_calls: u32, window_duration: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window_duration,
            calls: VecDeque::new(),
        }
    }

    async fn wait_if_needed(&mut self) {
        let now = Instant::now();

        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) > self.window_duration {
                self.calls.pop_front();
            } else {
                break;
            }
        }

        if self.calls.len() >= self.max_calls as usize {
            if let Some(&oldest) = self.calls.front() {
                let wait_time = self.window_duration.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
            self.calls.pop_front();
        }

        self.calls.push_back(Instant::now());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KrakenApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: {0}")]
    HttpError(u16),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Kraken API error: {0}")]
    ApiError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Api(#[from] KrakenApiError),

    #[error(transparent)]
    Store(#[from] CandleSourceError),
}
