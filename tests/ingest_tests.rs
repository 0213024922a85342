// Integration tests for Kraken OHLC ingestion against a mock server

mod common;

use std::time::Duration;

use common::t0;
use grid_backtest::{ingest_range, CandleStore, IngestError, Interval, KrakenApiError, KrakenOhlcClient};
use mockito::Matcher;
use serde_json::json;

fn ohlc_row(ts: i64, price: f64) -> serde_json::Value {
    json!([ts, price.to_string(), (price + 5.0).to_string(), (price - 5.0).to_string(), price.to_string(), price.to_string(), "1.5", 3])
}

fn ohlc_body(rows: Vec<serde_json::Value>, last: i64) -> String {
    json!({ "error": [], "result": { "XBTUSDT": rows, "last": last } }).to_string()
}

fn page_query(since: i64) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("pair".into(), "XBTUSDT".into()),
        Matcher::UrlEncoded("interval".into(), "1".into()),
        Matcher::UrlEncoded("since".into(), since.to_string()),
    ])
}

#[tokio::test]
async fn test_ingest_walks_pages_until_cursor_stalls() {
    let mut server = mockito::Server::new_async().await;
    let start = t0().timestamp();

    let first = server
        .mock("GET", "/0/public/OHLC")
        .match_query(page_query(start))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ohlc_body(
            vec![ohlc_row(start, 42000.0), ohlc_row(start + 60, 42010.0), ohlc_row(start + 120, 42020.0)],
            start + 180,
        ))
        .create_async()
        .await;
    let second = server
        .mock("GET", "/0/public/OHLC")
        .match_query(page_query(start + 180))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ohlc_body(vec![ohlc_row(start + 180, 42030.0), ohlc_row(start + 240, 42040.0)], start + 300))
        .create_async()
        .await;
    let third = server
        .mock("GET", "/0/public/OHLC")
        .match_query(page_query(start + 300))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ohlc_body(Vec::new(), start + 300))
        .create_async()
        .await;

    let store = CandleStore::open_in_memory().unwrap();
    let mut client = KrakenOhlcClient::with_base_url(&server.url());

    let summary = ingest_range(
        &mut client,
        &store,
        "XBTUSDT",
        Interval::OneMinute,
        t0(),
        t0() + chrono::Duration::days(1),
        Duration::ZERO,
    )
    .await
    .expect("ingestion should succeed");

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;

    assert_eq!(summary.pages, 3);
    assert_eq!(summary.candles, 5);
    assert_eq!(store.count("XBTUSDT", Interval::OneMinute).unwrap(), 5);

    let (first_time, last_time) = store.time_bounds("XBTUSDT", Interval::OneMinute).unwrap().unwrap();
    assert_eq!(first_time, t0());
    assert_eq!(last_time.timestamp(), start + 240);
}

#[tokio::test]
async fn test_ingest_stops_at_end_of_range() {
    let mut server = mockito::Server::new_async().await;
    let start = t0().timestamp();

    let page = server
        .mock("GET", "/0/public/OHLC")
        .match_query(page_query(start))
        .with_status(200)
        .with_body(ohlc_body(
            vec![
                ohlc_row(start, 42000.0),
                ohlc_row(start + 60, 42010.0),
                ohlc_row(start + 120, 42020.0),
                ohlc_row(start + 180, 42030.0),
            ],
            start + 180,
        ))
        .expect(1)
        .create_async()
        .await;

    let store = CandleStore::open_in_memory().unwrap();
    let mut client = KrakenOhlcClient::with_base_url(&server.url());

    let summary = ingest_range(
        &mut client,
        &store,
        "XBTUSDT",
        Interval::OneMinute,
        t0(),
        t0() + chrono::Duration::minutes(2),
        Duration::ZERO,
    )
    .await
    .unwrap();

    page.assert_async().await;
    assert_eq!(summary.pages, 1);
    assert_eq!(summary.candles, 2);
}

#[tokio::test]
async fn test_api_error_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/0/public/OHLC")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "error": ["EQuery:Unknown asset pair"] }).to_string())
        .create_async()
        .await;

    let store = CandleStore::open_in_memory().unwrap();
    let mut client = KrakenOhlcClient::with_base_url(&server.url());

    let err = ingest_range(
        &mut client,
        &store,
        "NOPE",
        Interval::OneHour,
        t0(),
        t0() + chrono::Duration::days(1),
        Duration::ZERO,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IngestError::Api(KrakenApiError::ApiError(ref msg)) if msg.contains("Unknown asset pair")));
    assert_eq!(store.count("NOPE", Interval::OneHour).unwrap(), 0);
}

#[tokio::test]
async fn test_http_failure_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/0/public/OHLC")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let mut client = KrakenOhlcClient::with_base_url(&server.url());
    let err = client
        .fetch_page("XBTUSDT", Interval::OneMinute, None)
        .await
        .unwrap_err();

    assert!(matches!(err, KrakenApiError::HttpError(503)));
}
