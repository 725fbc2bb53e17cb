use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, NaiveDate, Utc};

use af_marketdata::{
    ArchiveProvider, Candle, Interval, MarketDataError, MarketStore,
};

/// Provider that serves a full day of 1h candles per request and counts
/// how many times it was asked.
struct CountingProvider {
    calls: AtomicUsize,
    missing_days: Vec<NaiveDate>,
}

impl CountingProvider {
    fn new(missing_days: Vec<NaiveDate>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            missing_days,
        }
    }
}

#[async_trait::async_trait]
impl ArchiveProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch_day(
        &self,
        symbol: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.missing_days.contains(&day) {
            return Err(MarketDataError::SourceUnavailable {
                symbol: symbol.to_string(),
                day: day.to_string(),
            });
        }

        let base = af_marketdata::store::day_start(day);
        let mut out = Vec::new();
        for h in 0..24 {
            out.push(Candle {
                ts: base + chrono::Duration::hours(h),
                symbol: symbol.to_string(),
                interval,
                open: 100.0 + h as f64,
                high: 101.0 + h as f64,
                low: 99.0 + h as f64,
                close: 100.5 + h as f64,
                volume: 10.0,
            });
        }
        Ok(out)
    }
}

fn window(start: &str, end: &str) -> (DateTime<Utc>, DateTime<Utc>) {
    (start.parse().unwrap(), end.parse().unwrap())
}

#[tokio::test]
async fn second_fetch_hits_disk_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarketStore::new(dir.path(), Box::new(CountingProvider::new(vec![])));
    let (start, end) = window("2024-05-01T00:00:00Z", "2024-05-03T00:00:00Z");
    let symbols = vec!["BTCUSDT".to_string()];

    let first = store.fetch(&symbols, start, end, Interval::H1).await.unwrap();
    assert_eq!(first.candles["BTCUSDT"].len(), 48);
    assert_eq!(first.quality.coverage, 1.0);

    let second = store.fetch(&symbols, start, end, Interval::H1).await.unwrap();
    assert_eq!(second.candles["BTCUSDT"].len(), 48);

    // A store whose provider has lost every day still serves the window
    // from the published day files.
    let all_missing = vec![
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
    ];
    let store2 = MarketStore::new(dir.path(), Box::new(CountingProvider::new(all_missing)));
    let third = store2.fetch(&symbols, start, end, Interval::H1).await.unwrap();
    assert_eq!(third.candles["BTCUSDT"].len(), 48);
    assert_eq!(third.quality.coverage, 1.0);
}

#[tokio::test]
async fn range_is_clipped_and_strictly_increasing() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarketStore::new(dir.path(), Box::new(CountingProvider::new(vec![])));
    let (start, end) = window("2024-05-01T06:00:00Z", "2024-05-01T18:00:00Z");

    let out = store
        .fetch(&["ETHUSDT".to_string()], start, end, Interval::H1)
        .await
        .unwrap();
    let series = &out.candles["ETHUSDT"];

    assert_eq!(series.len(), 12);
    assert!(series.first().unwrap().ts >= start);
    assert!(series.last().unwrap().ts < end);
    for pair in series.windows(2) {
        assert!(pair[0].ts < pair[1].ts);
    }
}

#[tokio::test]
async fn missing_day_reduces_coverage_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = vec![NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()];
    let store = MarketStore::new(dir.path(), Box::new(CountingProvider::new(missing)));
    let (start, end) = window("2024-05-01T00:00:00Z", "2024-05-03T00:00:00Z");

    let out = store
        .fetch(&["BTCUSDT".to_string()], start, end, Interval::H1)
        .await
        .unwrap();

    assert_eq!(out.candles["BTCUSDT"].len(), 24);
    assert!((out.quality.coverage - 0.5).abs() < 1e-9);
    assert_eq!(out.quality.missing_hours, 24);
}

#[tokio::test]
async fn coverage_below_floor_is_insufficient_data() {
    let dir = tempfile::tempdir().unwrap();
    let missing = vec![
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
    ];
    let store = MarketStore::new(dir.path(), Box::new(CountingProvider::new(missing)));
    let (start, end) = window("2024-05-01T00:00:00Z", "2024-05-04T00:00:00Z");

    let err = store
        .fetch(&["BTCUSDT".to_string()], start, end, Interval::H1)
        .await
        .unwrap_err();

    match err {
        MarketDataError::InsufficientData { coverage } => assert!(coverage < 0.5),
        other => panic!("expected InsufficientData, got {other}"),
    }
}

#[tokio::test]
async fn builtin_regimes_are_queryable() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarketStore::new(dir.path(), Box::new(CountingProvider::new(vec![])));

    let bull = store.regime("bull_2024").expect("bull_2024 exists");
    assert!(bull.start < bull.end);
    assert!(store.regime("no_such_regime").is_none());
}

#[tokio::test]
async fn summary_counts_published_day_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarketStore::new(dir.path(), Box::new(CountingProvider::new(vec![])));
    let (start, end) = window("2024-05-01T00:00:00Z", "2024-05-03T00:00:00Z");

    store
        .fetch(&["BTCUSDT".to_string()], start, end, Interval::H1)
        .await
        .unwrap();

    let stats = store.summary().await.unwrap();
    assert_eq!(stats.total_day_files, 2);
    assert_eq!(stats.symbols["BTCUSDT"]["1h"], 2);
}
