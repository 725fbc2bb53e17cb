//! Provider boundary for day-archive ingestion.
//!
//! A provider serves one day of candles per request. The store owns caching,
//! range composition, and quality accounting; providers only fetch and decode.
//!
//! ## CSV column contract (header required, order-fixed)
//!
//! | Column   | Type / example        |
//! |----------|-----------------------|
//! | `ts`     | `2024-05-01T00:00:00Z` (RFC 3339, UTC) |
//! | `open`   | `62000.5`             |
//! | `high`   | `62100.0`             |
//! | `low`    | `61900.0`             |
//! | `close`  | `62050.0`             |
//! | `volume` | `123.45`              |

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Candle, Interval, MarketDataError};

/// Upstream day-archive provider contract.
///
/// Implementations must be `Send + Sync` so the store can be shared across
/// pipeline tasks.
#[async_trait::async_trait]
pub trait ArchiveProvider: Send + Sync {
    /// Human-readable name identifying this provider.
    fn name(&self) -> &'static str;

    /// Fetch all candles for `symbol` at `interval` within the UTC day `day`.
    ///
    /// A missing archive is `SourceUnavailable`; any other failure is a
    /// transport or decode error.
    async fn fetch_day(
        &self,
        symbol: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, MarketDataError>;
}

/// HTTP provider fetching plain-CSV day archives from
/// `{base}/{symbol}/{interval}/{YYYY-MM-DD}.csv`.
#[derive(Debug, Clone)]
pub struct HttpArchiveProvider {
    http: reqwest::Client,
    base_url: String,
}

impl HttpArchiveProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn archive_url(&self, symbol: &str, interval: Interval, day: NaiveDate) -> String {
        format!(
            "{}/{}/{}/{}.csv",
            self.base_url.trim_end_matches('/'),
            symbol,
            interval.as_str(),
            day.format("%Y-%m-%d"),
        )
    }
}

#[async_trait::async_trait]
impl ArchiveProvider for HttpArchiveProvider {
    fn name(&self) -> &'static str {
        "http-archive"
    }

    async fn fetch_day(
        &self,
        symbol: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let url = self.archive_url(symbol, interval, day);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketDataError::Transport(format!("GET {url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MarketDataError::SourceUnavailable {
                symbol: symbol.to_string(),
                day: day.format("%Y-%m-%d").to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(MarketDataError::Transport(format!(
                "GET {url}: status {}",
                resp.status().as_u16()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| MarketDataError::Transport(format!("read body {url}: {e}")))?;

        parse_candle_csv(&body, symbol, interval)
    }
}

/// Parse a day archive. Rows with unparseable fields are rejected as a
/// decode error: a corrupt archive must not silently thin out a window.
pub fn parse_candle_csv(
    src: &str,
    symbol: &str,
    interval: Interval,
) -> Result<Vec<Candle>, MarketDataError> {
    let mut lines = src.lines();

    let header = match lines.next() {
        Some(h) => h.trim(),
        None => return Ok(Vec::new()),
    };
    if header != "ts,open,high,low,close,volume" {
        return Err(MarketDataError::Decode(format!(
            "unexpected csv header: '{header}'"
        )));
    }

    let mut out = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 6 {
            return Err(MarketDataError::Decode(format!(
                "csv row {}: expected 6 fields, got {}",
                i + 2,
                fields.len()
            )));
        }

        let ts: DateTime<Utc> = fields[0]
            .parse()
            .map_err(|_| MarketDataError::Decode(format!("csv row {}: bad ts '{}'", i + 2, fields[0])))?;

        let mut nums = [0f64; 5];
        for (j, raw) in fields[1..].iter().enumerate() {
            nums[j] = raw.parse().map_err(|_| {
                MarketDataError::Decode(format!("csv row {}: bad number '{raw}'", i + 2))
            })?;
        }

        out.push(Candle {
            ts,
            symbol: symbol.to_string(),
            interval,
            open: nums[0],
            high: nums[1],
            low: nums[2],
            close: nums[3],
            volume: nums[4],
        });
    }

    out.sort_by_key(|c| c.ts);
    Ok(out)
}

/// Encode candles back into the day-archive CSV format.
pub fn encode_candle_csv(candles: &[Candle]) -> String {
    let mut out = String::from("ts,open,high,low,close,volume\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
        ));
    }
    out
}
