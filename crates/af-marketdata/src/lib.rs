//! Historical OHLCV market-data store.
//!
//! Candles are fetched from an upstream provider in day-sized archives,
//! cached on disk as one CSV per `(symbol, interval, day)`, and composed into
//! range queries by concatenating days and clipping to `[start, end)`.
//!
//! The store is single-writer per day file: writes go to a temp path and are
//! published by atomic rename, so readers never observe a partial file.

pub mod provider;
pub mod regimes;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use provider::{ArchiveProvider, HttpArchiveProvider};
pub use regimes::MarketRegime;
pub use store::{CoverageStats, DataQuality, FetchOutcome, MarketStore};

/// Candle interval identifiers recognized by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::M30 => 1800,
            Interval::H1 => 3600,
            Interval::H4 => 14_400,
            Interval::D1 => 86_400,
        }
    }

    pub fn parse(s: &str) -> Result<Self, MarketDataError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            other => Err(MarketDataError::Decode(format!(
                "invalid interval '{other}'. expected one of: 1m | 5m | 15m | 30m | 1h | 4h | 1d"
            ))),
        }
    }
}

/// A single OHLCV candle.
///
/// Within a `(symbol, interval, range)` query the sequence is strictly
/// increasing by timestamp; gaps are reflected in the query's data quality,
/// never interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub interval: Interval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Errors produced by the market-data store and its providers.
#[derive(Debug)]
pub enum MarketDataError {
    /// An archive is missing upstream for a requested day. Upper layers
    /// treat this as a data-quality reduction unless coverage collapses.
    SourceUnavailable { symbol: String, day: String },
    /// Coverage for the requested window fell below the 0.5 floor.
    InsufficientData { coverage: f64 },
    /// Network or transport failure.
    Transport(String),
    /// A payload or cache file could not be decoded.
    Decode(String),
    /// Local filesystem failure.
    Io(String),
}

impl fmt::Display for MarketDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketDataError::SourceUnavailable { symbol, day } => {
                write!(f, "source unavailable: {symbol} {day}")
            }
            MarketDataError::InsufficientData { coverage } => {
                write!(f, "insufficient data: coverage {coverage:.2} < 0.50")
            }
            MarketDataError::Transport(msg) => write!(f, "transport error: {msg}"),
            MarketDataError::Decode(msg) => write!(f, "decode error: {msg}"),
            MarketDataError::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for MarketDataError {}
