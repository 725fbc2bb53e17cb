//! Backtest input/output types and the trade-line wire contract.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_marketdata::{DataQuality, Interval, MarketDataError};

/// Actions an agent line must carry to count as a trade.
const TRADE_ACTIONS: &[&str] = &[
    "arbitrage_buy",
    "arbitrage_sell",
    "momentum_entry",
    "momentum_exit",
    "market_making_fill",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One trade parsed from the agent's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub pair: String,
    pub side: TradeSide,
    pub price: f64,
    pub amount: f64,
    pub pnl: Option<f64>,
    pub signal: Option<String>,
}

/// The raw line shape emitted by agents in backtest mode.
#[derive(Debug, Deserialize)]
struct TradeLine {
    timestamp: String,
    action: String,
    symbol: String,
    side: TradeSide,
    price: f64,
    amount: f64,
    #[serde(default)]
    pnl: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse one stdout line. Returns `None` for anything that is not a trade:
/// non-JSON noise, JSON without a recognized `action`, or missing fields.
pub fn parse_trade_line(line: &str) -> Option<Trade> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parsed: TradeLine = serde_json::from_str(line).ok()?;
    if !TRADE_ACTIONS.contains(&parsed.action.as_str()) {
        return None;
    }

    let timestamp = parsed
        .timestamp
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(&parsed.timestamp, "%Y-%m-%dT%H:%M:%S")
                .map(|n| n.and_utc())
        })
        .ok()?;

    let pair = if parsed.symbol.contains('/') {
        parsed.symbol
    } else {
        format!("{}/USDT", parsed.symbol)
    };

    Some(Trade {
        timestamp,
        pair,
        side: parsed.side,
        price: parsed.price,
        amount: parsed.amount,
        pnl: parsed.pnl,
        signal: parsed.reason.or(Some(parsed.action)),
    })
}

/// Standard trading performance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Nonpositive fraction (e.g. -0.05 for a 5% drawdown).
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub win_rate: f64,
    /// +infinity when there are no losing trades; serialized as JSON null.
    #[serde(with = "infinite_as_null")]
    pub profit_factor: f64,
    pub total_trades: usize,
    /// Mean hours between consecutive trades.
    pub avg_trade_duration_hours: f64,
    /// Sharpe scaled by win rate.
    pub risk_adjusted_return: f64,
}

/// Per-regime aggregate over the backtest window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimePerformance {
    pub trades: usize,
    pub pnl: f64,
    pub hours: u64,
    pub annualized_return: f64,
}

/// Complete backtest output for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub agent_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub metrics: PerformanceMetrics,
    pub regime_performance: BTreeMap<String, RegimePerformance>,
    /// First 100 trades only; the count lives in `metrics.total_trades`.
    pub trades: Vec<Trade>,
    pub strategy_hint: String,
    pub data_quality: DataQuality,
    pub warnings: Vec<String>,
}

/// Backtest run parameters.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub symbols: Vec<String>,
    /// Interval of the replay snapshot handed to the agent.
    pub replay_interval: Interval,
    pub initial_capital: f64,
    /// True for BACKTEST_MODE runs: agent must terminate on its own and the
    /// hard timeout drops to 30s.
    pub backtest_mode: bool,
}

impl BacktestConfig {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            replay_interval: Interval::M1,
            initial_capital: 100_000.0,
            backtest_mode: true,
        }
    }

    /// Hard timeout for the container, in seconds.
    pub fn hard_timeout_secs(&self) -> u64 {
        if self.backtest_mode {
            30
        } else {
            300
        }
    }
}

/// Backtester failure kinds.
#[derive(Debug)]
pub enum BacktestError {
    /// The image is not present locally. Fail fast: nothing downstream is
    /// meaningful.
    ImageNotFound(String),
    /// The container ran but no trade line was parsed.
    NoTrades(String),
    /// Market data could not serve the requested window.
    Data(MarketDataError),
    /// Container runtime failure (spawn, attach, removal).
    Runtime(String),
}

impl fmt::Display for BacktestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktestError::ImageNotFound(image) => write!(f, "image not found: {image}"),
            BacktestError::NoTrades(image) => {
                write!(f, "agent produced no trades: {image}")
            }
            BacktestError::Data(e) => write!(f, "market data error: {e}"),
            BacktestError::Runtime(msg) => write!(f, "container runtime error: {msg}"),
        }
    }
}

impl std::error::Error for BacktestError {}

impl From<MarketDataError> for BacktestError {
    fn from(e: MarketDataError) -> Self {
        BacktestError::Data(e)
    }
}

/// serde adapter: non-finite floats have no JSON form, so +inf round-trips
/// as null.
mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_some(v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}
