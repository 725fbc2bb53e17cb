use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use af_backtest::{
    BacktestConfig, BacktestError, ContainerBacktester, ContainerRun, ContainerRuntime,
    ContainerSpec,
};
use af_marketdata::{ArchiveProvider, Candle, Interval, MarketDataError, MarketStore};

/// Serves a fully populated day for any symbol/interval.
struct FullDayProvider;

#[async_trait::async_trait]
impl ArchiveProvider for FullDayProvider {
    fn name(&self) -> &'static str {
        "full-day"
    }

    async fn fetch_day(
        &self,
        symbol: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let base = af_marketdata::store::day_start(day);
        let count = 86_400 / interval.seconds();
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            out.push(Candle {
                ts: base + chrono::Duration::seconds(i * interval.seconds()),
                symbol: symbol.to_string(),
                interval,
                open: 62_000.0,
                high: 62_100.0,
                low: 61_900.0,
                close: 62_050.0,
                volume: 5.0,
            });
        }
        Ok(out)
    }
}

/// Runtime that replays a fixed transcript.
struct ScriptedRuntime {
    exists: bool,
    stdout: String,
    timed_out: bool,
    exit_code: Option<i32>,
}

#[async_trait::async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn image_exists(&self, _image: &str) -> Result<bool> {
        Ok(self.exists)
    }

    async fn run_collect(
        &self,
        spec: &ContainerSpec,
        _hard_timeout: Duration,
    ) -> Result<ContainerRun> {
        // The declared environment is part of the agent contract.
        assert_eq!(spec.env.get("BACKTEST_MODE").map(String::as_str), Some("true"));
        assert_eq!(spec.env.get("REPLAY_SPEED").map(String::as_str), Some("max"));
        assert!(spec.env.contains_key("START_DATE"));
        assert!(spec.env.contains_key("INITIAL_CAPITAL"));
        assert_eq!(spec.mounts.len(), 1);

        Ok(ContainerRun {
            stdout: self.stdout.clone(),
            timed_out: self.timed_out,
            exit_code: self.exit_code,
        })
    }
}

fn trade_line(ts: &str, action: &str, side: &str, pnl: Option<f64>) -> String {
    match pnl {
        Some(p) => format!(
            r#"{{"timestamp":"{ts}","action":"{action}","symbol":"BTCUSDT","side":"{side}","price":62000.0,"amount":0.1,"pnl":{p}}}"#
        ),
        None => format!(
            r#"{{"timestamp":"{ts}","action":"{action}","symbol":"BTCUSDT","side":"{side}","price":62000.0,"amount":0.1}}"#
        ),
    }
}

fn config() -> BacktestConfig {
    let start: DateTime<Utc> = "2024-05-01T00:00:00Z".parse().unwrap();
    let end: DateTime<Utc> = "2024-05-03T00:00:00Z".parse().unwrap();
    let mut cfg = BacktestConfig::new(start, end);
    cfg.symbols = vec!["BTCUSDT".to_string()];
    cfg
}

fn store(dir: &tempfile::TempDir) -> MarketStore {
    MarketStore::new(dir.path(), Box::new(FullDayProvider))
}

#[tokio::test]
async fn clean_run_collects_trades_and_balances_capital() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = [
        "agent starting".to_string(),
        trade_line("2024-05-01T10:00:00Z", "arbitrage_buy", "buy", Some(120.0)),
        r#"{"level":"info","msg":"heartbeat"}"#.to_string(),
        trade_line("2024-05-01T10:00:30Z", "arbitrage_sell", "sell", Some(80.0)),
        trade_line("2024-05-02T09:00:00Z", "arbitrage_buy", "buy", None),
    ]
    .join("\n");

    let backtester = ContainerBacktester::new(Box::new(ScriptedRuntime {
        exists: true,
        stdout,
        timed_out: false,
        exit_code: Some(0),
    }));

    let result = backtester.run(&store(&dir), "acme/arbitrage:1", &config()).await.unwrap();

    assert_eq!(result.metrics.total_trades, 3);
    // Capital invariant: initial + sum of non-null pnl.
    assert!((result.final_capital - 100_200.0).abs() < 1e-9);
    assert!(result.warnings.is_empty());
    assert_eq!(result.strategy_hint, "arbitrage");
    assert!((result.data_quality.coverage - 1.0).abs() < 1e-9);

    // The window overlaps only the sideways regime.
    let regime = &result.regime_performance["sideways_2024"];
    assert_eq!(regime.trades, 3);
    assert!((regime.pnl - 200.0).abs() < 1e-9);
}

#[tokio::test]
async fn malformed_output_is_no_trades() {
    let dir = tempfile::tempdir().unwrap();
    let backtester = ContainerBacktester::new(Box::new(ScriptedRuntime {
        exists: true,
        stdout: "not json\n{\"action\":\"noise\"}\n".to_string(),
        timed_out: false,
        exit_code: Some(0),
    }));

    let err = backtester.run(&store(&dir), "acme/quant:1", &config()).await.unwrap_err();
    assert!(matches!(err, BacktestError::NoTrades(_)));
}

#[tokio::test]
async fn missing_image_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let backtester = ContainerBacktester::new(Box::new(ScriptedRuntime {
        exists: false,
        stdout: String::new(),
        timed_out: false,
        exit_code: None,
    }));

    let err = backtester.run(&store(&dir), "ghost/agent:1", &config()).await.unwrap_err();
    assert!(matches!(err, BacktestError::ImageNotFound(_)));
}

#[tokio::test]
async fn timeout_with_trades_is_partial_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let backtester = ContainerBacktester::new(Box::new(ScriptedRuntime {
        exists: true,
        stdout: trade_line("2024-05-01T10:00:00Z", "momentum_entry", "buy", Some(40.0)),
        timed_out: true,
        exit_code: None,
    }));

    let result = backtester.run(&store(&dir), "acme/momentum:1", &config()).await.unwrap();
    assert_eq!(result.metrics.total_trades, 1);
    assert!(result.warnings.iter().any(|w| w.contains("timeout")));
}

#[tokio::test]
async fn crash_after_trades_is_partial_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let backtester = ContainerBacktester::new(Box::new(ScriptedRuntime {
        exists: true,
        stdout: trade_line("2024-05-01T10:00:00Z", "market_making_fill", "sell", Some(5.0)),
        timed_out: false,
        exit_code: Some(137),
    }));

    let result = backtester.run(&store(&dir), "acme/mm:1", &config()).await.unwrap();
    assert_eq!(result.metrics.total_trades, 1);
    assert!(result.warnings.iter().any(|w| w.contains("137")));
}

#[tokio::test]
async fn timeout_without_trades_is_no_trades() {
    let dir = tempfile::tempdir().unwrap();
    let backtester = ContainerBacktester::new(Box::new(ScriptedRuntime {
        exists: true,
        stdout: "booting...\n".to_string(),
        timed_out: true,
        exit_code: None,
    }));

    let err = backtester.run(&store(&dir), "acme/slow:1", &config()).await.unwrap_err();
    assert!(matches!(err, BacktestError::NoTrades(_)));
}
