//! The backtest protocol: snapshot, replay, parse, measure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use af_marketdata::provider::encode_candle_csv;
use af_marketdata::{Interval, MarketRegime, MarketStore};

use crate::metrics::{annualize, compute_metrics};
use crate::runtime::{ContainerRuntime, ContainerSpec, DockerCliRuntime};
use crate::types::{
    parse_trade_line, BacktestConfig, BacktestError, BacktestResult, RegimePerformance, Trade,
};

/// Number of trades retained on the result for inspection.
const TRADE_SAMPLE_LIMIT: usize = 100;

/// Runs agent containers against replayed market data.
pub struct ContainerBacktester {
    runtime: Box<dyn ContainerRuntime>,
}

impl ContainerBacktester {
    pub fn new(runtime: Box<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn with_docker_cli() -> Self {
        Self::new(Box::new(DockerCliRuntime))
    }

    /// Is the image present locally? Exposed so the orchestrator can fail
    /// fast before fanning out stages.
    pub async fn image_exists(&self, image: &str) -> anyhow::Result<bool> {
        self.runtime.image_exists(image).await
    }

    /// Run the full protocol for `image` over the configured window.
    pub async fn run(
        &self,
        store: &MarketStore,
        image: &str,
        config: &BacktestConfig,
    ) -> Result<BacktestResult, BacktestError> {
        let Some(reference_symbol) = config.symbols.first().cloned() else {
            return Err(BacktestError::Runtime("no symbols configured".to_string()));
        };

        // 1. Fail fast on a missing image.
        let exists = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|e| BacktestError::Runtime(e.to_string()))?;
        if !exists {
            return Err(BacktestError::ImageNotFound(image.to_string()));
        }

        // 2. Materialize the replay snapshot where the agent expects it.
        let snapshot = store
            .fetch(&config.symbols, config.start, config.end, config.replay_interval)
            .await?;

        let data_dir = tempfile::tempdir()
            .map_err(|e| BacktestError::Runtime(format!("snapshot dir: {e}")))?;
        for (symbol, candles) in &snapshot.candles {
            let path = data_dir.path().join(format!("{symbol}.csv"));
            tokio::fs::write(&path, encode_candle_csv(candles))
                .await
                .map_err(|e| BacktestError::Runtime(format!("write snapshot {symbol}: {e}")))?;
        }

        // 3. Declared environment; the agent owns its own termination in
        //    backtest mode, the hard timeout is the backstop.
        let mut spec = ContainerSpec::new(image);
        if config.backtest_mode {
            spec.env.insert("BACKTEST_MODE".to_string(), "true".to_string());
        }
        spec.env.insert(
            "START_DATE".to_string(),
            config.start.format("%Y-%m-%d").to_string(),
        );
        spec.env.insert(
            "END_DATE".to_string(),
            config.end.format("%Y-%m-%d").to_string(),
        );
        spec.env.insert(
            "INITIAL_CAPITAL".to_string(),
            format!("{}", config.initial_capital),
        );
        spec.env.insert("REPLAY_SPEED".to_string(), "max".to_string());
        spec.mounts
            .push((data_dir.path().to_path_buf(), "/data".to_string()));

        let timeout = std::time::Duration::from_secs(config.hard_timeout_secs());
        let run = self
            .runtime
            .run_collect(&spec, timeout)
            .await
            .map_err(|e| BacktestError::Runtime(e.to_string()))?;

        // 4–5. Parse the trade stream; decide partial vs. failure.
        let trades: Vec<Trade> = run.stdout.lines().filter_map(parse_trade_line).collect();

        let mut warnings = Vec::new();
        if run.timed_out {
            warnings.push(format!(
                "agent hit the {}s hard timeout; result is partial",
                config.hard_timeout_secs()
            ));
        } else if let Some(code) = run.exit_code {
            if code != 0 {
                warnings.push(format!("agent exited with status {code}; result is partial"));
            }
        }

        if trades.is_empty() {
            return Err(BacktestError::NoTrades(image.to_string()));
        }

        info!(%image, trades = trades.len(), "collected agent trades");

        // 6. Metrics against a 1h price series over the same window.
        let final_capital = config.initial_capital
            + trades.iter().filter_map(|t| t.pnl).sum::<f64>();

        let reference = vec![reference_symbol];
        let priced_hours = match store
            .fetch(&reference, config.start, config.end, Interval::H1)
            .await
        {
            Ok(out) => out.candles[&reference[0]].len() as u64,
            Err(e) => {
                warn!(error = %e, "1h price series unavailable, using window length");
                warnings.push("1h price series unavailable for metrics".to_string());
                (config.end - config.start).num_hours().max(0) as u64
            }
        };

        let metrics = compute_metrics(&trades, config.initial_capital, final_capital, priced_hours);

        let regime_performance =
            aggregate_regimes(store.regimes(), &trades, config.initial_capital, config.start, config.end);

        let mut sample = trades;
        sample.truncate(TRADE_SAMPLE_LIMIT);

        Ok(BacktestResult {
            agent_id: image.to_string(),
            start: config.start,
            end: config.end,
            initial_capital: config.initial_capital,
            final_capital,
            metrics,
            regime_performance,
            trades: sample,
            strategy_hint: strategy_hint(image).to_string(),
            data_quality: snapshot.quality,
            warnings,
        })
    }
}

/// Aggregate trades per named regime overlapping the window.
fn aggregate_regimes(
    regimes: &[MarketRegime],
    trades: &[Trade],
    initial_capital: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BTreeMap<String, RegimePerformance> {
    let mut out = BTreeMap::new();

    for regime in regimes {
        let overlap_start = regime.start.max(start);
        let overlap_end = regime.end.min(end);
        if overlap_start >= overlap_end {
            continue;
        }

        let hours = (overlap_end - overlap_start).num_hours().max(0) as u64;
        let in_window: Vec<&Trade> = trades
            .iter()
            .filter(|t| t.timestamp >= overlap_start && t.timestamp < overlap_end)
            .collect();
        let pnl: f64 = in_window.iter().filter_map(|t| t.pnl).sum();

        let period_return = if initial_capital > 0.0 {
            pnl / initial_capital
        } else {
            0.0
        };

        out.insert(
            regime.name.clone(),
            RegimePerformance {
                trades: in_window.len(),
                pnl,
                hours,
                annualized_return: annualize(period_return, hours),
            },
        );
    }

    out
}

/// Strategy label guessed from the image reference; the strategy verifier
/// decides the real classification from behavior.
fn strategy_hint(image: &str) -> &'static str {
    let lower = image.to_ascii_lowercase();
    if lower.contains("arbitrage") {
        "arbitrage"
    } else if lower.contains("momentum") {
        "momentum"
    } else if lower.contains("market") && lower.contains("mak") {
        "market_making"
    } else {
        "unknown"
    }
}
