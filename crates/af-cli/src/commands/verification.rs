//! Verification commands: verify, verify-batch, verify-strategy, scan,
//! benchmark, backtest, simulate.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Args;
use tokio_util::sync::CancellationToken;

use af_backtest::{
    parse_trade_line, BacktestConfig, ContainerBacktester, ContainerRuntime, ContainerSpec,
    DockerCliRuntime,
};
use af_benchmark::{Benchmarker, BenchmarkType};
use af_config::VerifierSettings;
use af_marketdata::{ArchiveProvider, Candle, Interval, MarketDataError, MarketStore};
use af_scanner::ImageScanner;
use af_schemas::Tier;
use af_strategy::verify_strategy as run_strategy_verifier;
use af_verifier::{verify_agent, verify_batch as run_batch, ResourceLimits, VerifyOptions};

use crate::render::{self, OutputFormat};
use crate::wiring::{build_context, parse_date};

#[derive(Args)]
pub struct VerifyArgs {
    /// Agent image reference (name[:tag][@digest])
    pub image: String,

    /// Verification tier
    #[arg(long, default_value = "medium")]
    pub tier: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub output: OutputFormat,

    /// Disable the LLM judge (conservative fallback is NOT applied; the
    /// stage is skipped entirely)
    #[arg(long, conflicts_with = "enable_llm")]
    pub no_llm: bool,

    /// Explicitly enable the LLM judge (the default)
    #[arg(long)]
    pub enable_llm: bool,

    /// LLM provider override
    #[arg(long, value_parser = ["anthropic", "openai", "local"])]
    pub llm_provider: Option<String>,

    /// Disable the container backtest stage
    #[arg(long)]
    pub no_backtest: bool,
}

impl VerifyArgs {
    fn options(&self) -> Result<VerifyOptions> {
        Ok(VerifyOptions {
            tier: Tier::parse(&self.tier)?,
            enable_llm: !self.no_llm,
            enable_backtesting: !self.no_backtest,
            ..VerifyOptions::default()
        })
    }

    fn settings(&self) -> VerifierSettings {
        let mut settings = VerifierSettings::from_env();
        if let Some(provider) = &self.llm_provider {
            settings.llm.primary_provider = provider.clone();
        }
        settings
    }
}

pub async fn verify(args: VerifyArgs) -> Result<()> {
    let opts = args.options()?;
    let settings = args.settings();
    let ctx = build_context(&settings, ResourceLimits::default())?;

    let report = verify_agent(&ctx, &args.image, &opts, &CancellationToken::new())
        .await
        .map_err(|e| anyhow!("{e}"))?;

    match args.output {
        OutputFormat::Terminal => render::render_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}

#[derive(Args)]
pub struct VerifyBatchArgs {
    /// Agent image references
    #[arg(required = true)]
    pub images: Vec<String>,

    /// Cap on concurrently running backtest containers
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    #[command(flatten)]
    pub verify: VerifyArgs2,
}

/// Shared verify flags without the positional image.
#[derive(Args)]
pub struct VerifyArgs2 {
    #[arg(long, default_value = "medium")]
    pub tier: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub output: OutputFormat,

    #[arg(long)]
    pub no_llm: bool,

    #[arg(long, value_parser = ["anthropic", "openai", "local"])]
    pub llm_provider: Option<String>,

    #[arg(long)]
    pub no_backtest: bool,
}

pub async fn verify_batch(args: VerifyBatchArgs) -> Result<()> {
    let mut settings = VerifierSettings::from_env();
    if let Some(provider) = &args.verify.llm_provider {
        settings.llm.primary_provider = provider.clone();
    }

    let mut limits = ResourceLimits::default();
    if let Some(n) = args.max_concurrent {
        limits.max_concurrent_backtests = n.max(1);
    }

    let ctx = build_context(&settings, limits)?;
    let opts = VerifyOptions {
        tier: Tier::parse(&args.verify.tier)?,
        enable_llm: !args.verify.no_llm,
        enable_backtesting: !args.verify.no_backtest,
        ..VerifyOptions::default()
    };

    let batch = run_batch(ctx, &args.images, &opts, &CancellationToken::new()).await;

    match args.verify.output {
        OutputFormat::Terminal => render::render_batch(&batch),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&batch)?),
    }

    Ok(())
}

#[derive(Args)]
pub struct VerifyStrategyArgs {
    pub image: String,

    #[arg(long, default_value = "2024-05-01")]
    pub start_date: String,

    #[arg(long, default_value = "2024-05-07")]
    pub end_date: String,

    /// Use a named regime window instead of explicit dates
    #[arg(long)]
    pub regime: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub output: OutputFormat,
}

pub async fn verify_strategy(args: VerifyStrategyArgs) -> Result<()> {
    let settings = VerifierSettings::from_env();
    let ctx = build_context(&settings, ResourceLimits::default())?;

    let (start, end) = match &args.regime {
        Some(name) => {
            let regime = ctx
                .market
                .regime(name)
                .ok_or_else(|| anyhow!("unknown regime '{name}'"))?;
            (regime.start, regime.end)
        }
        None => (parse_date(&args.start_date)?, parse_date(&args.end_date)?),
    };

    let mut config = BacktestConfig::new(start, end);
    config.symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];

    let result = ctx
        .backtester
        .run(&ctx.market, &args.image, &config)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    let verification = run_strategy_verifier(&result, ctx.market.regimes());

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verification)?),
        OutputFormat::Terminal => {
            println!("strategy={}", verification.detected_strategy.as_str());
            println!("status={:?}", verification.verification_status);
            println!("effectiveness={:.1}", verification.effectiveness);
            println!("risk={:.1}", verification.risk);
            for note in &verification.notes {
                println!("note: {note}");
            }
        }
    }

    Ok(())
}

#[derive(Args)]
pub struct ScanArgs {
    pub image: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub output: OutputFormat,
}

pub async fn scan(args: ScanArgs) -> Result<()> {
    let scanner = ImageScanner::with_docker_cli();
    let report = scanner.scan(&args.image).await;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Terminal => {
            println!("image={}", report.image);
            println!("size_bytes={}", report.total_size_bytes);
            println!("layers={}", report.layers.len());
            println!("agent_framework_detected={}", report.agent_framework_detected);
            for (severity, count) in report.severity_counts() {
                println!("{}={count}", severity.as_str().to_ascii_lowercase());
            }
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
        }
    }

    Ok(())
}

#[derive(Args)]
pub struct BenchmarkArgs {
    pub image: String,

    /// Probe duration in seconds
    #[arg(long, default_value_t = 30)]
    pub duration: u64,

    /// Benchmark type
    #[arg(long = "type", value_parser = ["standard", "trading", "stress"])]
    pub benchmark_type: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub output: OutputFormat,
}

pub async fn benchmark(args: BenchmarkArgs) -> Result<()> {
    let benchmark_type = match &args.benchmark_type {
        Some(s) => BenchmarkType::parse(s).expect("validated by clap"),
        None => BenchmarkType::for_image(&args.image),
    };

    let benchmarker = Benchmarker::with_docker_http();
    let result = benchmarker.run(&args.image, args.duration, benchmark_type).await;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Terminal => {
            println!("type={}", result.benchmark_type.as_str());
            println!("throughput_tps={:.1}", result.throughput_tps);
            println!("avg_latency_ms={:.1}", result.avg_latency_ms);
            println!("p95_latency_ms={:.1}", result.p95_latency_ms);
            println!("error_rate_percent={:.1}", result.error_rate_percent);
            for warning in &result.warnings {
                println!("warning: {warning}");
            }
        }
    }

    Ok(())
}

#[derive(Args)]
pub struct BacktestArgs {
    pub image: String,

    #[arg(long, default_value = "2024-05-01")]
    pub start_date: String,

    #[arg(long, default_value = "2024-05-07")]
    pub end_date: String,

    /// Expected strategy (display hint only; detection is behavioral)
    #[arg(long, value_parser = ["arbitrage", "momentum", "market_making"])]
    pub strategy: Option<String>,

    /// Use a named regime window instead of explicit dates
    #[arg(long)]
    pub regime: Option<String>,

    /// Fetch real market data (the default)
    #[arg(long, conflicts_with = "use_mock_data")]
    pub use_real_data: bool,

    /// Replay deterministic synthetic data instead of the real archive
    #[arg(long)]
    pub use_mock_data: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub output: OutputFormat,
}

pub async fn backtest(args: BacktestArgs) -> Result<()> {
    let settings = VerifierSettings::from_env();

    let store = if args.use_mock_data {
        MarketStore::new(
            settings.market_data.cache_dir.join("mock"),
            Box::new(MockArchiveProvider),
        )
    } else {
        MarketStore::new(
            &settings.market_data.cache_dir,
            Box::new(af_marketdata::HttpArchiveProvider::new(
                settings.market_data.base_url.clone(),
            )),
        )
    };

    let (start, end) = match &args.regime {
        Some(name) => {
            let regime = store
                .regime(name)
                .ok_or_else(|| anyhow!("unknown regime '{name}'"))?;
            (regime.start, regime.end)
        }
        None => (parse_date(&args.start_date)?, parse_date(&args.end_date)?),
    };

    let config = BacktestConfig::new(start, end);
    let backtester = ContainerBacktester::with_docker_cli();
    let result = backtester
        .run(&store, &args.image, &config)
        .await
        .map_err(|e| anyhow!("{e}"))?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Terminal => {
            if let Some(expected) = &args.strategy {
                println!("expected_strategy={expected}");
            }
            println!("trades={}", result.metrics.total_trades);
            println!("initial_capital={:.2}", result.initial_capital);
            println!("final_capital={:.2}", result.final_capital);
            println!("total_return={:.4}", result.metrics.total_return);
            println!("sharpe={:.2}", result.metrics.sharpe_ratio);
            println!("max_drawdown={:.4}", result.metrics.max_drawdown);
            println!(
                "profit_factor={}",
                render::format_profit_factor(result.metrics.profit_factor)
            );
            println!("data_coverage={:.2}", result.data_quality.coverage);
            for warning in &result.warnings {
                println!("warning: {warning}");
            }
        }
    }

    Ok(())
}

#[derive(Args)]
pub struct SimulateArgs {
    pub image: String,

    /// Scenario to run
    #[arg(long, default_value = "all", value_parser = ["price_oracle", "arbitrage", "all"])]
    pub scenario: String,
}

pub async fn simulate(args: SimulateArgs) -> Result<()> {
    let scenarios: Vec<&str> = match args.scenario.as_str() {
        "all" => vec!["price_oracle", "arbitrage"],
        name => vec![name],
    };

    let runtime = DockerCliRuntime;
    for scenario in scenarios {
        println!("scenario={scenario}");

        let mut spec = ContainerSpec::new(&args.image);
        spec.env.insert("BACKTEST_MODE".to_string(), "true".to_string());
        spec.env.insert("SCENARIO".to_string(), scenario.to_string());
        spec.env.insert("REPLAY_SPEED".to_string(), "max".to_string());

        let run = runtime
            .run_collect(&spec, Duration::from_secs(30))
            .await
            .context("scenario container run")?;

        let trades: Vec<_> = run.stdout.lines().filter_map(parse_trade_line).collect();
        println!("  trades={}", trades.len());
        if run.timed_out {
            println!("  warning: scenario hit the 30s timeout");
        }
        let pnl: f64 = trades.iter().filter_map(|t| t.pnl).sum();
        println!("  pnl={pnl:.2}");
    }

    Ok(())
}

/// Deterministic synthetic day archives for offline backtests.
struct MockArchiveProvider;

#[async_trait::async_trait]
impl ArchiveProvider for MockArchiveProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_day(
        &self,
        symbol: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let base = af_marketdata::store::day_start(day);
        let count = 86_400 / interval.seconds();
        let anchor = if symbol.starts_with("ETH") { 3_000.0 } else { 60_000.0 };

        Ok((0..count)
            .map(|i| {
                let ts = base + chrono::Duration::seconds(i * interval.seconds());
                // Slow deterministic oscillation around the anchor.
                let phase = (i as f64) / (count as f64) * std::f64::consts::TAU;
                let mid = anchor * (1.0 + 0.01 * phase.sin());
                Candle {
                    ts,
                    symbol: symbol.to_string(),
                    interval,
                    open: mid * 0.999,
                    high: mid * 1.002,
                    low: mid * 0.998,
                    close: mid,
                    volume: 10.0,
                }
            })
            .collect())
    }
}
