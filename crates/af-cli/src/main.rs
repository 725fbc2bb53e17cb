use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod render;
mod wiring;

#[derive(Parser)]
#[command(name = "af")]
#[command(about = "AgentFort: verification desk for trading-agent container images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a single agent image end to end
    Verify(commands::verification::VerifyArgs),

    /// Verify a batch of agent images concurrently
    VerifyBatch(commands::verification::VerifyBatchArgs),

    /// Backtest an agent and verify its trading strategy
    VerifyStrategy(commands::verification::VerifyStrategyArgs),

    /// Scan an image: vulnerabilities, layers, framework detection
    Scan(commands::verification::ScanArgs),

    /// Load-test an agent container and report performance
    Benchmark(commands::verification::BenchmarkArgs),

    /// Run an agent container against historical market data
    Backtest(commands::verification::BacktestArgs),

    /// Run scenario simulations against an agent container
    Simulate(commands::verification::SimulateArgs),

    /// List verification audit records
    AuditList(commands::management::AuditListArgs),

    /// Initialize environment and configuration
    Init(commands::management::InitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time .env bootstrap; real deployments set the environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Verify(args) => commands::verification::verify(args).await,
        Commands::VerifyBatch(args) => commands::verification::verify_batch(args).await,
        Commands::VerifyStrategy(args) => commands::verification::verify_strategy(args).await,
        Commands::Scan(args) => commands::verification::scan(args).await,
        Commands::Benchmark(args) => commands::verification::benchmark(args).await,
        Commands::Backtest(args) => commands::verification::backtest(args).await,
        Commands::Simulate(args) => commands::verification::simulate(args).await,
        Commands::AuditList(args) => commands::management::audit_list(args),
        Commands::Init(args) => commands::management::init(args).await,
    }
}
