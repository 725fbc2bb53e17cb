//! Container-based backtesting.
//!
//! The agent's actual container is run against replayed historical market
//! data; its stdout is the trade stream. There is no simulation path: every
//! number in a backtest result came out of the container under test.

pub mod engine;
pub mod metrics;
pub mod runtime;
pub mod types;

pub use engine::ContainerBacktester;
pub use metrics::compute_metrics;
pub use runtime::{ContainerRuntime, ContainerRun, ContainerSpec, DockerCliRuntime};
pub use types::{
    parse_trade_line, BacktestConfig, BacktestError, BacktestResult, PerformanceMetrics,
    RegimePerformance, Trade, TradeSide,
};
