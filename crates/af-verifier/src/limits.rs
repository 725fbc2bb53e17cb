//! Global concurrency limits and per-stage deadlines.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-stage concurrency caps applied across the whole process. The
/// orchestrator's semaphores are the only global concurrency control; no
/// component spawns unbounded parallelism internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_concurrent_scans: usize,
    pub max_concurrent_tee: usize,
    pub max_concurrent_backtests: usize,
    pub max_concurrent_llm: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 16,
            max_concurrent_tee: 10,
            max_concurrent_backtests: 8,
            max_concurrent_llm: 6,
        }
    }
}

/// Per-stage deadlines. The backtest deadline wraps the container's own hard
/// timeout with scheduling headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDeadlines {
    pub scan: Duration,
    pub tee: Duration,
    pub backtest_grace: Duration,
    pub llm: Duration,
    pub benchmark_grace: Duration,
}

impl Default for StageDeadlines {
    fn default() -> Self {
        Self {
            scan: Duration::from_secs(120),
            tee: Duration::from_secs(30),
            backtest_grace: Duration::from_secs(30),
            llm: Duration::from_secs(30),
            benchmark_grace: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_concurrent_backtests, 8);
        assert_eq!(limits.max_concurrent_scans, 16);
        assert_eq!(limits.max_concurrent_llm, 6);
        assert_eq!(limits.max_concurrent_tee, 10);

        let deadlines = StageDeadlines::default();
        assert_eq!(deadlines.scan, Duration::from_secs(120));
        assert_eq!(deadlines.llm, Duration::from_secs(30));
    }
}
