//! The verifier context: every shared store and engine, threaded explicitly.
//!
//! No process-wide mutable state exists anywhere in the pipeline; everything
//! a verification touches lives here.

use std::sync::Arc;

use tokio::sync::Semaphore;

use af_audit::AuditLog;
use af_backtest::ContainerBacktester;
use af_benchmark::Benchmarker;
use af_judge::LlmJudge;
use af_marketdata::MarketStore;
use af_registry::CodeHashRegistry;
use af_scanner::ImageScanner;
use af_tee::TeeValidator;

use crate::evidence::EvidenceSource;
use crate::limits::{ResourceLimits, StageDeadlines};

/// Global per-stage semaphores derived from [`ResourceLimits`].
pub struct StageSemaphores {
    pub scan: Semaphore,
    pub tee: Semaphore,
    pub backtest: Semaphore,
    pub llm: Semaphore,
}

impl StageSemaphores {
    fn new(limits: &ResourceLimits) -> Self {
        Self {
            scan: Semaphore::new(limits.max_concurrent_scans),
            tee: Semaphore::new(limits.max_concurrent_tee),
            backtest: Semaphore::new(limits.max_concurrent_backtests),
            llm: Semaphore::new(limits.max_concurrent_llm),
        }
    }
}

/// Everything a verification needs.
pub struct VerifierContext {
    pub market: Arc<MarketStore>,
    pub registry: Arc<CodeHashRegistry>,
    pub audit: Arc<AuditLog>,
    pub scanner: Arc<ImageScanner>,
    pub tee: Arc<TeeValidator>,
    pub backtester: Arc<ContainerBacktester>,
    pub benchmarker: Arc<Benchmarker>,
    pub judge: Arc<LlmJudge>,
    pub evidence: Arc<dyn EvidenceSource>,
    pub limits: ResourceLimits,
    pub deadlines: StageDeadlines,
    pub semaphores: StageSemaphores,
}

impl VerifierContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: Arc<MarketStore>,
        registry: Arc<CodeHashRegistry>,
        audit: Arc<AuditLog>,
        scanner: Arc<ImageScanner>,
        tee: Arc<TeeValidator>,
        backtester: Arc<ContainerBacktester>,
        benchmarker: Arc<Benchmarker>,
        judge: Arc<LlmJudge>,
        evidence: Arc<dyn EvidenceSource>,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            market,
            registry,
            audit,
            scanner,
            tee,
            backtester,
            benchmarker,
            judge,
            evidence,
            semaphores: StageSemaphores::new(&limits),
            limits,
            deadlines: StageDeadlines::default(),
        }
    }
}
