use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use af_audit::AuditLog;
use af_backtest::{ContainerBacktester, ContainerRun, ContainerRuntime, ContainerSpec};
use af_benchmark::{Benchmarker, BenchmarkType, LoadProbe, Sample};
use af_config::TeeSettings;
use af_judge::LlmJudge;
use af_marketdata::{ArchiveProvider, Candle, Interval, MarketDataError, MarketStore};
use af_registry::{AgentStatus, ApprovedAgent, CodeHashRegistry, RiskLevel};
use af_scanner::{ImageFacts, ImageScanner, LayerRecord, ScanBackend};
use af_schemas::{Tier, Verdict, VerifyError};
use af_tee::{AttestationEvidence, TeeValidator};
use af_verifier::{
    verify_agent, verify_batch, FixedEvidence, ResourceLimits, VerifierContext, VerifyOptions,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

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
        Ok((0..count)
            .map(|i| Candle {
                ts: base + chrono::Duration::seconds(i * interval.seconds()),
                symbol: symbol.to_string(),
                interval,
                open: 62_000.0,
                high: 62_100.0,
                low: 61_900.0,
                close: 62_050.0,
                volume: 5.0,
            })
            .collect())
    }
}

struct CleanScanBackend;

#[async_trait::async_trait]
impl ScanBackend for CleanScanBackend {
    async fn inspect(&self, _image: &str) -> Result<ImageFacts> {
        Ok(ImageFacts {
            total_size_bytes: 52_428_800,
            layers: vec![LayerRecord {
                command: "CMD python main.py".to_string(),
                size_bytes: 1_000,
            }],
            base_image: Some("python:3.11-slim".to_string()),
        })
    }

    async fn vulnerability_scan(&self, _image: &str) -> Result<String> {
        Ok(r#"{"Results": []}"#.to_string())
    }
}

/// Runtime tracking peak concurrency; output depends on the image name.
struct TrackingRuntime {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl TrackingRuntime {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

fn arb_stdout() -> String {
    let mut lines = vec!["agent booting".to_string()];
    for i in 0..60 {
        let minute = i % 60;
        let hour = 10 + i / 60;
        lines.push(format!(
            r#"{{"timestamp":"2024-05-01T{hour:02}:{minute:02}:00Z","action":"arbitrage_buy","symbol":"BTCUSDT","side":"buy","price":62000.0,"amount":0.1,"pnl":10.0}}"#
        ));
        lines.push(format!(
            r#"{{"timestamp":"2024-05-01T{hour:02}:{minute:02}:20Z","action":"arbitrage_sell","symbol":"BTCUSDT","side":"sell","price":62010.0,"amount":0.1,"pnl":8.0}}"#
        ));
    }
    lines.join("\n")
}

#[async_trait::async_trait]
impl ContainerRuntime for TrackingRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(!image.starts_with("ghost/"))
    }

    async fn run_collect(
        &self,
        spec: &ContainerSpec,
        _hard_timeout: Duration,
    ) -> Result<ContainerRun> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let stdout = if spec.image.starts_with("acme/silent") {
            "no trades here\n".to_string()
        } else {
            arb_stdout()
        };

        Ok(ContainerRun {
            stdout,
            timed_out: false,
            exit_code: Some(0),
        })
    }
}

struct InstantProbe;

#[async_trait::async_trait]
impl LoadProbe for InstantProbe {
    async fn run(
        &self,
        _image: &str,
        _duration_seconds: u64,
        _benchmark_type: BenchmarkType,
    ) -> Result<Vec<Sample>> {
        Ok((0..100)
            .map(|_| Sample {
                latency_ms: 10.0,
                ok: true,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

fn make_ctx(
    dir: &tempfile::TempDir,
    runtime: Arc<TrackingRuntime>,
    limits: ResourceLimits,
) -> Arc<VerifierContext> {
    struct SharedRuntime(Arc<TrackingRuntime>);

    #[async_trait::async_trait]
    impl ContainerRuntime for SharedRuntime {
        async fn image_exists(&self, image: &str) -> Result<bool> {
            self.0.image_exists(image).await
        }
        async fn run_collect(
            &self,
            spec: &ContainerSpec,
            hard_timeout: Duration,
        ) -> Result<ContainerRun> {
            self.0.run_collect(spec, hard_timeout).await
        }
    }

    let registry =
        Arc::new(CodeHashRegistry::open(dir.path().join("registry.json")).unwrap());
    registry
        .add(ApprovedAgent {
            code_hash: "approved-hash".to_string(),
            image_tag: "acme/arbitrage-agent:1".to_string(),
            name: "arb agent".to_string(),
            description: String::new(),
            status: AgentStatus::Approved,
            risk_level: RiskLevel::Low,
            capabilities: Default::default(),
            approved_at: chrono::Utc::now(),
            metadata: Default::default(),
        })
        .unwrap();

    let tee = TeeValidator::new(TeeSettings {
        simulation_mode: true,
        ..TeeSettings::default()
    })
    .unwrap();

    Arc::new(VerifierContext::new(
        Arc::new(MarketStore::new(dir.path().join("md"), Box::new(FullDayProvider))),
        registry,
        Arc::new(AuditLog::open(dir.path().join("audit"), true).unwrap()),
        Arc::new(ImageScanner::new(Box::new(CleanScanBackend))),
        Arc::new(tee),
        Arc::new(ContainerBacktester::new(Box::new(SharedRuntime(runtime)))),
        Arc::new(Benchmarker::new(Box::new(InstantProbe))),
        Arc::new(LlmJudge::new(None, None, false)),
        Arc::new(FixedEvidence(AttestationEvidence::Simulated {
            code_hash: "approved-hash".to_string(),
        })),
        limits,
    ))
}

fn opts() -> VerifyOptions {
    VerifyOptions {
        tier: Tier::Medium,
        enable_llm: false,
        enable_backtesting: true,
        backtest_start: "2024-05-01T00:00:00Z".parse().unwrap(),
        backtest_end: "2024-05-03T00:00:00Z".parse().unwrap(),
        backtest_symbols: vec!["BTCUSDT".to_string()],
        benchmark_duration_seconds: 1,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_agent_end_to_end_green() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(&dir, Arc::new(TrackingRuntime::new()), ResourceLimits::default());
    let cancel = CancellationToken::new();

    let report = verify_agent(&ctx, "acme/arbitrage-agent:1", &opts(), &cancel)
        .await
        .unwrap();

    assert!((0..=180).contains(&report.agent_fort_score));
    assert_eq!(report.overall_status, Verdict::Passed);
    assert!(report.stage_errors.is_empty());

    let attestation = report.tee_validation.as_ref().unwrap();
    assert!(attestation.valid);

    let strategy = report.strategy_verification.as_ref().unwrap();
    assert_eq!(strategy.detected_strategy.as_str(), "arbitrage");

    // The audit log carries the full payload.
    let entries = ctx.audit.list(Some("acme/arbitrage-agent:1"), false).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].verification_id, report.verification_id);
    assert_eq!(entries[0].payload["overall_status"], "PASSED");
}

#[tokio::test]
async fn missing_image_is_the_only_total_failure_and_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(&dir, Arc::new(TrackingRuntime::new()), ResourceLimits::default());
    let cancel = CancellationToken::new();

    let err = verify_agent(&ctx, "ghost/agent:1", &opts(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::ImageNotFound { .. }));

    let entries = ctx.audit.list(Some("ghost/agent:1"), false).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload["error"]["kind"], "image_not_found");
}

#[tokio::test]
async fn agent_without_trades_fails_with_audit_entry() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(&dir, Arc::new(TrackingRuntime::new()), ResourceLimits::default());
    let cancel = CancellationToken::new();

    let err = verify_agent(&ctx, "acme/silent:1", &opts(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::AgentProducedNoTrades { .. }));

    let entries = ctx.audit.list(Some("acme/silent:1"), false).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].payload["error"]["kind"],
        "agent_produced_no_trades"
    );
}

#[tokio::test]
async fn cancellation_surfaces_typed_stage_errors_but_still_scores() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(&dir, Arc::new(TrackingRuntime::new()), ResourceLimits::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = verify_agent(&ctx, "acme/arbitrage-agent:1", &opts(), &cancel)
        .await
        .unwrap();

    // Every stage was cancelled; the score still exists, conservatively.
    assert!(report
        .stage_errors
        .values()
        .all(|e| matches!(e, VerifyError::Cancelled { .. })));
    assert!(!report.stage_errors.is_empty());
    assert_eq!(report.overall_status, Verdict::Failed);
    assert!((0..=180).contains(&report.agent_fort_score));
}

#[tokio::test]
async fn batch_respects_backtest_semaphore_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(TrackingRuntime::new());
    let limits = ResourceLimits {
        max_concurrent_backtests: 2,
        ..ResourceLimits::default()
    };
    let ctx = make_ctx(&dir, Arc::clone(&runtime), limits);
    let cancel = CancellationToken::new();

    let images: Vec<String> = (0..5)
        .map(|i| format!("acme/arbitrage-agent:{i}"))
        .chain(["ghost/agent:1".to_string(), "acme/silent:1".to_string()])
        .collect();

    let batch = verify_batch(Arc::clone(&ctx), &images, &opts(), &cancel).await;

    assert_eq!(batch.total, 7);
    assert_eq!(batch.successful, 5);
    assert_eq!(batch.failed, 2);
    assert!(batch.average_fort_score > 0.0);

    // Failure kinds are preserved per image.
    let ghost = batch.failures.iter().find(|f| f.image.starts_with("ghost")).unwrap();
    assert!(matches!(ghost.error, VerifyError::ImageNotFound { .. }));
    let silent = batch.failures.iter().find(|f| f.image.contains("silent")).unwrap();
    assert!(matches!(silent.error, VerifyError::AgentProducedNoTrades { .. }));

    // Never more than the cap in flight (the benchmark probe shares the
    // container semaphore but not the runtime, so only backtests count).
    assert!(runtime.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn batch_verdicts_match_solo_runs() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(&dir, Arc::new(TrackingRuntime::new()), ResourceLimits::default());
    let cancel = CancellationToken::new();

    let solo = verify_agent(&ctx, "acme/arbitrage-agent:1", &opts(), &cancel)
        .await
        .unwrap();

    let images = vec![
        "acme/arbitrage-agent:1".to_string(),
        "acme/arbitrage-agent:2".to_string(),
    ];
    let batch = verify_batch(Arc::clone(&ctx), &images, &opts(), &cancel).await;

    for result in &batch.results {
        assert_eq!(result.overall_status, solo.overall_status);
        assert_eq!(result.agent_fort_score, solo.agent_fort_score);
    }
}
