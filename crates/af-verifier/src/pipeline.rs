//! The per-agent verification pipeline.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use af_backtest::{BacktestConfig, BacktestError, BacktestResult};
use af_benchmark::BenchmarkType;
use af_judge::{ComprehensiveEvaluation, SecurityEvaluation};
use af_schemas::{Tier, VerifyError};
use af_score::{calculate_fort_score, ScoreInputs};
use af_strategy::verify_strategy;

use crate::context::VerifierContext;
use crate::report::{LlmAnalysis, VerificationReport};

/// Options for one verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub tier: Tier,
    pub enable_llm: bool,
    pub enable_backtesting: bool,
    pub backtest_start: DateTime<Utc>,
    pub backtest_end: DateTime<Utc>,
    pub backtest_symbols: Vec<String>,
    pub benchmark_duration_seconds: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            tier: Tier::Medium,
            enable_llm: true,
            enable_backtesting: true,
            backtest_start: "2024-05-01T00:00:00Z".parse().expect("constant parses"),
            backtest_end: "2024-05-07T00:00:00Z".parse().expect("constant parses"),
            backtest_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            benchmark_duration_seconds: 30,
        }
    }
}

/// Run one stage under its semaphore, deadline and cancellation scope.
///
/// The permit is held for the stage's whole run and released on every path,
/// including deadline and cancel.
async fn run_stage<T, F>(
    stage: &'static str,
    semaphore: &Semaphore,
    deadline: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, VerifyError>
where
    F: Future<Output = T>,
{
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(VerifyError::Cancelled { stage: stage.to_string() })
        }
        permit = semaphore.acquire() => permit.map_err(|_| VerifyError::Cancelled {
            stage: stage.to_string(),
        })?,
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VerifyError::Cancelled { stage: stage.to_string() }),
        out = tokio::time::timeout(deadline, fut) => out.map_err(|_| {
            VerifyError::DeadlineExceeded {
                stage: stage.to_string(),
                seconds: deadline.as_secs(),
            }
        }),
    };

    drop(permit);
    result
}

fn map_backtest_error(e: BacktestError) -> VerifyError {
    match e {
        BacktestError::ImageNotFound(image) => VerifyError::ImageNotFound { image },
        BacktestError::NoTrades(image) => VerifyError::AgentProducedNoTrades { image },
        BacktestError::Data(af_marketdata::MarketDataError::InsufficientData { coverage }) => {
            VerifyError::InsufficientData { coverage }
        }
        // Any other market-data failure means the window could not be
        // served at all.
        BacktestError::Data(_) => VerifyError::InsufficientData { coverage: 0.0 },
        BacktestError::Runtime(msg) => VerifyError::Config {
            message: format!("container runtime: {msg}"),
        },
    }
}

/// Verify one agent image.
///
/// Stage failures become typed values threaded into the score inputs; the
/// only fatal outcomes are a missing image and an agent that produced no
/// trades, both of which still leave an audit entry behind.
pub async fn verify_agent(
    ctx: &VerifierContext,
    image: &str,
    opts: &VerifyOptions,
    cancel: &CancellationToken,
) -> Result<VerificationReport, VerifyError> {
    let started_at = Utc::now();

    match ctx.backtester.image_exists(image).await {
        Ok(true) => {}
        Ok(false) => {
            let err = VerifyError::ImageNotFound {
                image: image.to_string(),
            };
            record_fatal(ctx, image, opts.tier, started_at, &err);
            return Err(err);
        }
        Err(e) => {
            let err = VerifyError::Config {
                message: format!("container runtime unavailable: {e}"),
            };
            record_fatal(ctx, image, opts.tier, started_at, &err);
            return Err(err);
        }
    }

    info!(%image, tier = opts.tier.as_str(), "starting verification");

    // The judge's context is derived from the image report, so the scan
    // completes first; the remaining stages fan out concurrently.
    let scan_res = run_stage(
        "scan",
        &ctx.semaphores.scan,
        ctx.deadlines.scan,
        cancel,
        ctx.scanner.scan(image),
    )
    .await;

    let judge_report = match &scan_res {
        Ok(report) => report.clone(),
        Err(err) => af_scanner::ImageReport::degraded(image, format!("scan failed: {err}")),
    };

    let tee_fut = run_stage("tee", &ctx.semaphores.tee, ctx.deadlines.tee, cancel, async {
        let evidence = ctx.evidence.evidence_for(image).await;
        ctx.tee.validate(image, evidence, &ctx.registry)
    });

    let backtest_fut = async {
        if !opts.enable_backtesting {
            return Ok(None);
        }
        let mut config = BacktestConfig::new(opts.backtest_start, opts.backtest_end);
        config.symbols = opts.backtest_symbols.clone();
        let deadline =
            Duration::from_secs(config.hard_timeout_secs()) + ctx.deadlines.backtest_grace;
        run_stage(
            "backtest",
            &ctx.semaphores.backtest,
            deadline,
            cancel,
            ctx.backtester.run(&ctx.market, image, &config),
        )
        .await
        .and_then(|inner| inner.map_err(map_backtest_error))
        .map(Some)
    };

    let llm_fut = async {
        if !opts.enable_llm {
            return Ok(None);
        }
        run_stage("llm", &ctx.semaphores.llm, ctx.deadlines.llm, cancel, async {
            let security = ctx.judge.evaluate_security(&judge_report).await;
            let comprehensive = ctx.judge.evaluate_comprehensive(&judge_report).await;
            LlmAnalysis {
                security,
                comprehensive,
            }
        })
        .await
        .map(Some)
    };

    let benchmark_fut = run_stage(
        "benchmark",
        &ctx.semaphores.backtest,
        Duration::from_secs(opts.benchmark_duration_seconds) + ctx.deadlines.benchmark_grace,
        cancel,
        ctx.benchmarker.run(
            image,
            opts.benchmark_duration_seconds,
            BenchmarkType::for_image(image),
        ),
    );

    let (tee_res, backtest_res, llm_res, benchmark_res) =
        tokio::join!(tee_fut, backtest_fut, llm_fut, benchmark_fut);

    let mut stage_errors: BTreeMap<String, VerifyError> = BTreeMap::new();

    let docker_scan = unwrap_stage("scan", scan_res, &mut stage_errors);
    let tee_validation = unwrap_stage("tee", tee_res, &mut stage_errors);
    let performance_benchmark = unwrap_stage("benchmark", benchmark_res, &mut stage_errors);

    let backtest: Option<BacktestResult> = match backtest_res {
        Ok(maybe) => maybe,
        Err(err) => {
            // An agent that produced no trades (or whose image vanished
            // mid-run) cannot be scored at all.
            if matches!(
                err,
                VerifyError::AgentProducedNoTrades { .. } | VerifyError::ImageNotFound { .. }
            ) {
                record_fatal(ctx, image, opts.tier, started_at, &err);
                return Err(err);
            }
            stage_errors.insert("backtest".to_string(), err);
            None
        }
    };

    let llm_analysis: Option<LlmAnalysis> = match llm_res {
        Ok(maybe) => maybe,
        Err(err) => {
            // Judge failures always recover into the conservative fallback.
            stage_errors.insert("llm".to_string(), err.clone());
            Some(LlmAnalysis {
                security: SecurityEvaluation::fallback(&err.to_string()),
                comprehensive: ComprehensiveEvaluation::fallback(&err.to_string()),
            })
        }
    };

    let strategy_verification = backtest
        .as_ref()
        .map(|result| verify_strategy(result, ctx.market.regimes()));

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: docker_scan.as_ref(),
        attestation: tee_validation.as_ref(),
        benchmark: performance_benchmark.as_ref(),
        llm: llm_analysis.as_ref().map(|a| &a.comprehensive),
        strategy: strategy_verification.as_ref(),
    });

    let report = VerificationReport {
        verification_id: af_audit::derive_verification_id(image, started_at),
        image: image.to_string(),
        tier: opts.tier,
        timestamp: Utc::now(),
        docker_scan,
        tee_validation,
        performance_benchmark,
        llm_analysis,
        backtest,
        strategy_verification,
        agent_fort_score: fort.score,
        overall_status: fort.status,
        score_breakdown: fort.breakdown,
        triggered_gates: fort.triggered_gates,
        stage_errors,
    };

    match serde_json::to_value(&report) {
        Ok(payload) => {
            let reasoning = report.llm_reasoning();
            if let Err(e) = ctx
                .audit
                .append(image, opts.tier, started_at, payload, reasoning)
            {
                warn!(%image, error = %e, "audit append failed");
            }
        }
        Err(e) => warn!(%image, error = %e, "report serialization failed"),
    }

    info!(
        %image,
        score = report.agent_fort_score,
        status = report.overall_status.as_str(),
        "verification finished"
    );

    Ok(report)
}

fn unwrap_stage<T>(
    stage: &str,
    result: Result<T, VerifyError>,
    stage_errors: &mut BTreeMap<String, VerifyError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(stage, error = %err, "stage failed");
            stage_errors.insert(stage.to_string(), err);
            None
        }
    }
}

/// Record a pipeline-fatal error in the audit log.
fn record_fatal(
    ctx: &VerifierContext,
    image: &str,
    tier: Tier,
    started_at: DateTime<Utc>,
    err: &VerifyError,
) {
    let payload = serde_json::json!({
        "error": err,
        "message": err.to_string(),
    });
    if let Err(e) = ctx.audit.append(image, tier, started_at, payload, None) {
        warn!(%image, error = %e, "audit append failed for fatal error");
    }
}
