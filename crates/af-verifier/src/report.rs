//! The verification report: the stable JSON surface returned by the API and
//! persisted to the audit log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_backtest::BacktestResult;
use af_benchmark::BenchmarkResult;
use af_judge::{ComprehensiveEvaluation, SecurityEvaluation};
use af_scanner::ImageReport;
use af_schemas::{Tier, Verdict, VerifyError};
use af_score::{CategoryBreakdown, GateFinding};
use af_strategy::StrategyVerification;
use af_tee::AttestationResult;

/// Both judge shapes for one verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub security: SecurityEvaluation,
    pub comprehensive: ComprehensiveEvaluation,
}

/// Complete result for one agent.
///
/// Stage fields are `null` when the stage was disabled or failed; the
/// corresponding typed error then appears in `stage_errors` under the stage
/// name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verification_id: String,
    pub image: String,
    pub tier: Tier,
    pub timestamp: DateTime<Utc>,
    pub docker_scan: Option<ImageReport>,
    pub tee_validation: Option<AttestationResult>,
    pub performance_benchmark: Option<BenchmarkResult>,
    pub llm_analysis: Option<LlmAnalysis>,
    pub backtest: Option<BacktestResult>,
    pub strategy_verification: Option<StrategyVerification>,
    pub agent_fort_score: i32,
    pub overall_status: Verdict,
    pub score_breakdown: CategoryBreakdown,
    pub triggered_gates: Vec<GateFinding>,
    pub stage_errors: BTreeMap<String, VerifyError>,
}

impl VerificationReport {
    /// The reasoning text persisted alongside the audit entry, when any.
    pub fn llm_reasoning(&self) -> Option<String> {
        self.llm_analysis.as_ref().map(|a| {
            format!(
                "security: {}\ncomprehensive: {}",
                a.security.reasoning, a.comprehensive.reasoning
            )
        })
    }
}
