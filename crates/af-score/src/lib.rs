//! Fort Score arithmetic and verdict gates.
//!
//! A pure function of the component outputs: base 100, four bounded category
//! adjustments, final clamp to [0, 180], then the ordered gate list decides
//! PASSED / WARNING / FAILED. Missing stage outputs are scored conservatively
//! (a missing attestation counts as invalid); they never panic and never
//! prevent a score from existing.

use serde::{Deserialize, Serialize};

use af_benchmark::BenchmarkResult;
use af_judge::ComprehensiveEvaluation;
use af_scanner::ImageReport;
use af_schemas::{Severity, TrustLevel, Verdict};
use af_strategy::{StrategyVerification, VerificationStatus};
use af_tee::AttestationResult;

/// Flag keywords that make an LLM behavioral flag "serious".
const SERIOUS_FLAG_KEYWORDS: &[&str] = &["malicious", "suspicious", "high risk", "dangerous"];

/// Everything the engine scores. Each component is optional: a stage that
/// failed or was disabled contributes its conservative default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs<'a> {
    pub image_report: Option<&'a ImageReport>,
    pub attestation: Option<&'a AttestationResult>,
    pub benchmark: Option<&'a BenchmarkResult>,
    pub llm: Option<&'a ComprehensiveEvaluation>,
    pub strategy: Option<&'a StrategyVerification>,
}

/// Per-category adjustments, already clamped to their declared ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    /// Clamped to [-30, 30].
    pub security: i32,
    /// Clamped to [-30, 30].
    pub llm: i32,
    /// Clamped to [-30, 30].
    pub behavior: i32,
    /// Clamped to [-50, 90].
    pub performance: i32,
}

/// One triggered gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateFinding {
    pub gate: String,
    pub verdict: Verdict,
    pub message: String,
}

/// The Fort Score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FortScore {
    /// Clamped to [0, 180].
    pub score: i32,
    pub status: Verdict,
    pub breakdown: CategoryBreakdown,
    pub triggered_gates: Vec<GateFinding>,
}

/// Compute score and verdict.
pub fn calculate_fort_score(inputs: &ScoreInputs) -> FortScore {
    let breakdown = CategoryBreakdown {
        security: security_adjustment(inputs),
        llm: llm_adjustment(inputs.llm),
        behavior: behavior_adjustment(inputs.benchmark),
        performance: performance_adjustment(inputs.strategy),
    };

    let raw = 100 + breakdown.security + breakdown.llm + breakdown.behavior + breakdown.performance;
    let score = raw.clamp(0, 180);

    let triggered_gates = evaluate_gates(inputs);
    let status = triggered_gates
        .first()
        .map(|g| g.verdict)
        .unwrap_or(Verdict::Passed);

    FortScore {
        score,
        status,
        breakdown,
        triggered_gates,
    }
}

/// Security: vulnerability penalty, trust bonus, framework bonus.
fn security_adjustment(inputs: &ScoreInputs) -> i32 {
    let mut adjustment = 0i32;

    if let Some(report) = inputs.image_report {
        let critical = report.count(Severity::Critical) as i32;
        let high = report.count(Severity::High) as i32;
        let medium = report.count(Severity::Medium) as i32;
        adjustment -= (critical * 10 + high * 5 + medium * 2).min(20);

        if report.agent_framework_detected {
            adjustment += 5;
        }
    }

    match inputs.attestation {
        Some(att) if att.valid => {
            adjustment += match att.trust_level {
                TrustLevel::High => 5,
                TrustLevel::Medium => 3,
                TrustLevel::Low | TrustLevel::Untrusted => 0,
            };
        }
        // Invalid or missing attestation both penalize.
        _ => adjustment -= 10,
    }

    adjustment.clamp(-30, 30)
}

/// LLM: declared adjustments, flag penalty, quality bonus, systemic penalty.
fn llm_adjustment(llm: Option<&ComprehensiveEvaluation>) -> i32 {
    let Some(eval) = llm else {
        return 0;
    };

    let mut adjustment = eval.score_adjustments.values().sum::<f64>();
    adjustment -= (eval.behavioral_flags.len() as f64 * 3.0).min(10.0);
    adjustment += (eval.code_quality.overall_score - 0.5) * 10.0;

    let systemic = eval.risk_assessment.systemic_risk_score;
    if systemic > 0.9 {
        adjustment -= 30.0;
    } else {
        adjustment -= 10.0 * systemic;
    }

    (adjustment.round() as i32).clamp(-30, 30)
}

/// Behavior: throughput, latency and error-rate thresholds.
fn behavior_adjustment(benchmark: Option<&BenchmarkResult>) -> i32 {
    let Some(b) = benchmark else {
        return 0;
    };

    let mut adjustment = 0i32;

    if b.throughput_tps < 500.0 {
        adjustment -= 10;
    } else if b.throughput_tps > 2000.0 {
        adjustment += 5;
    }

    if b.avg_latency_ms > 100.0 {
        adjustment -= 5;
    } else if b.avg_latency_ms < 20.0 {
        adjustment += 5;
    }

    if b.error_rate_percent > 5.0 {
        adjustment -= 10;
    } else if b.error_rate_percent < 1.0 {
        adjustment += 5;
    }

    adjustment.clamp(-30, 30)
}

/// Performance: verification status, effectiveness, risk band, regime
/// consistency.
fn performance_adjustment(strategy: Option<&StrategyVerification>) -> i32 {
    let Some(s) = strategy else {
        return 0;
    };

    let mut adjustment: f64 = match s.verification_status {
        VerificationStatus::Verified => 30.0,
        VerificationStatus::Partial => 15.0,
        VerificationStatus::Failed => -20.0,
    };

    adjustment += s.effectiveness / 100.0 * 30.0;

    if s.risk > 80.0 {
        adjustment -= 20.0;
    } else if s.risk > 60.0 {
        adjustment -= 10.0;
    } else if s.risk < 30.0 {
        adjustment += 10.0;
    }

    let regimes = &s.performance_by_regime;
    if !regimes.is_empty() {
        let positive = regimes.values().filter(|r| r.annualized_return > 0.0).count();
        adjustment += positive as f64 / regimes.len() as f64 * 20.0;
    }

    (adjustment.round() as i32).clamp(-50, 90)
}

fn serious_flag_count(llm: Option<&ComprehensiveEvaluation>) -> usize {
    llm.map(|eval| {
        eval.behavioral_flags
            .iter()
            .filter(|flag| {
                let lower = flag.to_ascii_lowercase();
                SERIOUS_FLAG_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .count()
    })
    .unwrap_or(0)
}

/// Evaluate the ordered gate list. The first entry decides the status; all
/// triggered gates are recorded.
fn evaluate_gates(inputs: &ScoreInputs) -> Vec<GateFinding> {
    let mut triggered = Vec::new();

    let critical = inputs
        .image_report
        .map(|r| r.count(Severity::Critical))
        .unwrap_or(0);
    let high = inputs
        .image_report
        .map(|r| r.count(Severity::High))
        .unwrap_or(0);
    let attestation_valid = inputs.attestation.map(|a| a.valid).unwrap_or(false);
    let error_rate = inputs.benchmark.map(|b| b.error_rate_percent);
    let serious_flags = serious_flag_count(inputs.llm);

    if critical > 0 {
        triggered.push(GateFinding {
            gate: "critical_vulnerabilities".to_string(),
            verdict: Verdict::Failed,
            message: format!("{critical} CRITICAL vulnerabilities present"),
        });
    }
    if !attestation_valid {
        triggered.push(GateFinding {
            gate: "attestation_invalid".to_string(),
            verdict: Verdict::Failed,
            message: "attestation is invalid or unavailable".to_string(),
        });
    }
    if let Some(rate) = error_rate {
        if rate > 10.0 {
            triggered.push(GateFinding {
                gate: "error_rate_fatal".to_string(),
                verdict: Verdict::Failed,
                message: format!("error rate {rate:.1}% > 10%"),
            });
        }
    }
    if serious_flags >= 2 {
        triggered.push(GateFinding {
            gate: "llm_serious_flags".to_string(),
            verdict: Verdict::Failed,
            message: format!("{serious_flags} serious behavioral flags"),
        });
    }
    if let Some(s) = inputs.strategy {
        if s.verification_status == VerificationStatus::Failed {
            triggered.push(GateFinding {
                gate: "strategy_failed".to_string(),
                verdict: Verdict::Failed,
                message: "strategy verification failed".to_string(),
            });
        }
    }

    if high > 5 {
        triggered.push(GateFinding {
            gate: "high_vulnerabilities".to_string(),
            verdict: Verdict::Warning,
            message: format!("{high} HIGH vulnerabilities present"),
        });
    }
    if let Some(rate) = error_rate {
        if rate > 5.0 && rate <= 10.0 {
            triggered.push(GateFinding {
                gate: "error_rate_elevated".to_string(),
                verdict: Verdict::Warning,
                message: format!("error rate {rate:.1}% > 5%"),
            });
        }
    }
    if serious_flags == 1 {
        triggered.push(GateFinding {
            gate: "llm_serious_flag".to_string(),
            verdict: Verdict::Warning,
            message: "1 serious behavioral flag".to_string(),
        });
    }
    if let Some(eval) = inputs.llm {
        if eval.confidence < 0.5 {
            triggered.push(GateFinding {
                gate: "llm_low_confidence".to_string(),
                verdict: Verdict::Warning,
                message: format!("LLM confidence {:.2} < 0.50", eval.confidence),
            });
        }
    }
    if let Some(s) = inputs.strategy {
        if s.risk > 80.0 || s.effectiveness < 40.0 {
            triggered.push(GateFinding {
                gate: "strategy_quality".to_string(),
                verdict: Verdict::Warning,
                message: format!(
                    "strategy risk {:.0} / effectiveness {:.0} out of band",
                    s.risk, s.effectiveness
                ),
            });
        }
    }

    triggered
}
