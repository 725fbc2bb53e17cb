use std::collections::BTreeMap;

use chrono::Utc;

use af_backtest::RegimePerformance;
use af_benchmark::{BenchmarkResult, BenchmarkType};
use af_judge::ComprehensiveEvaluation;
use af_scanner::{ImageReport, Vulnerability};
use af_schemas::{Severity, TrustLevel, Verdict};
use af_score::{calculate_fort_score, ScoreInputs};
use af_strategy::{DetectedStrategy, StrategyVerification, VerificationStatus};
use af_tee::{AttestationResult, TeePlatform};

fn clean_report() -> ImageReport {
    ImageReport {
        image: "shade/arbitrage-agent:latest".to_string(),
        total_size_bytes: 52_428_800,
        layers: vec![],
        vulnerabilities: vec![],
        agent_framework_detected: true,
        base_image: None,
        timestamp: Utc::now(),
        warnings: vec![],
    }
}

fn vuln(severity: Severity) -> Vulnerability {
    Vulnerability {
        id: "CVE-2024-0001".to_string(),
        severity,
        package: "openssl".to_string(),
        installed_version: "1.1.1".to_string(),
        fixed_version: None,
        description: String::new(),
    }
}

fn valid_attestation(trust_level: TrustLevel) -> AttestationResult {
    AttestationResult {
        valid: true,
        platform: TeePlatform::IntelTdx,
        measurements: BTreeMap::new(),
        quote: None,
        trust_level,
        code_hash: Some("cafe".to_string()),
        errors: vec![],
        warnings: vec![],
        timestamp: Utc::now(),
    }
}

fn invalid_attestation() -> AttestationResult {
    AttestationResult {
        valid: false,
        platform: TeePlatform::None,
        measurements: BTreeMap::new(),
        quote: None,
        trust_level: TrustLevel::Untrusted,
        code_hash: None,
        errors: vec!["signature verification failed".to_string()],
        warnings: vec![],
        timestamp: Utc::now(),
    }
}

fn strong_benchmark() -> BenchmarkResult {
    BenchmarkResult {
        image: "shade/arbitrage-agent:latest".to_string(),
        duration_seconds: 30,
        throughput_tps: 2_500.0,
        avg_latency_ms: 12.0,
        p50_latency_ms: 10.0,
        p95_latency_ms: 30.0,
        p99_latency_ms: 60.0,
        max_latency_ms: 90.0,
        error_rate_percent: 0.0,
        benchmark_type: BenchmarkType::Trading,
        timestamp: Utc::now(),
        warnings: vec![],
    }
}

fn confident_llm() -> ComprehensiveEvaluation {
    let mut eval = ComprehensiveEvaluation::fallback("unused");
    eval.behavioral_flags = vec![];
    eval.confidence = 0.85;
    eval.code_quality.overall_score = 0.8;
    eval.risk_assessment.systemic_risk_score = 0.2;
    eval.score_adjustments = BTreeMap::from([
        ("risk_management".to_string(), 8.0),
        ("code_architecture".to_string(), 6.0),
        ("innovative_strategy".to_string(), 2.0),
    ]);
    eval
}

fn verified_strategy() -> StrategyVerification {
    let regime = |ret: f64| RegimePerformance {
        trades: 30,
        pnl: 500.0,
        hours: 100,
        annualized_return: ret,
    };
    StrategyVerification {
        detected_strategy: DetectedStrategy::Arbitrage,
        verification_status: VerificationStatus::Verified,
        effectiveness: 78.0,
        risk: 22.0,
        performance_by_regime: BTreeMap::from([
            ("bull_2024".to_string(), regime(0.4)),
            ("sideways_2024".to_string(), regime(0.2)),
        ]),
        notes: vec![],
    }
}

/// Scenario 1: clean arbitrage agent, approved code, no vulnerabilities.
#[test]
fn clean_agent_clamps_to_180_and_passes() {
    let report = clean_report();
    let attestation = valid_attestation(TrustLevel::High);
    let benchmark = strong_benchmark();
    let llm = confident_llm();
    let strategy = verified_strategy();

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&llm),
        strategy: Some(&strategy),
    });

    assert_eq!(fort.breakdown.security, 10);
    // adjustments +16, quality +3, systemic -2.
    assert_eq!(fort.breakdown.llm, 17);
    assert_eq!(fort.breakdown.behavior, 15);
    // verified +30, effectiveness +23.4, risk<30 +10, both regimes positive +20
    assert_eq!(fort.breakdown.performance, 83);
    assert_eq!(fort.score, 180);
    assert_eq!(fort.status, Verdict::Passed);
    assert!(fort.triggered_gates.is_empty());
}

/// Scenario 2: one CRITICAL CVE, otherwise perfect.
#[test]
fn critical_vulnerability_forces_failed() {
    let mut report = clean_report();
    report.vulnerabilities.push(vuln(Severity::Critical));
    let attestation = valid_attestation(TrustLevel::High);
    let benchmark = strong_benchmark();
    let llm = confident_llm();
    let strategy = verified_strategy();

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&llm),
        strategy: Some(&strategy),
    });

    assert_eq!(fort.status, Verdict::Failed);
    assert_eq!(fort.triggered_gates[0].gate, "critical_vulnerabilities");
    // Score is still computed and clamped; no special zeroing.
    assert!((0..=180).contains(&fort.score));
    assert!(fort.score > 100);
}

/// Scenario 3: attestation invalid.
#[test]
fn invalid_attestation_forces_failed_and_penalizes() {
    let report = clean_report();
    let attestation = invalid_attestation();

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        ..ScoreInputs::default()
    });

    // framework +5, invalid attestation -10.
    assert_eq!(fort.breakdown.security, -5);
    assert_eq!(fort.status, Verdict::Failed);
    assert_eq!(fort.triggered_gates[0].gate, "attestation_invalid");
}

/// Scenario 4: LLM provider offline, everything else green.
#[test]
fn llm_fallback_is_a_warning_via_confidence() {
    let report = clean_report();
    let attestation = valid_attestation(TrustLevel::High);
    let benchmark = strong_benchmark();
    let llm = ComprehensiveEvaluation::fallback("provider offline");
    let strategy = verified_strategy();

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&llm),
        strategy: Some(&strategy),
    });

    assert_eq!(fort.status, Verdict::Warning);
    assert!(fort
        .triggered_gates
        .iter()
        .any(|g| g.gate == "llm_low_confidence"));
    // Fallback: no adjustments, 1 flag (-3), neutral quality (0), systemic
    // 0.8 (-8) => -11.
    assert_eq!(fort.breakdown.llm, -11);
}

#[test]
fn systemic_risk_above_ninety_percent_floors_the_llm_category() {
    let mut llm = confident_llm();
    llm.risk_assessment.systemic_risk_score = 0.95;
    llm.score_adjustments.clear();

    let fort = calculate_fort_score(&ScoreInputs {
        llm: Some(&llm),
        ..ScoreInputs::default()
    });

    // quality +3, systemic -30 => -27, within the clamp.
    assert_eq!(fort.breakdown.llm, -27);
}

#[test]
fn untrusted_attestation_fails_regardless_of_other_scores() {
    let report = clean_report();
    let attestation = invalid_attestation();
    let benchmark = strong_benchmark();
    let llm = confident_llm();
    let strategy = verified_strategy();

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&llm),
        strategy: Some(&strategy),
    });

    assert_eq!(fort.status, Verdict::Failed);
}

#[test]
fn two_serious_flags_fail_one_warns() {
    let report = clean_report();
    let attestation = valid_attestation(TrustLevel::High);
    let mut llm = confident_llm();

    llm.behavioral_flags = vec!["suspicious scheduling logic".to_string()];
    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        llm: Some(&llm),
        ..ScoreInputs::default()
    });
    assert_eq!(fort.status, Verdict::Warning);

    llm.behavioral_flags.push("potentially malicious callback".to_string());
    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        llm: Some(&llm),
        ..ScoreInputs::default()
    });
    assert_eq!(fort.status, Verdict::Failed);
}

#[test]
fn gate_order_failed_before_warning() {
    let mut report = clean_report();
    report.vulnerabilities.push(vuln(Severity::Critical));
    for _ in 0..6 {
        report.vulnerabilities.push(vuln(Severity::High));
    }
    let attestation = valid_attestation(TrustLevel::High);

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        ..ScoreInputs::default()
    });

    assert_eq!(fort.status, Verdict::Failed);
    assert_eq!(fort.triggered_gates[0].gate, "critical_vulnerabilities");
    // The high-severity warning gate is still recorded after it.
    assert!(fort
        .triggered_gates
        .iter()
        .any(|g| g.gate == "high_vulnerabilities"));
}

#[test]
fn scoring_is_deterministic() {
    let report = clean_report();
    let attestation = valid_attestation(TrustLevel::Medium);
    let benchmark = strong_benchmark();
    let llm = confident_llm();
    let strategy = verified_strategy();

    let inputs = ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&llm),
        strategy: Some(&strategy),
    };

    assert_eq!(calculate_fort_score(&inputs), calculate_fort_score(&inputs));
}

/// LLM fallback monotonicity: replacing a successful result with the
/// fallback never raises the score and never upgrades the status.
#[test]
fn fallback_never_raises_score_or_status() {
    let report = clean_report();
    let attestation = valid_attestation(TrustLevel::High);
    let benchmark = strong_benchmark();
    let strategy = verified_strategy();
    let good = confident_llm();
    let fallback = ComprehensiveEvaluation::fallback("offline");

    let with_good = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&good),
        strategy: Some(&strategy),
    });
    let with_fallback = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&fallback),
        strategy: Some(&strategy),
    });

    assert!(with_fallback.score <= with_good.score);

    let rank = |v: Verdict| match v {
        Verdict::Passed => 0,
        Verdict::Warning => 1,
        Verdict::Failed => 2,
    };
    assert!(rank(with_fallback.status) >= rank(with_good.status));
}

#[test]
fn score_is_always_in_bounds() {
    // Worst case everywhere.
    let mut report = clean_report();
    report.agent_framework_detected = false;
    for _ in 0..5 {
        report.vulnerabilities.push(vuln(Severity::Critical));
    }
    let attestation = invalid_attestation();
    let benchmark = BenchmarkResult::degraded(
        "x",
        BenchmarkType::Standard,
        "probe down".to_string(),
    );
    let fallback = ComprehensiveEvaluation::fallback("offline");
    let mut strategy = verified_strategy();
    strategy.verification_status = VerificationStatus::Failed;
    strategy.effectiveness = 0.0;
    strategy.risk = 100.0;
    strategy.performance_by_regime.clear();

    let fort = calculate_fort_score(&ScoreInputs {
        image_report: Some(&report),
        attestation: Some(&attestation),
        benchmark: Some(&benchmark),
        llm: Some(&fallback),
        strategy: Some(&strategy),
    });

    assert!((0..=180).contains(&fort.score));
    assert_eq!(fort.status, Verdict::Failed);
    assert!(fort.breakdown.security >= -30 && fort.breakdown.security <= 30);
    assert!(fort.breakdown.performance >= -50 && fort.breakdown.performance <= 90);
}
