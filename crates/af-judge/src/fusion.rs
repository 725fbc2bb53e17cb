//! Deterministic fusion: trust assessment from analyzer findings and the
//! weighted ensemble combination of two evaluations.

use std::collections::BTreeMap;

use crate::models::{
    CapitalRiskFindings, CodeQuality, ComprehensiveEvaluation, ControlStrength,
    DeceptionFindings, KeySecurityFindings, Recommendation, RiskAssessment, RiskRating,
    SecurityEvaluation, TransactionControlFindings,
};

/// Fuse the four analyzer findings into the trust-focused result.
///
/// The arithmetic is fixed: key security 30%, transaction controls 25%,
/// deception 20% (starts at 1.0 and is reduced), capital risk 25%. Each
/// sub-score is a bit-field of its analyzer booleans.
pub fn calculate_trust_assessment(
    key_security: KeySecurityFindings,
    transaction_controls: TransactionControlFindings,
    deception: DeceptionFindings,
    capital_risk: CapitalRiskFindings,
    confidence: f64,
) -> SecurityEvaluation {
    // Show-stopper predicates.
    let mut critical_vulnerabilities = Vec::new();
    if key_security.has_plaintext_keys {
        critical_vulnerabilities.push("Private keys stored in plaintext".to_string());
    }
    if !transaction_controls.has_spending_limits {
        critical_vulnerabilities.push("No transaction spending limits".to_string());
    }
    if deception.backdoor_detected {
        critical_vulnerabilities.push("Backdoor access detected".to_string());
    }
    if deception.risk_level == RiskRating::Critical {
        critical_vulnerabilities.push("Critical deception patterns detected".to_string());
    }

    let mut trust_score = 0.0;

    let mut key_score = 0.0;
    if !key_security.has_plaintext_keys {
        key_score += 0.4;
    }
    if key_security.key_generation_secure {
        key_score += 0.3;
    }
    if key_security.key_storage_encrypted {
        key_score += 0.2;
    }
    if key_security.key_rotation_implemented {
        key_score += 0.1;
    }
    trust_score += key_score * 0.3;

    let mut tx_score = 0.0;
    if transaction_controls.has_spending_limits {
        tx_score += 0.4;
    }
    if transaction_controls.has_approval_mechanisms {
        tx_score += 0.3;
    }
    if transaction_controls.emergency_stop_present {
        tx_score += 0.2;
    }
    if transaction_controls.transaction_monitoring {
        tx_score += 0.1;
    }
    trust_score += tx_score * 0.25;

    let mut deception_score: f64 = 1.0;
    if deception.backdoor_detected {
        deception_score -= 0.5;
    }
    if deception.time_bomb_detected {
        deception_score -= 0.3;
    }
    if deception.obfuscated_code_found {
        deception_score -= 0.2;
    }
    trust_score += deception_score.max(0.0) * 0.2;

    let mut capital_score = 0.0;
    if capital_risk.max_loss_bounded {
        capital_score += 0.3;
    }
    if capital_risk.position_size_controls {
        capital_score += 0.3;
    }
    if capital_risk.stop_loss_implemented {
        capital_score += 0.2;
    }
    if capital_risk.risk_controls_adequate {
        capital_score += 0.2;
    }
    trust_score += capital_score * 0.25;

    let can_trust_with_capital = critical_vulnerabilities.is_empty()
        && trust_score > 0.8
        && matches!(
            key_security.key_exposure_risk,
            RiskRating::Low | RiskRating::Medium
        )
        && transaction_controls.control_strength != ControlStrength::Weak;

    let mut recommendations = Vec::new();
    if key_security.has_plaintext_keys {
        recommendations
            .push("CRITICAL: Implement secure key storage (TEE/encryption)".to_string());
    }
    if !transaction_controls.has_spending_limits {
        recommendations.push("CRITICAL: Add transaction spending limits".to_string());
    }
    if !capital_risk.max_loss_bounded {
        recommendations.push("HIGH: Implement maximum loss limits".to_string());
    }
    if !transaction_controls.emergency_stop_present {
        recommendations.push("MEDIUM: Add emergency stop mechanisms".to_string());
    }

    let recommendation = if can_trust_with_capital {
        Recommendation::Deploy
    } else if critical_vulnerabilities.is_empty() && trust_score > 0.5 {
        Recommendation::Caution
    } else {
        Recommendation::DoNotDeploy
    };

    let reasoning = trust_reasoning(trust_score, &critical_vulnerabilities);

    SecurityEvaluation {
        can_trust_with_capital,
        trust_score,
        key_security,
        transaction_controls,
        deception,
        capital_risk,
        critical_vulnerabilities,
        recommendations,
        confidence,
        reasoning,
        recommendation,
    }
}

fn trust_reasoning(trust_score: f64, criticals: &[String]) -> String {
    let mut parts = Vec::new();

    if trust_score > 0.9 {
        parts.push(format!(
            "Trust score {trust_score:.2}: high confidence for deployment."
        ));
    } else if trust_score > 0.7 {
        parts.push(format!(
            "Trust score {trust_score:.2}: acceptable with monitoring."
        ));
    } else {
        parts.push(format!(
            "Trust score {trust_score:.2}: not recommended for deployment."
        ));
    }

    if !criticals.is_empty() {
        parts.push(format!("Critical findings: {}.", criticals.join("; ")));
    }

    parts.join(" ")
}

fn weighted(primary: f64, secondary: f64, pw: f64, sw: f64) -> f64 {
    primary * pw + secondary * sw
}

fn union(primary: &[String], secondary: &[String]) -> Vec<String> {
    let mut out = primary.to_vec();
    for s in secondary {
        if !out.contains(s) {
            out.push(s.clone());
        }
    }
    out
}

/// Ensemble combination of two security evaluations: numeric fields are
/// weighted, findings take the primary, sets union, and the recommendation
/// collapses conservatively.
pub fn combine_security(
    primary: SecurityEvaluation,
    secondary: SecurityEvaluation,
    pw: f64,
    sw: f64,
) -> SecurityEvaluation {
    let recommendation = primary.recommendation.max(secondary.recommendation);

    SecurityEvaluation {
        // Both must trust for the ensemble to trust.
        can_trust_with_capital: primary.can_trust_with_capital
            && secondary.can_trust_with_capital,
        trust_score: weighted(primary.trust_score, secondary.trust_score, pw, sw),
        key_security: primary.key_security,
        transaction_controls: primary.transaction_controls,
        deception: primary.deception,
        capital_risk: primary.capital_risk,
        critical_vulnerabilities: union(
            &primary.critical_vulnerabilities,
            &secondary.critical_vulnerabilities,
        ),
        recommendations: union(&primary.recommendations, &secondary.recommendations),
        confidence: weighted(primary.confidence, secondary.confidence, pw, sw),
        reasoning: format!(
            "Ensemble evaluation.\n\nPrimary: {}\n\nSecondary: {}",
            primary.reasoning, secondary.reasoning
        ),
        recommendation,
    }
}

/// Ensemble combination of two comprehensive evaluations.
pub fn combine_comprehensive(
    primary: ComprehensiveEvaluation,
    secondary: ComprehensiveEvaluation,
    pw: f64,
    sw: f64,
) -> ComprehensiveEvaluation {
    let code_quality = CodeQuality {
        architecture_score: weighted(
            primary.code_quality.architecture_score,
            secondary.code_quality.architecture_score,
            pw,
            sw,
        ),
        error_handling_score: weighted(
            primary.code_quality.error_handling_score,
            secondary.code_quality.error_handling_score,
            pw,
            sw,
        ),
        security_practices_score: weighted(
            primary.code_quality.security_practices_score,
            secondary.code_quality.security_practices_score,
            pw,
            sw,
        ),
        maintainability_score: weighted(
            primary.code_quality.maintainability_score,
            secondary.code_quality.maintainability_score,
            pw,
            sw,
        ),
        test_coverage_score: weighted(
            primary.code_quality.test_coverage_score,
            secondary.code_quality.test_coverage_score,
            pw,
            sw,
        ),
        overall_score: weighted(
            primary.code_quality.overall_score,
            secondary.code_quality.overall_score,
            pw,
            sw,
        ),
        key_findings: union(
            &primary.code_quality.key_findings,
            &secondary.code_quality.key_findings,
        ),
    };

    let risk_assessment = RiskAssessment {
        volatility_sensitivity: weighted(
            primary.risk_assessment.volatility_sensitivity,
            secondary.risk_assessment.volatility_sensitivity,
            pw,
            sw,
        ),
        // String-enum field: primary wins.
        liquidity_requirements: primary.risk_assessment.liquidity_requirements.clone(),
        systemic_risk_score: weighted(
            primary.risk_assessment.systemic_risk_score,
            secondary.risk_assessment.systemic_risk_score,
            pw,
            sw,
        ),
        market_impact_score: weighted(
            primary.risk_assessment.market_impact_score,
            secondary.risk_assessment.market_impact_score,
            pw,
            sw,
        ),
        operational_risk_score: weighted(
            primary.risk_assessment.operational_risk_score,
            secondary.risk_assessment.operational_risk_score,
            pw,
            sw,
        ),
        regulatory_risk_score: weighted(
            primary.risk_assessment.regulatory_risk_score,
            secondary.risk_assessment.regulatory_risk_score,
            pw,
            sw,
        ),
    };

    let mut score_adjustments = BTreeMap::new();
    let keys: std::collections::BTreeSet<&String> = primary
        .score_adjustments
        .keys()
        .chain(secondary.score_adjustments.keys())
        .collect();
    for key in keys {
        let p = primary.score_adjustments.get(key).copied().unwrap_or(0.0);
        let s = secondary.score_adjustments.get(key).copied().unwrap_or(0.0);
        score_adjustments.insert(key.clone(), weighted(p, s, pw, sw));
    }

    ComprehensiveEvaluation {
        intent_classification: primary.intent_classification.clone(),
        code_quality,
        risk_assessment,
        behavioral_flags: union(&primary.behavioral_flags, &secondary.behavioral_flags),
        score_adjustments,
        confidence: weighted(primary.confidence, secondary.confidence, pw, sw),
        reasoning: format!(
            "Ensemble evaluation.\n\nPrimary: {}\n\nSecondary: {}",
            primary.reasoning, secondary.reasoning
        ),
    }
}
