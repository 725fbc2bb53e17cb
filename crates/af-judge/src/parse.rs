//! Response decoding with per-field conservative defaults.
//!
//! The model is asked for a fenced JSON block; anything missing or
//! malformed at the field level falls back to the pessimistic value for
//! that field, and an unparseable payload falls back to the analyzer's
//! conservative result at the caller.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::models::{
    CapitalRiskFindings, CodeQuality, ComprehensiveEvaluation, ControlStrength,
    DeceptionFindings, IntentClassification, KeySecurityFindings, RiskAssessment, RiskRating,
    TransactionControlFindings,
};

/// Extract the JSON payload from a model response: the first fenced
/// ```json block when present, otherwise the whole response.
pub fn extract_json(response: &str) -> Result<Value> {
    let candidate = match response.find("```json") {
        Some(start) => {
            let body = &response[start + 7..];
            let end = body
                .find("```")
                .ok_or_else(|| anyhow!("unterminated json fence"))?;
            body[..end].trim()
        }
        None => response.trim(),
    };

    serde_json::from_str(candidate).map_err(|e| anyhow!("response is not valid json: {e}"))
}

fn get_bool(v: &Value, key: &str, default: bool) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn get_f64(v: &Value, key: &str, default: f64) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn get_string(v: &Value, key: &str, default: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn get_strings(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn rating(v: &Value, key: &str, default: RiskRating) -> RiskRating {
    match v.get(key).and_then(Value::as_str) {
        Some("low") => RiskRating::Low,
        Some("medium") => RiskRating::Medium,
        Some("high") => RiskRating::High,
        Some("critical") => RiskRating::Critical,
        _ => default,
    }
}

pub fn parse_key_security(response: &str) -> Result<KeySecurityFindings> {
    let v = extract_json(response)?;
    Ok(KeySecurityFindings {
        has_plaintext_keys: get_bool(&v, "has_plaintext_keys", true),
        key_generation_secure: get_bool(&v, "key_generation_secure", false),
        key_storage_encrypted: get_bool(&v, "key_storage_encrypted", false),
        key_rotation_implemented: get_bool(&v, "key_rotation_implemented", false),
        key_exposure_risk: rating(&v, "key_exposure_risk", RiskRating::High),
        security_concerns: get_strings(&v, "security_concerns"),
        code_references: get_strings(&v, "code_references"),
    })
}

pub fn parse_transaction_controls(response: &str) -> Result<TransactionControlFindings> {
    let v = extract_json(response)?;
    let control_strength = match v.get("control_strength").and_then(Value::as_str) {
        Some("strong") => ControlStrength::Strong,
        Some("moderate") => ControlStrength::Moderate,
        _ => ControlStrength::Weak,
    };

    Ok(TransactionControlFindings {
        has_spending_limits: get_bool(&v, "has_spending_limits", false),
        has_approval_mechanisms: get_bool(&v, "has_approval_mechanisms", false),
        emergency_stop_present: get_bool(&v, "emergency_stop_present", false),
        cross_chain_controls: get_bool(&v, "cross_chain_controls", false),
        transaction_monitoring: get_bool(&v, "transaction_monitoring", false),
        control_strength,
        control_gaps: get_strings(&v, "control_gaps"),
    })
}

pub fn parse_deception(response: &str) -> Result<DeceptionFindings> {
    let v = extract_json(response)?;
    Ok(DeceptionFindings {
        backdoor_detected: get_bool(&v, "backdoor_detected", false),
        time_bomb_detected: get_bool(&v, "time_bomb_detected", false),
        obfuscated_code_found: get_bool(&v, "obfuscated_code_found", false),
        data_exfiltration_risk: get_bool(&v, "data_exfiltration_risk", false),
        environment_specific_behavior: get_bool(&v, "environment_specific_behavior", false),
        deception_indicators: get_strings(&v, "deception_indicators"),
        risk_level: rating(&v, "risk_level", RiskRating::Medium),
    })
}

pub fn parse_capital_risk(response: &str) -> Result<CapitalRiskFindings> {
    let v = extract_json(response)?;
    Ok(CapitalRiskFindings {
        max_loss_bounded: get_bool(&v, "max_loss_bounded", false),
        position_size_controls: get_bool(&v, "position_size_controls", false),
        stop_loss_implemented: get_bool(&v, "stop_loss_implemented", false),
        leverage_controls: get_bool(&v, "leverage_controls", false),
        flash_loan_usage: get_bool(&v, "flash_loan_usage", true),
        risk_controls_adequate: get_bool(&v, "risk_controls_adequate", false),
        estimated_max_loss: get_string(&v, "estimated_max_loss", "unlimited"),
    })
}

pub fn parse_comprehensive(response: &str) -> Result<ComprehensiveEvaluation> {
    let v = extract_json(response)?;

    let empty = Value::Object(Default::default());
    let intent = v.get("intent_classification").unwrap_or(&empty);
    let quality = v.get("code_quality").unwrap_or(&empty);
    let risk = v.get("risk_assessment").unwrap_or(&empty);

    let mut score_adjustments = BTreeMap::new();
    if let Some(map) = v.get("score_adjustments").and_then(Value::as_object) {
        for (k, adj) in map {
            if let Some(n) = adj.as_f64() {
                score_adjustments.insert(k.clone(), n);
            }
        }
    }

    Ok(ComprehensiveEvaluation {
        intent_classification: IntentClassification {
            primary_strategy: get_string(intent, "primary_strategy", "unknown"),
            risk_profile: get_string(intent, "risk_profile", "conservative"),
            complexity_score: get_f64(intent, "complexity_score", 0.5),
            confidence: get_f64(intent, "confidence", 0.3),
        },
        code_quality: CodeQuality {
            architecture_score: get_f64(quality, "architecture_score", 0.5),
            error_handling_score: get_f64(quality, "error_handling_score", 0.5),
            security_practices_score: get_f64(quality, "security_practices_score", 0.5),
            maintainability_score: get_f64(quality, "maintainability_score", 0.5),
            test_coverage_score: get_f64(quality, "test_coverage_score", 0.5),
            overall_score: get_f64(quality, "overall_score", 0.5),
            key_findings: get_strings(quality, "key_findings"),
        },
        risk_assessment: RiskAssessment {
            volatility_sensitivity: get_f64(risk, "volatility_sensitivity", 0.7),
            liquidity_requirements: get_string(risk, "liquidity_requirements", "high"),
            systemic_risk_score: get_f64(risk, "systemic_risk_score", 0.8),
            market_impact_score: get_f64(risk, "market_impact_score", 0.6),
            operational_risk_score: get_f64(risk, "operational_risk_score", 0.7),
            regulatory_risk_score: get_f64(risk, "regulatory_risk_score", 0.8),
        },
        behavioral_flags: get_strings(&v, "behavioral_flags"),
        score_adjustments,
        confidence: get_f64(&v, "confidence_level", 0.5),
        reasoning: get_string(&v, "reasoning", ""),
    })
}
