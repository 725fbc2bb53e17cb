//! Judge result shapes.
//!
//! Two result families are consumed by the score engine: the trust-focused
//! security shape and the comprehensive shape. Every field set here has a
//! conservative worst-case default used when analysis fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Deployment recommendation, ordered from permissive to conservative so the
/// ensemble can collapse by `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Deploy,
    Caution,
    DoNotDeploy,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Deploy => "DEPLOY",
            Recommendation::Caution => "CAUTION",
            Recommendation::DoNotDeploy => "DO_NOT_DEPLOY",
        }
    }
}

/// Qualitative risk rating used by several analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRating {
    Low,
    Medium,
    High,
    Critical,
}

/// Transaction-control strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStrength {
    Weak,
    Moderate,
    Strong,
}

/// Private-key handling findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySecurityFindings {
    pub has_plaintext_keys: bool,
    pub key_generation_secure: bool,
    pub key_storage_encrypted: bool,
    pub key_rotation_implemented: bool,
    pub key_exposure_risk: RiskRating,
    pub security_concerns: Vec<String>,
    pub code_references: Vec<String>,
}

impl KeySecurityFindings {
    /// Worst-case defaults for failed analysis.
    pub fn conservative() -> Self {
        Self {
            has_plaintext_keys: true,
            key_generation_secure: false,
            key_storage_encrypted: false,
            key_rotation_implemented: false,
            key_exposure_risk: RiskRating::Critical,
            security_concerns: vec![
                "Analysis failed - manual security review required".to_string()
            ],
            code_references: Vec::new(),
        }
    }
}

/// Transaction authorization findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionControlFindings {
    pub has_spending_limits: bool,
    pub has_approval_mechanisms: bool,
    pub emergency_stop_present: bool,
    pub cross_chain_controls: bool,
    pub transaction_monitoring: bool,
    pub control_strength: ControlStrength,
    pub control_gaps: Vec<String>,
}

impl TransactionControlFindings {
    pub fn conservative() -> Self {
        Self {
            has_spending_limits: false,
            has_approval_mechanisms: false,
            emergency_stop_present: false,
            cross_chain_controls: false,
            transaction_monitoring: false,
            control_strength: ControlStrength::Weak,
            control_gaps: vec!["Analysis failed - manual review required".to_string()],
        }
    }
}

/// Deception and malicious-pattern findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeceptionFindings {
    pub backdoor_detected: bool,
    pub time_bomb_detected: bool,
    pub obfuscated_code_found: bool,
    pub data_exfiltration_risk: bool,
    pub environment_specific_behavior: bool,
    pub deception_indicators: Vec<String>,
    pub risk_level: RiskRating,
}

impl DeceptionFindings {
    pub fn conservative() -> Self {
        Self {
            // Nothing was detected, but absence of analysis is not absence
            // of risk: the uncertain flags go pessimistic.
            backdoor_detected: false,
            time_bomb_detected: false,
            obfuscated_code_found: true,
            data_exfiltration_risk: true,
            environment_specific_behavior: true,
            deception_indicators: vec![
                "Analysis failed - comprehensive manual review required".to_string(),
            ],
            risk_level: RiskRating::High,
        }
    }
}

/// Capital-risk findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalRiskFindings {
    pub max_loss_bounded: bool,
    pub position_size_controls: bool,
    pub stop_loss_implemented: bool,
    pub leverage_controls: bool,
    pub flash_loan_usage: bool,
    pub risk_controls_adequate: bool,
    pub estimated_max_loss: String,
}

impl CapitalRiskFindings {
    pub fn conservative() -> Self {
        Self {
            max_loss_bounded: false,
            position_size_controls: false,
            stop_loss_implemented: false,
            leverage_controls: false,
            flash_loan_usage: true,
            risk_controls_adequate: false,
            estimated_max_loss: "unlimited".to_string(),
        }
    }
}

/// Trust-focused security evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvaluation {
    pub can_trust_with_capital: bool,
    /// 0.0..=1.0.
    pub trust_score: f64,
    pub key_security: KeySecurityFindings,
    pub transaction_controls: TransactionControlFindings,
    pub deception: DeceptionFindings,
    pub capital_risk: CapitalRiskFindings,
    pub critical_vulnerabilities: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub recommendation: Recommendation,
}

impl SecurityEvaluation {
    /// The full fallback result: worst-case everywhere, never trusted.
    pub fn fallback(reason: &str) -> Self {
        Self {
            can_trust_with_capital: false,
            trust_score: 0.0,
            key_security: KeySecurityFindings::conservative(),
            transaction_controls: TransactionControlFindings::conservative(),
            deception: DeceptionFindings::conservative(),
            capital_risk: CapitalRiskFindings::conservative(),
            critical_vulnerabilities: vec![
                "Security analysis failed - comprehensive manual review required".to_string(),
            ],
            recommendations: vec!["Do not deploy before a manual security review".to_string()],
            // The security shape reports zero confidence when analysis
            // failed; the comprehensive fallback keeps 0.1.
            confidence: 0.0,
            reasoning: format!(
                "Security evaluation unavailable ({reason}). Conservative assessment applied."
            ),
            recommendation: Recommendation::DoNotDeploy,
        }
    }
}

/// Intent classification (comprehensive shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub primary_strategy: String,
    pub risk_profile: String,
    pub complexity_score: f64,
    pub confidence: f64,
}

/// Code-quality scores (comprehensive shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeQuality {
    pub architecture_score: f64,
    pub error_handling_score: f64,
    pub security_practices_score: f64,
    pub maintainability_score: f64,
    pub test_coverage_score: f64,
    pub overall_score: f64,
    pub key_findings: Vec<String>,
}

/// Contextual risk assessment (comprehensive shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub volatility_sensitivity: f64,
    pub liquidity_requirements: String,
    pub systemic_risk_score: f64,
    pub market_impact_score: f64,
    pub operational_risk_score: f64,
    pub regulatory_risk_score: f64,
}

/// Comprehensive evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveEvaluation {
    pub intent_classification: IntentClassification,
    pub code_quality: CodeQuality,
    pub risk_assessment: RiskAssessment,
    pub behavioral_flags: Vec<String>,
    /// category -> bounded adjustment.
    pub score_adjustments: BTreeMap<String, f64>,
    pub confidence: f64,
    pub reasoning: String,
}

impl ComprehensiveEvaluation {
    /// Conservative fallback: neutral quality, elevated risk, no
    /// adjustments, near-zero confidence.
    pub fn fallback(reason: &str) -> Self {
        Self {
            intent_classification: IntentClassification {
                primary_strategy: "unknown".to_string(),
                risk_profile: "conservative".to_string(),
                complexity_score: 0.5,
                confidence: 0.3,
            },
            code_quality: CodeQuality {
                architecture_score: 0.5,
                error_handling_score: 0.5,
                security_practices_score: 0.5,
                maintainability_score: 0.5,
                test_coverage_score: 0.5,
                overall_score: 0.5,
                key_findings: vec![
                    "LLM evaluation unavailable - manual review recommended".to_string(),
                ],
            },
            risk_assessment: RiskAssessment {
                volatility_sensitivity: 0.7,
                liquidity_requirements: "high".to_string(),
                systemic_risk_score: 0.8,
                market_impact_score: 0.6,
                operational_risk_score: 0.7,
                regulatory_risk_score: 0.8,
            },
            behavioral_flags: vec![
                "LLM evaluation failed - requires manual review".to_string(),
            ],
            score_adjustments: BTreeMap::new(),
            confidence: 0.1,
            reasoning: format!(
                "LLM evaluation unavailable ({reason}). Conservative assessment applied."
            ),
        }
    }
}
