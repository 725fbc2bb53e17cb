//! Prompt templates for the security analyzers and the comprehensive
//! evaluation. Each prompt pins the exact JSON schema the parser expects.

use crate::context::EvaluationContext;

pub fn key_security_prompt(ctx: &EvaluationContext) -> String {
    format!(
        "You are a security auditor reviewing a containerized trading agent for \
private-key handling risks.\n\n## Agent Context\n{}\n\
## Task\nAssess how the agent generates, stores and uses private keys.\n\n\
Return ONLY a fenced JSON block with this exact shape:\n```json\n{{\n  \
\"has_plaintext_keys\": false,\n  \"key_generation_secure\": false,\n  \
\"key_storage_encrypted\": false,\n  \"key_rotation_implemented\": false,\n  \
\"key_exposure_risk\": \"low|medium|high|critical\",\n  \
\"security_concerns\": [\"...\"],\n  \"code_references\": [\"...\"]\n}}\n```",
        ctx.render()
    )
}

pub fn transaction_control_prompt(ctx: &EvaluationContext) -> String {
    format!(
        "You are a security auditor reviewing a containerized trading agent for \
transaction authorization controls.\n\n## Agent Context\n{}\n\
## Task\nAssess spending limits, approval mechanisms, emergency stops, \
cross-chain controls and transaction monitoring.\n\n\
Return ONLY a fenced JSON block with this exact shape:\n```json\n{{\n  \
\"has_spending_limits\": false,\n  \"has_approval_mechanisms\": false,\n  \
\"emergency_stop_present\": false,\n  \"cross_chain_controls\": false,\n  \
\"transaction_monitoring\": false,\n  \
\"control_strength\": \"weak|moderate|strong\",\n  \"control_gaps\": [\"...\"]\n}}\n```",
        ctx.render()
    )
}

pub fn deception_prompt(ctx: &EvaluationContext) -> String {
    format!(
        "You are a security auditor hunting for deceptive or malicious patterns in \
a containerized trading agent.\n\n## Agent Context\n{}\n\
## Task\nLook for backdoors, time bombs, obfuscation, data exfiltration and \
environment-dependent behavior.\n\n\
Return ONLY a fenced JSON block with this exact shape:\n```json\n{{\n  \
\"backdoor_detected\": false,\n  \"time_bomb_detected\": false,\n  \
\"obfuscated_code_found\": false,\n  \"data_exfiltration_risk\": false,\n  \
\"environment_specific_behavior\": false,\n  \
\"deception_indicators\": [\"...\"],\n  \
\"risk_level\": \"low|medium|high|critical\"\n}}\n```",
        ctx.render()
    )
}

pub fn capital_risk_prompt(ctx: &EvaluationContext) -> String {
    format!(
        "You are a risk officer assessing whether a containerized trading agent can \
be trusted with capital.\n\n## Agent Context\n{}\n\
## Task\nAssess loss bounds, position sizing, stop losses, leverage controls \
and flash-loan usage.\n\n\
Return ONLY a fenced JSON block with this exact shape:\n```json\n{{\n  \
\"max_loss_bounded\": false,\n  \"position_size_controls\": false,\n  \
\"stop_loss_implemented\": false,\n  \"leverage_controls\": false,\n  \
\"flash_loan_usage\": true,\n  \"risk_controls_adequate\": false,\n  \
\"estimated_max_loss\": \"bounded|portfolio_percentage|unlimited\"\n}}\n```",
        ctx.render()
    )
}

pub fn comprehensive_prompt(ctx: &EvaluationContext) -> String {
    format!(
        "You are an expert evaluating autonomous trading agents for protocol \
operators making deployment decisions.\n\n## Agent Context\n{}\n\
## Task\nProvide intent classification, code-quality scores, a contextual risk \
assessment, behavioral flags, and bounded score adjustments (-30 to +30 per \
category).\n\n\
Return ONLY a fenced JSON block with this exact shape:\n```json\n{{\n  \
\"intent_classification\": {{\n    \"primary_strategy\": \"arbitrage\",\n    \
\"risk_profile\": \"conservative|moderate|aggressive\",\n    \
\"complexity_score\": 0.0,\n    \"confidence\": 0.0\n  }},\n  \
\"code_quality\": {{\n    \"architecture_score\": 0.0,\n    \
\"error_handling_score\": 0.0,\n    \"security_practices_score\": 0.0,\n    \
\"maintainability_score\": 0.0,\n    \"test_coverage_score\": 0.0,\n    \
\"overall_score\": 0.0,\n    \"key_findings\": [\"...\"]\n  }},\n  \
\"risk_assessment\": {{\n    \"volatility_sensitivity\": 0.0,\n    \
\"liquidity_requirements\": \"low|medium|high\",\n    \
\"systemic_risk_score\": 0.0,\n    \"market_impact_score\": 0.0,\n    \
\"operational_risk_score\": 0.0,\n    \"regulatory_risk_score\": 0.0\n  }},\n  \
\"behavioral_flags\": [\"...\"],\n  \"score_adjustments\": {{\n    \
\"innovative_strategy\": 0.0,\n    \"risk_management\": 0.0,\n    \
\"code_architecture\": 0.0,\n    \"market_impact\": 0.0\n  }},\n  \
\"confidence_level\": 0.0,\n  \"reasoning\": \"...\"\n}}\n```",
        ctx.render()
    )
}
