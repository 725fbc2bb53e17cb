//! The four security analyzers.
//!
//! Each analyzer owns one prompt and one response shape. A provider or parse
//! failure yields that analyzer's conservative findings; the failure count is
//! reported back so the judge can scale its confidence.

use tracing::warn;

use crate::context::EvaluationContext;
use crate::models::{
    CapitalRiskFindings, DeceptionFindings, KeySecurityFindings, TransactionControlFindings,
};
use crate::parse;
use crate::prompts;
use crate::providers::LlmProvider;

/// Findings from all four analyzers plus how many fell back.
pub struct AnalyzerFindings {
    pub key_security: KeySecurityFindings,
    pub transaction_controls: TransactionControlFindings,
    pub deception: DeceptionFindings,
    pub capital_risk: CapitalRiskFindings,
    pub failed_analyzers: usize,
}

/// Run the four analyzers against one provider.
pub async fn run_security_analyzers(
    provider: &dyn LlmProvider,
    ctx: &EvaluationContext,
) -> AnalyzerFindings {
    let mut failed = 0usize;

    let key_security = match provider.call(&prompts::key_security_prompt(ctx)).await {
        Ok(response) => parse::parse_key_security(&response).unwrap_or_else(|e| {
            warn!(analyzer = "key_security", error = %e, "parse failed");
            failed += 1;
            KeySecurityFindings::conservative()
        }),
        Err(e) => {
            warn!(analyzer = "key_security", error = %e, "provider call failed");
            failed += 1;
            KeySecurityFindings::conservative()
        }
    };

    let transaction_controls = match provider
        .call(&prompts::transaction_control_prompt(ctx))
        .await
    {
        Ok(response) => parse::parse_transaction_controls(&response).unwrap_or_else(|e| {
            warn!(analyzer = "transaction_controls", error = %e, "parse failed");
            failed += 1;
            TransactionControlFindings::conservative()
        }),
        Err(e) => {
            warn!(analyzer = "transaction_controls", error = %e, "provider call failed");
            failed += 1;
            TransactionControlFindings::conservative()
        }
    };

    let deception = match provider.call(&prompts::deception_prompt(ctx)).await {
        Ok(response) => parse::parse_deception(&response).unwrap_or_else(|e| {
            warn!(analyzer = "deception", error = %e, "parse failed");
            failed += 1;
            DeceptionFindings::conservative()
        }),
        Err(e) => {
            warn!(analyzer = "deception", error = %e, "provider call failed");
            failed += 1;
            DeceptionFindings::conservative()
        }
    };

    let capital_risk = match provider.call(&prompts::capital_risk_prompt(ctx)).await {
        Ok(response) => parse::parse_capital_risk(&response).unwrap_or_else(|e| {
            warn!(analyzer = "capital_risk", error = %e, "parse failed");
            failed += 1;
            CapitalRiskFindings::conservative()
        }),
        Err(e) => {
            warn!(analyzer = "capital_risk", error = %e, "provider call failed");
            failed += 1;
            CapitalRiskFindings::conservative()
        }
    };

    AnalyzerFindings {
        key_security,
        transaction_controls,
        deception,
        capital_risk,
        failed_analyzers: failed,
    }
}
