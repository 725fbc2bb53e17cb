//! LLM-as-judge security review.
//!
//! Two entry points share context preparation, prompt construction, response
//! parsing and ensemble fusion: `evaluate_security` (four analyzers fused
//! into the trust-focused shape) and `evaluate_comprehensive` (one larger
//! prompt). Both are infallible: every provider or parse failure resolves to
//! the conservative fallback, never to a pipeline error.

pub mod analyzers;
pub mod context;
pub mod fusion;
pub mod models;
pub mod parse;
pub mod prompts;
pub mod providers;

use tracing::{info, warn};

use af_config::LlmSettings;
use af_scanner::ImageReport;

pub use context::EvaluationContext;
pub use fusion::calculate_trust_assessment;
pub use models::{
    CapitalRiskFindings, CodeQuality, ComprehensiveEvaluation, ControlStrength,
    DeceptionFindings, IntentClassification, KeySecurityFindings, Recommendation,
    RiskAssessment, RiskRating, SecurityEvaluation, TransactionControlFindings,
};
pub use providers::{AnthropicProvider, LlmProvider, OpenAiProvider, ProviderError};

/// Ensemble weights: primary 0.7, secondary 0.3.
const PRIMARY_WEIGHT: f64 = 0.7;
const SECONDARY_WEIGHT: f64 = 0.3;

/// Base confidence of a fully answered security analysis; each failed
/// analyzer takes a slice off.
const SECURITY_BASE_CONFIDENCE: f64 = 0.85;

/// The judge: a primary provider, an optional secondary, and the ensemble
/// switch.
pub struct LlmJudge {
    primary: Option<Box<dyn LlmProvider>>,
    secondary: Option<Box<dyn LlmProvider>>,
    enable_ensemble: bool,
}

impl LlmJudge {
    pub fn new(
        primary: Option<Box<dyn LlmProvider>>,
        secondary: Option<Box<dyn LlmProvider>>,
        enable_ensemble: bool,
    ) -> Self {
        Self {
            primary,
            secondary,
            enable_ensemble,
        }
    }

    /// Build providers from settings. A provider whose key is missing is
    /// simply absent; the judge degrades to fallback at call time.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let primary = providers::build_provider(&settings.primary_provider, settings);
        let secondary = settings
            .fallback_provider
            .as_deref()
            .and_then(|name| providers::build_provider(name, settings));

        Self {
            primary,
            secondary,
            enable_ensemble: settings.enable_ensemble,
        }
    }

    /// Trust-focused security evaluation.
    pub async fn evaluate_security(&self, report: &ImageReport) -> SecurityEvaluation {
        let ctx = EvaluationContext::from_report(report);

        let primary = match &self.primary {
            Some(p) => Some(self.security_with_provider(p.as_ref(), &ctx).await),
            None => None,
        };

        match primary {
            Some(result) => {
                if self.enable_ensemble {
                    if let Some(secondary) = &self.secondary {
                        let second = self.security_with_provider(secondary.as_ref(), &ctx).await;
                        info!("security ensemble evaluation completed");
                        return fusion::combine_security(
                            result,
                            second,
                            PRIMARY_WEIGHT,
                            SECONDARY_WEIGHT,
                        );
                    }
                }
                result
            }
            None => self.security_via_secondary(&ctx).await,
        }
    }

    /// Comprehensive evaluation (single larger prompt).
    pub async fn evaluate_comprehensive(&self, report: &ImageReport) -> ComprehensiveEvaluation {
        let ctx = EvaluationContext::from_report(report);
        let prompt = prompts::comprehensive_prompt(&ctx);

        let primary = match &self.primary {
            Some(p) => match p.call(&prompt).await {
                Ok(response) => match parse::parse_comprehensive(&response) {
                    Ok(eval) => Some(eval),
                    Err(e) => {
                        warn!(error = %e, "comprehensive response unreadable");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "primary provider failed");
                    None
                }
            },
            None => None,
        };

        match primary {
            Some(eval) => {
                if self.enable_ensemble {
                    if let Some(secondary) = &self.secondary {
                        if let Ok(response) = secondary.call(&prompt).await {
                            if let Ok(second) = parse::parse_comprehensive(&response) {
                                info!("comprehensive ensemble evaluation completed");
                                return fusion::combine_comprehensive(
                                    eval,
                                    second,
                                    PRIMARY_WEIGHT,
                                    SECONDARY_WEIGHT,
                                );
                            }
                        }
                        warn!("ensemble secondary failed, using primary result");
                    }
                }
                eval
            }
            None => self.comprehensive_via_secondary(&ctx, &prompt).await,
        }
    }

    async fn security_with_provider(
        &self,
        provider: &dyn LlmProvider,
        ctx: &EvaluationContext,
    ) -> SecurityEvaluation {
        let findings = analyzers::run_security_analyzers(provider, ctx).await;

        if findings.failed_analyzers == 4 {
            return SecurityEvaluation::fallback(&format!(
                "all analyzers failed on provider {}",
                provider.name()
            ));
        }

        let confidence =
            SECURITY_BASE_CONFIDENCE * (1.0 - findings.failed_analyzers as f64 * 0.2);

        fusion::calculate_trust_assessment(
            findings.key_security,
            findings.transaction_controls,
            findings.deception,
            findings.capital_risk,
            confidence,
        )
    }

    /// Primary unavailable: try the secondary once, else full fallback.
    async fn security_via_secondary(&self, ctx: &EvaluationContext) -> SecurityEvaluation {
        if let Some(secondary) = &self.secondary {
            warn!("primary provider unavailable, using secondary");
            return self.security_with_provider(secondary.as_ref(), ctx).await;
        }
        SecurityEvaluation::fallback("no usable provider")
    }

    async fn comprehensive_via_secondary(
        &self,
        _ctx: &EvaluationContext,
        prompt: &str,
    ) -> ComprehensiveEvaluation {
        if let Some(secondary) = &self.secondary {
            warn!("primary provider unavailable, using secondary");
            if let Ok(response) = secondary.call(prompt).await {
                if let Ok(eval) = parse::parse_comprehensive(&response) {
                    return eval;
                }
            }
        }
        ComprehensiveEvaluation::fallback("no usable provider")
    }
}
