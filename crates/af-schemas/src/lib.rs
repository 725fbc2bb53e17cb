//! Shared vocabulary types for the verification pipeline.
//!
//! This crate owns only the enums and error kinds that cross component
//! boundaries. Component-specific result types live with their components.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vulnerability severity as reported by the image scanner.
///
/// Ordering is by badness: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

/// Attestation trust level, ordered from most to least trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    High,
    Medium,
    Low,
    Untrusted,
}

impl TrustLevel {
    /// One step less trusted. `Untrusted` is a fixed point.
    pub fn downgraded(self) -> Self {
        match self {
            TrustLevel::High => TrustLevel::Medium,
            TrustLevel::Medium => TrustLevel::Low,
            TrustLevel::Low | TrustLevel::Untrusted => TrustLevel::Untrusted,
        }
    }

    /// The less trusted of `self` and `cap`.
    pub fn capped_at(self, cap: TrustLevel) -> Self {
        self.max(cap)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::High => "HIGH",
            TrustLevel::Medium => "MEDIUM",
            TrustLevel::Low => "LOW",
            TrustLevel::Untrusted => "UNTRUSTED",
        }
    }
}

/// Final verification verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Warning,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Passed => "PASSED",
            Verdict::Warning => "WARNING",
            Verdict::Failed => "FAILED",
        }
    }
}

/// Verification tier requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VerifyError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Tier::High),
            "medium" => Ok(Tier::Medium),
            "low" => Ok(Tier::Low),
            other => Err(VerifyError::Config {
                message: format!("invalid tier '{other}'. expected one of: high | medium | low"),
            }),
        }
    }
}

/// Typed failure kinds for verification stages.
///
/// Stage failures are values threaded into the Fort Score inputs, not
/// propagated exceptions; the orchestrator converts every stage outcome into
/// either its result type or one of these kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifyError {
    /// The image is not present locally; nothing downstream is meaningful.
    ImageNotFound { image: String },
    /// The external vulnerability scanner could not run.
    ScannerUnavailable { detail: String },
    /// The attestation evidence failed verification.
    AttestationInvalid { detail: String },
    /// Market-data coverage for the requested window fell below the floor.
    InsufficientData { coverage: f64 },
    /// The agent container ran but emitted no parseable trades.
    AgentProducedNoTrades { image: String },
    /// The agent container exceeded its hard timeout.
    AgentTimeout { seconds: u64 },
    /// No LLM provider produced a usable response.
    LlmUnavailable { detail: String },
    /// A provider responded but the payload could not be decoded.
    ProviderParseError { detail: String },
    /// A stage ran past its deadline.
    DeadlineExceeded { stage: String, seconds: u64 },
    /// The verification was cancelled while this stage was in flight.
    Cancelled { stage: String },
    /// Invalid or missing configuration.
    Config { message: String },
}

impl VerifyError {
    /// Short stable identifier used in audit payloads and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::ImageNotFound { .. } => "image_not_found",
            VerifyError::ScannerUnavailable { .. } => "scanner_unavailable",
            VerifyError::AttestationInvalid { .. } => "attestation_invalid",
            VerifyError::InsufficientData { .. } => "insufficient_data",
            VerifyError::AgentProducedNoTrades { .. } => "agent_produced_no_trades",
            VerifyError::AgentTimeout { .. } => "agent_timeout",
            VerifyError::LlmUnavailable { .. } => "llm_unavailable",
            VerifyError::ProviderParseError { .. } => "provider_parse_error",
            VerifyError::DeadlineExceeded { .. } => "deadline_exceeded",
            VerifyError::Cancelled { .. } => "cancelled",
            VerifyError::Config { .. } => "config_error",
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::ImageNotFound { image } => {
                write!(f, "image not found locally: {image}")
            }
            VerifyError::ScannerUnavailable { detail } => {
                write!(f, "scanner unavailable: {detail}")
            }
            VerifyError::AttestationInvalid { detail } => {
                write!(f, "attestation invalid: {detail}")
            }
            VerifyError::InsufficientData { coverage } => {
                write!(f, "insufficient market data: coverage {coverage:.2} < 0.50")
            }
            VerifyError::AgentProducedNoTrades { image } => {
                write!(f, "agent produced no trades: {image}")
            }
            VerifyError::AgentTimeout { seconds } => {
                write!(f, "agent timed out after {seconds}s")
            }
            VerifyError::LlmUnavailable { detail } => write!(f, "llm unavailable: {detail}"),
            VerifyError::ProviderParseError { detail } => {
                write!(f, "provider response parse failed: {detail}")
            }
            VerifyError::DeadlineExceeded { stage, seconds } => {
                write!(f, "stage '{stage}' exceeded {seconds}s deadline")
            }
            VerifyError::Cancelled { stage } => write!(f, "stage '{stage}' cancelled"),
            VerifyError::Config { message } => write!(f, "config error: {message}"),
        }
    }
}

impl std::error::Error for VerifyError {}
