//! TEE attestation validation.
//!
//! Parses a platform quote, checks its signature binding against configured
//! root material, reads the code identity out of the measurements, consults
//! the approved-code registry, and derives a trust level from a fixed table.
//!
//! Signatures never soft-pass: absent or unverifiable evidence is UNTRUSTED
//! unless simulation mode is explicitly enabled, and simulation caps trust
//! at LOW.

pub mod quote;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use af_config::TeeSettings;
use af_registry::{AgentStatus, CodeHashRegistry, RiskLevel};
use af_schemas::TrustLevel;

pub use quote::{QuoteDocument, TeePlatform};

/// The validated attestation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationResult {
    pub valid: bool,
    pub platform: TeePlatform,
    /// Platform-specific named measurements (hex strings).
    pub measurements: std::collections::BTreeMap<String, String>,
    pub quote: Option<quote::QuoteSummary>,
    pub trust_level: TrustLevel,
    /// Code identity read from the measurements, when present.
    pub code_hash: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AttestationResult {
    fn invalid(platform: TeePlatform, error: String) -> Self {
        Self {
            valid: false,
            platform,
            measurements: Default::default(),
            quote: None,
            trust_level: TrustLevel::Untrusted,
            code_hash: None,
            errors: vec![error],
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Attestation evidence handed to the validator.
#[derive(Debug, Clone)]
pub enum AttestationEvidence {
    /// A raw quote document (JSON).
    Quote(String),
    /// Simulation mode: synthesize a quote binding the given code hash.
    Simulated { code_hash: String },
    /// No evidence was obtainable for this image.
    None,
}

/// The validator. Holds settings and the trusted signer set loaded from the
/// configured root paths (one hex digest per line).
pub struct TeeValidator {
    settings: TeeSettings,
    trusted_signers: BTreeSet<String>,
}

impl TeeValidator {
    pub fn new(settings: TeeSettings) -> anyhow::Result<Self> {
        let mut trusted_signers = BTreeSet::new();
        for path in &settings.root_ca_paths {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("read root material {}: {e}", path.display()))?;
            for line in raw.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    trusted_signers.insert(line.to_ascii_lowercase());
                }
            }
        }

        Ok(Self {
            settings,
            trusted_signers,
        })
    }

    /// Validate evidence for `image` against the registry.
    pub fn validate(
        &self,
        image: &str,
        evidence: AttestationEvidence,
        registry: &CodeHashRegistry,
    ) -> AttestationResult {
        let doc = match evidence {
            AttestationEvidence::Quote(raw) => match quote::parse_quote(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    return AttestationResult::invalid(
                        TeePlatform::None,
                        format!("quote parse failed: {e}"),
                    )
                }
            },
            AttestationEvidence::Simulated { code_hash } => {
                if !self.settings.simulation_mode {
                    return AttestationResult::invalid(
                        TeePlatform::None,
                        "simulated evidence rejected: simulation mode is disabled".to_string(),
                    );
                }
                quote::simulated_quote(image, &code_hash)
            }
            AttestationEvidence::None => {
                return AttestationResult::invalid(
                    TeePlatform::None,
                    format!("no attestation evidence available for {image}"),
                )
            }
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Architecture gate: strict mode accepts x86 platforms only.
        if self.settings.strict_architecture
            && matches!(doc.platform, TeePlatform::ArmTrustZone)
        {
            return AttestationResult::invalid(
                doc.platform,
                "architecture mismatch: ARM quote rejected in strict mode".to_string(),
            );
        }

        // Timestamp skew is a warning, never a pass/fail substitute.
        let skew = (Utc::now() - doc.timestamp).num_seconds().abs();
        if skew > self.settings.max_timestamp_skew_seconds {
            warnings.push(format!(
                "quote timestamp skew {skew}s exceeds allowed {}s",
                self.settings.max_timestamp_skew_seconds
            ));
        }

        let simulated = matches!(doc.platform, TeePlatform::Simulated);
        let sig_valid = if simulated {
            // Simulated quotes carry no verifiable chain.
            self.settings.simulation_mode
        } else {
            self.signature_binding_valid(&doc)
        };
        if !sig_valid {
            errors.push("quote signature chain verification failed".to_string());
        }

        let code_hash = doc.code_identity();
        let lookup = code_hash.as_deref().map(|h| registry.verify(h));
        if let Some(l) = &lookup {
            warnings.extend(l.warnings.iter().cloned());
        }

        // Fixed trust table.
        let (mut trust_level, mut valid) = match (sig_valid, &lookup) {
            (false, _) => (TrustLevel::Untrusted, false),
            (true, Some(l)) => match &l.record {
                Some(r) => match (r.status, r.risk_level) {
                    (AgentStatus::Approved, RiskLevel::Low) => (TrustLevel::High, true),
                    (AgentStatus::Approved, RiskLevel::Medium) => (TrustLevel::Medium, true),
                    (AgentStatus::Approved, RiskLevel::High) => (TrustLevel::Low, true),
                    (AgentStatus::Pending, _) => (TrustLevel::Low, true),
                    (AgentStatus::Revoked, _) | (AgentStatus::Suspicious, _) => {
                        (TrustLevel::Untrusted, false)
                    }
                },
                None => (TrustLevel::Low, true),
            },
            (true, None) => {
                warnings.push("quote carries no code identity measurement".to_string());
                (TrustLevel::Low, true)
            }
        };

        if sig_valid && !valid {
            errors.push("code identity is revoked or flagged in the registry".to_string());
        }

        if simulated && valid {
            trust_level = trust_level.capped_at(TrustLevel::Low);
            warnings.push("simulation mode: trust capped at LOW".to_string());
        }

        // Invariant: invalid attestations are always UNTRUSTED.
        if !valid {
            trust_level = TrustLevel::Untrusted;
        }
        if trust_level == TrustLevel::Untrusted && valid {
            valid = false;
        }

        debug!(%image, trust = trust_level.as_str(), valid, "attestation validated");

        AttestationResult {
            valid,
            platform: doc.platform,
            measurements: doc.measurements.clone(),
            quote: Some(doc.summary()),
            trust_level,
            code_hash,
            errors,
            warnings,
            timestamp: Utc::now(),
        }
    }

    /// Format-level signature binding: the signer must be in the trusted set
    /// and the signature must bind the measurements and timestamp under that
    /// signer. Authoritative chain verification beyond this binding is
    /// delegated to the configured TEE provider tooling.
    fn signature_binding_valid(&self, doc: &QuoteDocument) -> bool {
        let signer = doc.signer_digest.to_ascii_lowercase();
        if !self.trusted_signers.contains(&signer) {
            return false;
        }
        doc.signature.eq_ignore_ascii_case(&expected_signature(doc))
    }
}

/// The deterministic binding a well-formed quote must carry:
/// sha256(signer || canonical-measurements || rfc3339-timestamp).
pub fn expected_signature(doc: &QuoteDocument) -> String {
    let measurements =
        serde_json::to_string(&doc.measurements).expect("measurement map must serialize");
    let mut hasher = Sha256::new();
    hasher.update(doc.signer_digest.to_ascii_lowercase().as_bytes());
    hasher.update(measurements.as_bytes());
    hasher.update(
        doc.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .as_bytes(),
    );
    hex::encode(hasher.finalize())
}
