//! Quote document model and parsing.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// TEE platforms recognized by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeePlatform {
    #[serde(rename = "Intel TDX")]
    IntelTdx,
    #[serde(rename = "Intel SGX")]
    IntelSgx,
    #[serde(rename = "AMD SEV")]
    AmdSev,
    #[serde(rename = "ARM TrustZone")]
    ArmTrustZone,
    Simulated,
    None,
}

impl TeePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeePlatform::IntelTdx => "Intel TDX",
            TeePlatform::IntelSgx => "Intel SGX",
            TeePlatform::AmdSev => "AMD SEV",
            TeePlatform::ArmTrustZone => "ARM TrustZone",
            TeePlatform::Simulated => "Simulated",
            TeePlatform::None => "None",
        }
    }
}

/// A parsed attestation quote.
///
/// Measurement names are platform-specific: SGX quotes carry
/// `mrenclave`/`mrsigner`, TDX quotes `mr_td` and `rtmr0..rtmr3`. The code
/// identity is the enclave-content measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteDocument {
    pub version: u32,
    pub platform: TeePlatform,
    pub timestamp: DateTime<Utc>,
    /// Hex digest of the signing key, matched against the trusted roots.
    pub signer_digest: String,
    /// Hex signature binding signer, measurements and timestamp.
    pub signature: String,
    pub measurements: BTreeMap<String, String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub platform_info: Option<String>,
}

/// The quote fields surfaced on the attestation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    pub nonce: Option<String>,
    pub platform_info: Option<String>,
}

impl QuoteDocument {
    /// The measurement naming the attested code, per platform convention.
    pub fn code_identity(&self) -> Option<String> {
        self.measurements
            .get("mrenclave")
            .or_else(|| self.measurements.get("mr_td"))
            .or_else(|| self.measurements.get("code_hash"))
            .cloned()
    }

    pub fn summary(&self) -> QuoteSummary {
        QuoteSummary {
            version: self.version,
            timestamp: self.timestamp,
            signature: self.signature.clone(),
            nonce: self.nonce.clone(),
            platform_info: self.platform_info.clone(),
        }
    }
}

/// Parse a quote document from its JSON form.
pub fn parse_quote(raw: &str) -> Result<QuoteDocument> {
    serde_json::from_str(raw).context("decode quote document")
}

/// Synthesize a simulation-mode quote binding `code_hash` for `image`.
///
/// Deterministic for a given (image, code_hash) pair apart from the
/// timestamp, which is the synthesis time.
pub fn simulated_quote(image: &str, code_hash: &str) -> QuoteDocument {
    let mut measurements = BTreeMap::new();
    measurements.insert("mrenclave".to_string(), code_hash.to_string());
    measurements.insert(
        "mrsigner".to_string(),
        hex_digest(&format!("simulated-signer:{image}")),
    );

    QuoteDocument {
        version: 4,
        platform: TeePlatform::Simulated,
        timestamp: Utc::now(),
        signer_digest: hex_digest("simulated-root"),
        signature: hex_digest(&format!("simulated-signature:{image}:{code_hash}")),
        measurements,
        nonce: Some(hex_digest(image)[..16].to_string()),
        platform_info: Some("simulated".to_string()),
    }
}

fn hex_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_json_roundtrip() {
        let doc = simulated_quote("acme/agent:1", "cafe");
        let raw = serde_json::to_string(&doc).unwrap();
        let parsed = parse_quote(&raw).unwrap();
        assert_eq!(doc, parsed);
    }

    #[test]
    fn code_identity_prefers_mrenclave() {
        let doc = simulated_quote("acme/agent:1", "cafe");
        assert_eq!(doc.code_identity().as_deref(), Some("cafe"));
    }

    #[test]
    fn platform_serializes_with_vendor_names() {
        let s = serde_json::to_string(&TeePlatform::IntelTdx).unwrap();
        assert_eq!(s, "\"Intel TDX\"");
    }

    #[test]
    fn malformed_quote_is_an_error() {
        assert!(parse_quote("{\"version\": \"x\"}").is_err());
    }
}
