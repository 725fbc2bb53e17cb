//! Attestation evidence acquisition.
//!
//! How evidence is obtained differs by deployment (simulation vs. a real
//! quote channel), so the pipeline asks through this seam.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::warn;

use af_registry::CodeHashRegistry;
use af_tee::AttestationEvidence;

#[async_trait::async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn evidence_for(&self, image: &str) -> AttestationEvidence;
}

/// Simulation-mode source: binds the image's layer-digest code hash into a
/// synthesized quote. Outside simulation mode it yields no evidence, which
/// the validator reports as UNTRUSTED.
pub struct DockerHashEvidence {
    registry: Arc<CodeHashRegistry>,
    simulation_mode: bool,
    /// Development mode: register unseen local images as pending.
    auto_register: bool,
}

impl DockerHashEvidence {
    pub fn new(registry: Arc<CodeHashRegistry>, simulation_mode: bool, auto_register: bool) -> Self {
        Self {
            registry,
            simulation_mode,
            auto_register,
        }
    }
}

#[async_trait::async_trait]
impl EvidenceSource for DockerHashEvidence {
    async fn evidence_for(&self, image: &str) -> AttestationEvidence {
        if !self.simulation_mode {
            return AttestationEvidence::None;
        }

        let code_hash = match self.registry.calculate_hash(image).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(%image, error = %e, "layer hash unavailable, hashing the reference");
                let mut hasher = Sha256::new();
                hasher.update(image.as_bytes());
                hex::encode(hasher.finalize())
            }
        };

        if self.auto_register {
            if let Err(e) = self.registry.auto_register(image, &code_hash) {
                warn!(%image, error = %e, "auto-registration failed");
            }
        }

        AttestationEvidence::Simulated { code_hash }
    }
}

/// Test source returning a preconfigured evidence value.
pub struct FixedEvidence(pub AttestationEvidence);

#[async_trait::async_trait]
impl EvidenceSource for FixedEvidence {
    async fn evidence_for(&self, _image: &str) -> AttestationEvidence {
        self.0.clone()
    }
}
