//! Approved-code registry: `code_hash -> ApprovedAgent`.
//!
//! The registry is the trust anchor consulted by attestation validation. It
//! is persisted as a single JSON snapshot replaced atomically on every
//! mutation; records are never deleted implicitly, only status-changed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// Lifecycle status of an approved-agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Approved,
    Pending,
    Revoked,
    Suspicious,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Approved => "approved",
            AgentStatus::Pending => "pending",
            AgentStatus::Revoked => "revoked",
            AgentStatus::Suspicious => "suspicious",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(AgentStatus::Approved),
            "pending" => Ok(AgentStatus::Pending),
            "revoked" => Ok(AgentStatus::Revoked),
            "suspicious" => Ok(AgentStatus::Suspicious),
            other => Err(anyhow!("invalid agent status '{other}'")),
        }
    }
}

/// Operator-declared risk band for an approved agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One registry record, keyed by code hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedAgent {
    pub code_hash: String,
    pub image_tag: String,
    pub name: String,
    pub description: String,
    pub status: AgentStatus,
    pub risk_level: RiskLevel,
    pub capabilities: BTreeSet<String>,
    pub approved_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of a registry lookup.
#[derive(Debug, Clone)]
pub struct VerifyLookup {
    pub approved: bool,
    pub record: Option<ApprovedAgent>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    agents: BTreeMap<String, ApprovedAgent>,
}

/// The registry. Single writer per code hash is enforced by the internal
/// mutex; readers observe a consistent snapshot because the backing file is
/// only ever replaced by rename.
pub struct CodeHashRegistry {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, ApprovedAgent>>,
}

impl CodeHashRegistry {
    /// Open the registry, loading the snapshot if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let agents = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let snap: Snapshot = serde_json::from_str(&raw)
                    .with_context(|| format!("parse registry {}", path.display()))?;
                snap.agents
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("read registry {}", path.display())),
        };

        Ok(Self {
            path,
            inner: Mutex::new(agents),
        })
    }

    /// Look up a presented code hash.
    ///
    /// `approved` is true only for records in `Approved` status; other
    /// statuses and unknown hashes come back with an explanatory warning.
    pub fn verify(&self, code_hash: &str) -> VerifyLookup {
        let agents = self.inner.lock().expect("registry lock poisoned");

        match agents.get(code_hash) {
            Some(record) => {
                let mut warnings = Vec::new();
                let approved = match record.status {
                    AgentStatus::Approved => true,
                    AgentStatus::Pending => {
                        warnings.push(format!(
                            "code hash {code_hash} is pending operator approval"
                        ));
                        false
                    }
                    AgentStatus::Revoked => {
                        warnings.push(format!("code hash {code_hash} has been revoked"));
                        false
                    }
                    AgentStatus::Suspicious => {
                        warnings.push(format!("code hash {code_hash} is flagged suspicious"));
                        false
                    }
                };
                VerifyLookup {
                    approved,
                    record: Some(record.clone()),
                    warnings,
                }
            }
            None => VerifyLookup {
                approved: false,
                record: None,
                warnings: vec![format!("code hash {code_hash} not present in registry")],
            },
        }
    }

    /// Insert or replace a record and persist the snapshot.
    pub fn add(&self, record: ApprovedAgent) -> Result<()> {
        let mut agents = self.inner.lock().expect("registry lock poisoned");
        agents.insert(record.code_hash.clone(), record);
        self.persist(&agents)
    }

    /// Change the status of an existing record and persist.
    pub fn update_status(&self, code_hash: &str, status: AgentStatus) -> Result<()> {
        let mut agents = self.inner.lock().expect("registry lock poisoned");
        let record = agents
            .get_mut(code_hash)
            .ok_or_else(|| anyhow!("unknown code hash: {code_hash}"))?;
        record.status = status;
        self.persist(&agents)
    }

    /// All records, ordered by code hash.
    pub fn list(&self) -> Vec<ApprovedAgent> {
        let agents = self.inner.lock().expect("registry lock poisoned");
        agents.values().cloned().collect()
    }

    /// Development-mode helper: register a locally present image as pending
    /// unless its hash is already known.
    pub fn auto_register(&self, image_tag: &str, code_hash: &str) -> Result<bool> {
        let mut agents = self.inner.lock().expect("registry lock poisoned");
        if agents.contains_key(code_hash) {
            return Ok(false);
        }

        info!(image = %image_tag, "auto-registering local image as pending");
        agents.insert(
            code_hash.to_string(),
            ApprovedAgent {
                code_hash: code_hash.to_string(),
                image_tag: image_tag.to_string(),
                name: image_tag.to_string(),
                description: "auto-discovered local image".to_string(),
                status: AgentStatus::Pending,
                risk_level: RiskLevel::High,
                capabilities: BTreeSet::new(),
                approved_at: Utc::now(),
                metadata: BTreeMap::new(),
            },
        );
        self.persist(&agents)?;
        Ok(true)
    }

    /// Compute the code hash of a locally present image by inspecting its
    /// layer digests with the docker CLI.
    pub async fn calculate_hash(&self, image_ref: &str) -> Result<String> {
        let out = tokio::process::Command::new("docker")
            .args([
                "image",
                "inspect",
                "--format",
                "{{json .RootFS.Layers}}",
                image_ref,
            ])
            .output()
            .await
            .context("spawn docker image inspect")?;

        if !out.status.success() {
            return Err(anyhow!(
                "docker image inspect failed for {image_ref}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }

        let layers: Vec<String> = serde_json::from_slice(&out.stdout)
            .context("decode docker layer digest list")?;
        Ok(hash_layer_digests(&layers))
    }

    fn persist(&self, agents: &BTreeMap<String, ApprovedAgent>) -> Result<()> {
        let snap = Snapshot {
            agents: agents.clone(),
        };
        let body = serde_json::to_string_pretty(&snap).context("serialize registry")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename over {}", self.path.display()))
    }
}

/// Stable digest over an image's ordered layer-content digests.
///
/// Layer order is semantic and preserved; the JSON canonicalization makes the
/// hash independent of metadata key ordering at the inspect boundary.
pub fn hash_layer_digests(layers: &[String]) -> String {
    let canonical =
        serde_json::to_string(layers).expect("layer digest list must serialize");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_hash_is_order_sensitive_and_stable() {
        let a = vec!["sha256:aaa".to_string(), "sha256:bbb".to_string()];
        let b = vec!["sha256:bbb".to_string(), "sha256:aaa".to_string()];

        assert_eq!(hash_layer_digests(&a), hash_layer_digests(&a));
        assert_ne!(hash_layer_digests(&a), hash_layer_digests(&b));
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert!(AgentStatus::parse("blessed").is_err());
        assert_eq!(AgentStatus::parse("Approved").unwrap(), AgentStatus::Approved);
    }
}
