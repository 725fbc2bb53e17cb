//! Append-only verification audit log.
//!
//! JSON Lines, one entry per verification, under a well-known directory.
//! Files rotate monthly by name; records are never rewritten. An optional
//! hash chain (hash_prev + hash_self over canonical JSON) makes tampering
//! detectable after the fact.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use af_schemas::Tier;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub verification_id: String,
    pub image: String,
    pub tier: Tier,
    pub ts_utc: DateTime<Utc>,
    /// Complete verification result payload.
    pub payload: Value,
    pub llm_reasoning: Option<String>,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Derive the verification id: `ver_` plus the first 12 hex chars of
/// sha256(image || start timestamp).
pub fn derive_verification_id(image: &str, started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.as_bytes());
    hasher.update(
        started_at
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
            .as_bytes(),
    );
    let digest = hex::encode(hasher.finalize());
    format!("ver_{}", &digest[..12])
}

/// The audit log. Appends are serialized by the internal mutex; each append
/// writes one whole line, so concurrent readers never see a torn record.
pub struct AuditLog {
    dir: PathBuf,
    hash_chain: bool,
    state: Mutex<ChainState>,
}

#[derive(Default)]
struct ChainState {
    last_hash: Option<String>,
    current_file: Option<PathBuf>,
}

impl AuditLog {
    /// Open the log directory, restoring chain state from the current
    /// month's file if it exists.
    pub fn open(dir: impl Into<PathBuf>, hash_chain: bool) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create_dir_all {:?}", dir))?;

        let log = Self {
            dir,
            hash_chain,
            state: Mutex::new(ChainState::default()),
        };

        let current = log.file_for(Utc::now());
        if hash_chain && current.exists() {
            let content = fs::read_to_string(&current)
                .with_context(|| format!("read audit log {:?}", current))?;
            let last_hash = content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .last()
                .and_then(|line| serde_json::from_str::<AuditEntry>(line).ok())
                .and_then(|e| e.hash_self);
            let mut state = log.state.lock().expect("audit lock poisoned");
            state.last_hash = last_hash;
            state.current_file = Some(current);
        }

        Ok(log)
    }

    fn file_for(&self, ts: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("verifications-{}.jsonl", ts.format("%Y-%m")))
    }

    /// Append one verification record and return the entry as written.
    pub fn append(
        &self,
        image: &str,
        tier: Tier,
        started_at: DateTime<Utc>,
        payload: Value,
        llm_reasoning: Option<String>,
    ) -> Result<AuditEntry> {
        let ts_utc = Utc::now();
        let mut entry = AuditEntry {
            verification_id: derive_verification_id(image, started_at),
            image: image.to_string(),
            tier,
            ts_utc,
            payload,
            llm_reasoning,
            hash_prev: None,
            hash_self: None,
        };

        let mut state = self.state.lock().expect("audit lock poisoned");

        let file = self.file_for(ts_utc);
        // Month rollover starts a fresh chain in the new file.
        if state.current_file.as_ref() != Some(&file) {
            state.current_file = Some(file.clone());
            if self.hash_chain && file.exists() {
                let content = fs::read_to_string(&file)?;
                state.last_hash = content
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .last()
                    .and_then(|line| serde_json::from_str::<AuditEntry>(line).ok())
                    .and_then(|e| e.hash_self);
            } else {
                state.last_hash = None;
            }
        }

        if self.hash_chain {
            entry.hash_prev = state.last_hash.clone();
            let self_hash = compute_entry_hash(&entry)?;
            entry.hash_self = Some(self_hash.clone());
            state.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&entry)?;
        append_line(&file, &line)?;

        Ok(entry)
    }

    /// Read entries across all rotated files, optionally filtered by image
    /// and collapsed to the latest entry per image.
    pub fn list(&self, image_filter: Option<&str>, latest_only: bool) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();

        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("read audit dir {:?}", self.dir))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "jsonl"))
            .collect();
        files.sort();

        for file in files {
            let content =
                fs::read_to_string(&file).with_context(|| format!("read {:?}", file))?;
            for (i, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let entry: AuditEntry = serde_json::from_str(line)
                    .with_context(|| format!("parse audit entry {:?}:{}", file, i + 1))?;
                if let Some(filter) = image_filter {
                    if entry.image != filter {
                        continue;
                    }
                }
                entries.push(entry);
            }
        }

        entries.sort_by_key(|e| e.ts_utc);

        if latest_only {
            let mut latest: std::collections::BTreeMap<String, AuditEntry> = Default::default();
            for entry in entries {
                latest.insert(entry.image.clone(), entry);
            }
            entries = latest.into_values().collect();
            entries.sort_by_key(|e| e.ts_utc);
        }

        Ok(entries)
    }

    /// Verify the hash chain of every rotated file.
    pub fn verify_chains(&self) -> Result<ChainVerification> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "jsonl"))
            .collect();
        files.sort();

        let mut total_lines = 0usize;
        for file in files {
            let content = fs::read_to_string(&file)?;
            match verify_chain_str(&content)? {
                ChainVerification::Valid { lines } => total_lines += lines,
                broken @ ChainVerification::Broken { .. } => return Ok(broken),
            }
        }

        Ok(ChainVerification::Valid { lines: total_lines })
    }
}

/// Result of hash-chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

/// Verify one file's chain from its JSONL content.
pub fn verify_chain_str(content: &str) -> Result<ChainVerification> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: AuditEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit entry at line {}", i + 1))?;
        line_count += 1;

        if entry.hash_prev != prev_hash {
            return Ok(ChainVerification::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(&entry)?;
            if *claimed != recomputed {
                return Ok(ChainVerification::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(ChainVerification::Valid { lines: line_count })
}

/// Entry hash over canonical JSON with hash_self cleared.
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes()).context("write audit line")?;
    f.write_all(b"\n").context("write newline")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively; one entry == one JSON line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_id_is_stable_and_prefixed() {
        let ts: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();
        let a = derive_verification_id("shade/agent:latest", ts);
        let b = derive_verification_id("shade/agent:latest", ts);
        assert_eq!(a, b);
        assert!(a.starts_with("ver_"));
        assert_eq!(a.len(), 16);

        let other = derive_verification_id("other/agent:latest", ts);
        assert_ne!(a, other);
    }
}
