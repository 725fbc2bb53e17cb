//! Environment discovery and settings for the verifier.
//!
//! All settings are read once at startup and threaded through the
//! orchestrator context; no component reads the process environment after
//! construction. Missing keys fall back to documented defaults rather than
//! erroring, except where an operation cannot proceed without them (the
//! relevant component reports `Config` at call time).

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub mod envfile;

/// LLM judge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// "anthropic" | "openai" | "local".
    pub primary_provider: String,
    pub fallback_provider: Option<String>,
    pub enable_ensemble: bool,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f64,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            primary_provider: "anthropic".to_string(),
            fallback_provider: Some("openai".to_string()),
            enable_ensemble: false,
            timeout_seconds: 30,
            max_tokens: 2048,
            temperature: 0.1,
            anthropic_api_key: None,
            openai_api_key: None,
        }
    }
}

impl LlmSettings {
    /// Read settings from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            primary_provider: env_string("LLM_PRIMARY_PROVIDER").unwrap_or(d.primary_provider),
            fallback_provider: env_string("LLM_FALLBACK_PROVIDER").or(d.fallback_provider),
            enable_ensemble: env_string("LLM_ENABLE_ENSEMBLE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.enable_ensemble),
            timeout_seconds: env_parse("LLM_TIMEOUT_SECONDS").unwrap_or(d.timeout_seconds),
            max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(d.max_tokens),
            temperature: d.temperature,
            anthropic_api_key: env_string("ANTHROPIC_API_KEY"),
            openai_api_key: env_string("OPENAI_API_KEY"),
        }
    }
}

/// Market-data store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataSettings {
    /// Upstream archive base URL.
    pub base_url: String,
    /// Root directory for the day-file cache.
    pub cache_dir: PathBuf,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://data.binance.vision".to_string(),
            cache_dir: PathBuf::from("market_data"),
        }
    }
}

impl MarketDataSettings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: env_string("MARKET_DATA_BASE_URL").unwrap_or(d.base_url),
            cache_dir: env_string("MARKET_DATA_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.cache_dir),
        }
    }
}

/// TEE validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeeSettings {
    /// Root CA bundle paths for quote signature verification.
    pub root_ca_paths: Vec<PathBuf>,
    /// When true, simulated quotes are accepted (trust capped at LOW).
    pub simulation_mode: bool,
    /// Allowed quote timestamp skew in seconds before a warning is recorded.
    pub max_timestamp_skew_seconds: i64,
    /// Reject quotes from non-x86 platforms when true.
    pub strict_architecture: bool,
}

impl Default for TeeSettings {
    fn default() -> Self {
        Self {
            root_ca_paths: Vec::new(),
            simulation_mode: false,
            max_timestamp_skew_seconds: 3600,
            strict_architecture: false,
        }
    }
}

impl TeeSettings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            root_ca_paths: env_string("TEE_ROOT_CA_PATHS")
                .map(|v| v.split(':').map(PathBuf::from).collect())
                .unwrap_or(d.root_ca_paths),
            simulation_mode: env_string("TEE_SIMULATION_MODE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.simulation_mode),
            max_timestamp_skew_seconds: env_parse("TEE_MAX_TIMESTAMP_SKEW_SECONDS")
                .unwrap_or(d.max_timestamp_skew_seconds),
            strict_architecture: env_string("TEE_STRICT_ARCHITECTURE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.strict_architecture),
        }
    }
}

/// Top-level settings bundle consumed by the orchestrator context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierSettings {
    pub llm: LlmSettings,
    pub market_data: MarketDataSettings,
    pub tee: TeeSettings,
    /// Directory for audit JSONL files.
    pub audit_dir: PathBuf,
    /// Registry snapshot file.
    pub registry_path: PathBuf,
    /// Development mode: auto-register local images as pending.
    pub dev_auto_register: bool,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            market_data: MarketDataSettings::default(),
            tee: TeeSettings::default(),
            audit_dir: PathBuf::from("audit"),
            registry_path: PathBuf::from("registry.json"),
            dev_auto_register: false,
        }
    }
}

impl VerifierSettings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            llm: LlmSettings::from_env(),
            market_data: MarketDataSettings::from_env(),
            tee: TeeSettings::from_env(),
            audit_dir: env_string("AUDIT_DIR").map(PathBuf::from).unwrap_or(d.audit_dir),
            registry_path: env_string("REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.registry_path),
            dev_auto_register: env_string("DEV_AUTO_REGISTER")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.dev_auto_register),
        }
    }

    /// Stable hash of the effective settings, with secrets excluded.
    ///
    /// Used for run attribution in audit entries: the same settings always
    /// produce the same hash regardless of key order.
    pub fn settings_hash(&self) -> Result<String> {
        let mut v = serde_json::to_value(self).context("serialize settings failed")?;
        if let Value::Object(map) = &mut v {
            if let Some(Value::Object(llm)) = map.get_mut("llm") {
                llm.remove("anthropic_api_key");
                llm.remove("openai_api_key");
            }
        }
        Ok(hash_canonical_json(&v))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON, then hash the canonical bytes.
pub fn hash_canonical_json(v: &Value) -> String {
    let canonical = canonical_json(v);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical compact encoding with recursively sorted object keys.
pub fn canonical_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
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
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn settings_hash_stable_and_secret_free() {
        let mut a = VerifierSettings::default();
        let h1 = a.settings_hash().unwrap();
        // Changing only secrets must not change the hash.
        a.llm.anthropic_api_key = Some("sk-test".to_string());
        let h2 = a.settings_hash().unwrap();
        assert_eq!(h1, h2);

        // Changing a real setting must change the hash.
        a.llm.timeout_seconds = 99;
        let h3 = a.settings_hash().unwrap();
        assert_ne!(h1, h3);
    }

    #[test]
    fn defaults_are_conservative() {
        let s = VerifierSettings::default();
        assert!(!s.tee.simulation_mode);
        assert!(!s.dev_auto_register);
        assert!(!s.llm.enable_ensemble);
    }
}
