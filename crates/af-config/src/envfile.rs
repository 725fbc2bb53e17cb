//! `.env` generation for the `init` command.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Build the `.env` key set for the given environment name.
///
/// Keys are ordered deterministically (BTreeMap) so repeated `init` runs
/// produce byte-identical files.
pub fn generate_env_config(env: &str) -> BTreeMap<String, String> {
    let mut cfg = BTreeMap::new();

    cfg.insert("LLM_PRIMARY_PROVIDER".to_string(), "anthropic".to_string());
    cfg.insert("LLM_FALLBACK_PROVIDER".to_string(), "openai".to_string());
    cfg.insert("LLM_ENABLE_ENSEMBLE".to_string(), "false".to_string());
    cfg.insert("LLM_TIMEOUT_SECONDS".to_string(), "30".to_string());
    cfg.insert("LLM_MAX_TOKENS".to_string(), "2048".to_string());
    cfg.insert(
        "MARKET_DATA_BASE_URL".to_string(),
        "https://data.binance.vision".to_string(),
    );
    cfg.insert("MARKET_DATA_CACHE_DIR".to_string(), "market_data".to_string());
    cfg.insert("AUDIT_DIR".to_string(), "audit".to_string());
    cfg.insert("REGISTRY_PATH".to_string(), "registry.json".to_string());

    match env {
        "development" => {
            cfg.insert("TEE_SIMULATION_MODE".to_string(), "true".to_string());
            cfg.insert("DEV_AUTO_REGISTER".to_string(), "true".to_string());
        }
        "staging" => {
            cfg.insert("TEE_SIMULATION_MODE".to_string(), "true".to_string());
            cfg.insert("DEV_AUTO_REGISTER".to_string(), "false".to_string());
        }
        _ => {
            cfg.insert("TEE_SIMULATION_MODE".to_string(), "false".to_string());
            cfg.insert("DEV_AUTO_REGISTER".to_string(), "false".to_string());
            cfg.insert("TEE_STRICT_ARCHITECTURE".to_string(), "true".to_string());
        }
    }

    cfg
}

/// Write the `.env` file. Refuses to overwrite unless `force` is set.
pub fn write_env_file(cfg: &BTreeMap<String, String>, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; re-run with --force to overwrite",
            path.display()
        );
    }

    let mut out = String::new();
    for (k, v) in cfg {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }

    std::fs::write(path, out).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_disables_simulation() {
        let cfg = generate_env_config("production");
        assert_eq!(cfg.get("TEE_SIMULATION_MODE").unwrap(), "false");
        assert_eq!(cfg.get("DEV_AUTO_REGISTER").unwrap(), "false");
    }

    #[test]
    fn development_enables_auto_register() {
        let cfg = generate_env_config("development");
        assert_eq!(cfg.get("DEV_AUTO_REGISTER").unwrap(), "true");
    }

    #[test]
    fn refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let cfg = generate_env_config("development");

        write_env_file(&cfg, &path, false).unwrap();
        assert!(write_env_file(&cfg, &path, false).is_err());
        write_env_file(&cfg, &path, true).unwrap();
    }

    #[test]
    fn env_file_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.env");
        let b = dir.path().join("b.env");
        let cfg = generate_env_config("staging");

        write_env_file(&cfg, &a, false).unwrap();
        write_env_file(&cfg, &b, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&a).unwrap(),
            std::fs::read_to_string(&b).unwrap()
        );
    }
}
