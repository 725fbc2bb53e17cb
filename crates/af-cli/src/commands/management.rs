//! Management commands: audit-list and init.

use anyhow::{Context, Result};
use clap::Args;

use af_audit::AuditLog;
use af_config::{envfile, VerifierSettings};
use af_marketdata::{HttpArchiveProvider, MarketStore};

#[derive(Args)]
pub struct AuditListArgs {
    /// Filter audits by image name
    #[arg(long)]
    pub image: Option<String>,

    /// Show only the latest audit for each image
    #[arg(long)]
    pub latest: bool,
}

pub fn audit_list(args: AuditListArgs) -> Result<()> {
    let settings = VerifierSettings::from_env();
    let audit = AuditLog::open(&settings.audit_dir, true).context("open audit log")?;

    let entries = audit.list(args.image.as_deref(), args.latest)?;
    if entries.is_empty() {
        println!("no audit records found");
        return Ok(());
    }

    for entry in &entries {
        let score = entry
            .payload
            .get("agent_fort_score")
            .and_then(|v| v.as_i64())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let status = entry
            .payload
            .get("overall_status")
            .and_then(|v| v.as_str())
            .unwrap_or("ERROR");

        println!(
            "{}  {}  {}  score={}  status={}  tier={}",
            entry.ts_utc.format("%Y-%m-%d %H:%M"),
            entry.verification_id,
            entry.image,
            score,
            status,
            entry.tier.as_str(),
        );
    }
    println!("total records: {}", entries.len());

    Ok(())
}

#[derive(Args)]
pub struct InitArgs {
    /// Environment type
    #[arg(long, default_value = "development", value_parser = ["production", "staging", "development"])]
    pub env: String,

    /// Overwrite existing configuration
    #[arg(long)]
    pub force: bool,
}

pub async fn init(args: InitArgs) -> Result<()> {
    let env_path = std::path::Path::new(".env");
    let cfg = envfile::generate_env_config(&args.env);
    envfile::write_env_file(&cfg, env_path, args.force)?;
    println!("wrote {}", env_path.display());

    // Seed the market-data manifest so regime names resolve offline.
    if args.env == "development" {
        let settings = VerifierSettings::from_env();
        let store = MarketStore::new(
            &settings.market_data.cache_dir,
            Box::new(HttpArchiveProvider::new(settings.market_data.base_url.clone())),
        );
        store
            .write_manifest()
            .await
            .context("seed market-data manifest")?;
        println!(
            "seeded market-data manifest under {}",
            settings.market_data.cache_dir.display()
        );
    }

    println!("environment={}", args.env);
    Ok(())
}
