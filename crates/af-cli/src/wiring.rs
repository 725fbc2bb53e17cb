//! Production wiring: settings -> verifier context.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use af_audit::AuditLog;
use af_backtest::ContainerBacktester;
use af_benchmark::Benchmarker;
use af_config::VerifierSettings;
use af_judge::LlmJudge;
use af_marketdata::{HttpArchiveProvider, MarketStore};
use af_registry::CodeHashRegistry;
use af_scanner::ImageScanner;
use af_tee::TeeValidator;
use af_verifier::{DockerHashEvidence, ResourceLimits, VerifierContext};

/// Build the full production context from settings.
pub fn build_context(
    settings: &VerifierSettings,
    limits: ResourceLimits,
) -> Result<Arc<VerifierContext>> {
    let market = Arc::new(MarketStore::new(
        &settings.market_data.cache_dir,
        Box::new(HttpArchiveProvider::new(settings.market_data.base_url.clone())),
    ));
    let registry = Arc::new(
        CodeHashRegistry::open(&settings.registry_path).context("open registry")?,
    );
    let audit = Arc::new(AuditLog::open(&settings.audit_dir, true).context("open audit log")?);
    let tee = Arc::new(TeeValidator::new(settings.tee.clone()).context("tee validator")?);
    let evidence = Arc::new(DockerHashEvidence::new(
        Arc::clone(&registry),
        settings.tee.simulation_mode,
        settings.dev_auto_register,
    ));

    Ok(Arc::new(VerifierContext::new(
        market,
        registry,
        audit,
        Arc::new(ImageScanner::with_docker_cli()),
        tee,
        Arc::new(ContainerBacktester::with_docker_cli()),
        Arc::new(Benchmarker::with_docker_http()),
        Arc::new(LlmJudge::from_settings(&settings.llm)),
        evidence,
        limits,
    )))
}

/// Parse a `YYYY-MM-DD` date into midnight UTC.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight exists")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_days() {
        let d = parse_date("2024-05-01").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert!(parse_date("05/01/2024").is_err());
    }
}
