//! Terminal and JSON rendering for verification output.
//!
//! WARNING and FAILED are verdict data, not process errors: rendering never
//! influences the exit code.

use af_schemas::Verdict;
use af_verifier::{BatchReport, VerificationReport};

/// `terminal` or `json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Terminal => write!(f, "terminal"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

fn verdict_mark(v: Verdict) -> &'static str {
    match v {
        Verdict::Passed => "\u{2713}",
        Verdict::Warning => "\u{26a0}",
        Verdict::Failed => "\u{2717}",
    }
}

fn stage_line(report: &VerificationReport, stage: &str, present: bool, label: &str) -> String {
    if let Some(err) = report.stage_errors.get(stage) {
        format!("  \u{2717} {label}: {err}")
    } else if present {
        format!("  \u{2713} {label}")
    } else {
        format!("  - {label}: skipped")
    }
}

/// Human-readable verification summary.
pub fn render_report(report: &VerificationReport) {
    println!("Verification {}", report.verification_id);
    println!("  image: {}", report.image);
    println!("  tier: {}", report.tier.as_str());

    println!(
        "{}",
        stage_line(report, "scan", report.docker_scan.is_some(), "image scan")
    );
    if let Some(scan) = &report.docker_scan {
        let counts = scan.severity_counts();
        let summary: Vec<String> = counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(s, n)| format!("{n} {}", s.as_str()))
            .collect();
        if !summary.is_empty() {
            println!("      vulnerabilities: {}", summary.join(", "));
        }
    }

    println!(
        "{}",
        stage_line(report, "tee", report.tee_validation.is_some(), "attestation")
    );
    if let Some(tee) = &report.tee_validation {
        println!(
            "      platform: {}  trust: {}",
            tee.platform.as_str(),
            tee.trust_level.as_str()
        );
    }

    println!(
        "{}",
        stage_line(
            report,
            "benchmark",
            report.performance_benchmark.is_some(),
            "benchmark"
        )
    );
    println!(
        "{}",
        stage_line(report, "backtest", report.backtest.is_some(), "backtest")
    );
    if let Some(bt) = &report.backtest {
        println!(
            "      trades: {}  profit factor: {}",
            bt.metrics.total_trades,
            format_profit_factor(bt.metrics.profit_factor)
        );
    }
    println!(
        "{}",
        stage_line(report, "llm", report.llm_analysis.is_some(), "llm analysis")
    );
    if let Some(strategy) = &report.strategy_verification {
        println!(
            "      strategy: {} ({:?})",
            strategy.detected_strategy.as_str(),
            strategy.verification_status
        );
    }

    for gate in &report.triggered_gates {
        println!("  {} gate {}: {}", verdict_mark(gate.verdict), gate.gate, gate.message);
    }

    println!(
        "{} Fort Score: {}/180  status: {}",
        verdict_mark(report.overall_status),
        report.agent_fort_score,
        report.overall_status.as_str()
    );
}

/// Infinite profit factors have no JSON representation; the renderer prints
/// them as `inf`.
pub fn format_profit_factor(pf: f64) -> String {
    if pf.is_finite() {
        format!("{pf:.2}")
    } else {
        "inf".to_string()
    }
}

pub fn render_batch(batch: &BatchReport) {
    println!(
        "Batch: {} total, {} successful, {} failed in {:.1}s",
        batch.total, batch.successful, batch.failed, batch.processing_time_seconds
    );
    println!("  average Fort Score: {:.1}", batch.average_fort_score);

    for result in &batch.results {
        println!(
            "  {} {}: {} ({}/180)",
            verdict_mark(result.overall_status),
            result.image,
            result.overall_status.as_str(),
            result.agent_fort_score
        );
    }
    for failure in &batch.failures {
        println!("  \u{2717} {}: {}", failure.image, failure.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_factor_renders_inf() {
        assert_eq!(format_profit_factor(f64::INFINITY), "inf");
        assert_eq!(format_profit_factor(2.5), "2.50");
    }
}
