//! Trivy JSON report decoding.

use anyhow::{Context, Result};
use serde::Deserialize;

use af_schemas::Severity;

use crate::Vulnerability;

#[derive(Debug, Deserialize)]
struct TrivyReport {
    #[serde(rename = "Results", default)]
    results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
struct TrivyResult {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<TrivyVulnerability>,
}

#[derive(Debug, Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID", default)]
    id: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "PkgName", default)]
    pkg_name: String,
    #[serde(rename = "InstalledVersion", default)]
    installed_version: String,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: Option<String>,
    #[serde(rename = "Description", default)]
    description: String,
}

/// Decode a trivy JSON report into the scanner's vulnerability set.
///
/// Findings with severities outside the recognized set (e.g. UNKNOWN) are
/// dropped rather than guessed at.
pub fn parse_report(raw: &str) -> Result<Vec<Vulnerability>> {
    let report: TrivyReport = serde_json::from_str(raw).context("decode trivy report")?;

    let mut out = Vec::new();
    for result in report.results {
        for v in result.vulnerabilities {
            let severity = match v.severity.as_str() {
                "CRITICAL" => Severity::Critical,
                "HIGH" => Severity::High,
                "MEDIUM" => Severity::Medium,
                "LOW" => Severity::Low,
                _ => continue,
            };

            let mut description = v.description;
            description.truncate(200);

            out.push(Vulnerability {
                id: v.id,
                severity,
                package: v.pkg_name,
                installed_version: v.installed_version,
                fixed_version: v.fixed_version.filter(|f| !f.is_empty()),
                description,
            });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Results": [
            {
                "Vulnerabilities": [
                    {
                        "VulnerabilityID": "CVE-2024-0001",
                        "Severity": "CRITICAL",
                        "PkgName": "openssl",
                        "InstalledVersion": "1.1.1",
                        "FixedVersion": "3.0.0",
                        "Description": "Remote code execution"
                    },
                    {
                        "VulnerabilityID": "CVE-2024-0002",
                        "Severity": "UNKNOWN",
                        "PkgName": "zlib",
                        "InstalledVersion": "1.2.11",
                        "Description": "unrated"
                    }
                ]
            },
            { "Vulnerabilities": [] }
        ]
    }"#;

    #[test]
    fn parses_and_drops_unknown_severity() {
        let vulns = parse_report(SAMPLE).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].id, "CVE-2024-0001");
        assert_eq!(vulns[0].severity, Severity::Critical);
        assert_eq!(vulns[0].fixed_version.as_deref(), Some("3.0.0"));
    }

    #[test]
    fn results_key_may_be_absent() {
        let vulns = parse_report("{}").unwrap();
        assert!(vulns.is_empty());
    }

    #[test]
    fn malformed_report_is_an_error() {
        assert!(parse_report("not json").is_err());
    }

    #[test]
    fn long_descriptions_are_capped() {
        let long = "x".repeat(500);
        let raw = format!(
            r#"{{"Results":[{{"Vulnerabilities":[{{"VulnerabilityID":"CVE-1","Severity":"LOW","PkgName":"p","InstalledVersion":"1","Description":"{long}"}}]}}]}}"#
        );
        let vulns = parse_report(&raw).unwrap();
        assert_eq!(vulns[0].description.len(), 200);
    }
}
