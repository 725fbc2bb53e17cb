use anyhow::{anyhow, Result};

use af_scanner::{ImageFacts, ImageScanner, LayerRecord, ScanBackend};
use af_schemas::Severity;

struct FakeBackend {
    inspect_ok: bool,
    scan_ok: bool,
}

#[async_trait::async_trait]
impl ScanBackend for FakeBackend {
    async fn inspect(&self, _image: &str) -> Result<ImageFacts> {
        if !self.inspect_ok {
            return Err(anyhow!("docker daemon unreachable"));
        }
        Ok(ImageFacts {
            total_size_bytes: 52_428_800,
            layers: vec![
                LayerRecord {
                    command: "FROM python:3.11-slim".to_string(),
                    size_bytes: 40_000_000,
                },
                LayerRecord {
                    command: "RUN pip install ccxt".to_string(),
                    size_bytes: 12_000_000,
                },
            ],
            base_image: Some("python:3.11-slim".to_string()),
        })
    }

    async fn vulnerability_scan(&self, _image: &str) -> Result<String> {
        if !self.scan_ok {
            return Err(anyhow!("trivy binary not found"));
        }
        Ok(r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-1234",
                    "Severity": "HIGH",
                    "PkgName": "openssl",
                    "InstalledVersion": "1.1.1",
                    "Description": "padding oracle"
                }]
            }]
        }"#
        .to_string())
    }
}

#[tokio::test]
async fn healthy_backend_produces_full_report() {
    let scanner = ImageScanner::new(Box::new(FakeBackend {
        inspect_ok: true,
        scan_ok: true,
    }));

    let report = scanner.scan("acme/quant:latest").await;

    assert_eq!(report.total_size_bytes, 52_428_800);
    assert_eq!(report.layers.len(), 2);
    assert_eq!(report.count(Severity::High), 1);
    assert!(report.warnings.is_empty());
    // ccxt install marks the framework even though the name is neutral.
    assert!(report.agent_framework_detected);
}

#[tokio::test]
async fn scanner_failure_downgrades_to_warning() {
    let scanner = ImageScanner::new(Box::new(FakeBackend {
        inspect_ok: true,
        scan_ok: false,
    }));

    let report = scanner.scan("acme/quant:latest").await;

    assert!(report.vulnerabilities.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("scanner unavailable"));
    // Metadata still present.
    assert_eq!(report.layers.len(), 2);
}

#[tokio::test]
async fn inspect_failure_yields_degraded_report() {
    let scanner = ImageScanner::new(Box::new(FakeBackend {
        inspect_ok: false,
        scan_ok: true,
    }));

    let report = scanner.scan("shade/agent:latest").await;

    assert_eq!(report.total_size_bytes, 0);
    assert!(report.layers.is_empty());
    assert!(report.vulnerabilities.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.agent_framework_detected);
}
