//! Image scanner: vulnerabilities, layer history, and agent-framework
//! detection.
//!
//! The scanner shells out to an external vulnerability scanner (trivy) and
//! the docker CLI through the [`ScanBackend`] seam. Failures isolated to the
//! scanner are downgraded to report warnings with an empty vulnerability
//! set; a scan never fails the pipeline from here.

pub mod backend;
pub mod detect;
pub mod trivy;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use af_schemas::Severity;

pub use backend::{DockerCliBackend, ImageFacts, ScanBackend};

/// One image layer: the command that produced it and its size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub command: String,
    pub size_bytes: u64,
}

/// One vulnerability finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub severity: Severity,
    pub package: String,
    pub installed_version: String,
    pub fixed_version: Option<String>,
    pub description: String,
}

/// The scanner's report for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReport {
    pub image: String,
    pub total_size_bytes: u64,
    pub layers: Vec<LayerRecord>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub agent_framework_detected: bool,
    pub base_image: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub warnings: Vec<String>,
}

impl ImageReport {
    /// Severity histogram derived from the vulnerability set.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for v in &self.vulnerabilities {
            *counts.entry(v.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    /// An empty report carrying only a warning, used when the scanner or the
    /// image metadata cannot be obtained.
    pub fn degraded(image: &str, warning: String) -> Self {
        Self {
            image: image.to_string(),
            total_size_bytes: 0,
            layers: Vec::new(),
            vulnerabilities: Vec::new(),
            agent_framework_detected: detect::name_matches_framework(image),
            base_image: None,
            timestamp: Utc::now(),
            warnings: vec![warning],
        }
    }
}

/// The image scanner.
pub struct ImageScanner {
    backend: Box<dyn ScanBackend>,
}

impl ImageScanner {
    pub fn new(backend: Box<dyn ScanBackend>) -> Self {
        Self { backend }
    }

    /// Scanner with the docker/trivy CLI backend.
    pub fn with_docker_cli() -> Self {
        Self::new(Box::new(DockerCliBackend::default()))
    }

    /// Produce an image report. Every backend failure degrades to a warning
    /// on the report; this method never errors.
    pub async fn scan(&self, image: &str) -> ImageReport {
        let mut warnings = Vec::new();

        let facts = match self.backend.inspect(image).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(%image, error = %e, "image inspect failed");
                return ImageReport::degraded(image, format!("image inspect failed: {e}"));
            }
        };

        let vulnerabilities = match self.backend.vulnerability_scan(image).await {
            Ok(raw) => match trivy::parse_report(&raw) {
                Ok(vulns) => vulns,
                Err(e) => {
                    warnings.push(format!("scanner output unreadable: {e}"));
                    Vec::new()
                }
            },
            Err(e) => {
                warnings.push(format!("scanner unavailable: {e}"));
                Vec::new()
            }
        };

        let agent_framework_detected = detect::detect_agent_framework(image, &facts.layers);

        ImageReport {
            image: image.to_string(),
            total_size_bytes: facts.total_size_bytes,
            layers: facts.layers,
            vulnerabilities,
            agent_framework_detected,
            base_image: facts.base_image,
            timestamp: Utc::now(),
            warnings,
        }
    }
}
