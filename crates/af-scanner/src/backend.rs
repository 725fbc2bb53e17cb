//! Backend seam for the image scanner.
//!
//! Keeps external process invocation behind a trait so the scanner logic and
//! its tests never depend on a docker daemon or a trivy binary.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::LayerRecord;

/// Image metadata gathered without running the container.
#[derive(Debug, Clone, Default)]
pub struct ImageFacts {
    pub total_size_bytes: u64,
    pub layers: Vec<LayerRecord>,
    pub base_image: Option<String>,
}

/// External tooling boundary for the scanner.
#[async_trait::async_trait]
pub trait ScanBackend: Send + Sync {
    /// Size, layer history and base-image hint for a local image.
    async fn inspect(&self, image: &str) -> Result<ImageFacts>;

    /// Raw JSON report from the external vulnerability scanner.
    async fn vulnerability_scan(&self, image: &str) -> Result<String>;
}

/// Production backend: docker + trivy CLIs via `tokio::process`.
#[derive(Debug, Default)]
pub struct DockerCliBackend;

#[async_trait::async_trait]
impl ScanBackend for DockerCliBackend {
    async fn inspect(&self, image: &str) -> Result<ImageFacts> {
        let inspect = run_capture(
            "docker",
            &["image", "inspect", "--format", "{{json .}}", image],
        )
        .await?;
        let meta: InspectOutput =
            serde_json::from_str(inspect.trim()).context("decode docker inspect output")?;

        let history = run_capture(
            "docker",
            &[
                "history",
                "--no-trunc",
                "--format",
                "{{json .}}",
                image,
            ],
        )
        .await?;

        let mut layers = Vec::new();
        for line in history.lines().filter(|l| !l.trim().is_empty()) {
            let row: HistoryRow =
                serde_json::from_str(line).context("decode docker history row")?;
            layers.push(LayerRecord {
                command: row.created_by,
                size_bytes: parse_size(&row.size),
            });
        }
        // docker history lists newest first; reports keep build order.
        layers.reverse();

        Ok(ImageFacts {
            total_size_bytes: meta.size,
            layers,
            base_image: base_image_hint(&meta),
        })
    }

    async fn vulnerability_scan(&self, image: &str) -> Result<String> {
        run_capture(
            "trivy",
            &[
                "image",
                "--format",
                "json",
                "--severity",
                "CRITICAL,HIGH,MEDIUM,LOW",
                "--quiet",
                image,
            ],
        )
        .await
    }
}

async fn run_capture(program: &str, args: &[&str]) -> Result<String> {
    let out = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("spawn {program}"))?;

    if !out.status.success() {
        return Err(anyhow!(
            "{program} exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }

    String::from_utf8(out.stdout).with_context(|| format!("{program} emitted non-utf8 output"))
}

#[derive(Debug, Deserialize)]
struct InspectOutput {
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Config", default)]
    config: InspectConfig,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image", default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(rename = "CreatedBy", default)]
    created_by: String,
    #[serde(rename = "Size", default)]
    size: String,
}

fn base_image_hint(meta: &InspectOutput) -> Option<String> {
    meta.config
        .image
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| meta.repo_tags.first().cloned())
}

/// docker history sizes come as human strings ("12.3MB", "0B").
fn parse_size(s: &str) -> u64 {
    let s = s.trim();
    let split = s.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.trim().parse().unwrap_or(0.0);

    let mult = match unit.trim().to_ascii_uppercase().as_str() {
        "B" | "" => 1.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        _ => 1.0,
    };

    (value * mult) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("0B"), 0);
        assert_eq!(parse_size("512B"), 512);
        assert_eq!(parse_size("1.5KB"), 1500);
        assert_eq!(parse_size("12.3MB"), 12_300_000);
        assert_eq!(parse_size("2GB"), 2_000_000_000);
    }

    #[test]
    fn parse_size_tolerates_garbage() {
        assert_eq!(parse_size("n/a"), 0);
    }
}
