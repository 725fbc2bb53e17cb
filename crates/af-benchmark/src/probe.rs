//! Load-probe seam and the docker HTTP implementation.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use uuid::Uuid;

use crate::BenchmarkType;

/// One request observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub latency_ms: f64,
    pub ok: bool,
}

/// Load generation boundary.
#[async_trait::async_trait]
pub trait LoadProbe: Send + Sync {
    async fn run(
        &self,
        image: &str,
        duration_seconds: u64,
        benchmark_type: BenchmarkType,
    ) -> Result<Vec<Sample>>;
}

/// Production probe: run the container with its service port published,
/// hammer `/health` for the duration, then force-remove.
#[derive(Debug, Default)]
pub struct DockerHttpProbe;

/// Port the agent contract exposes for health checks.
const AGENT_PORT: u16 = 8080;

/// Delay between requests; stress mode goes as fast as responses allow.
const PACE: Duration = Duration::from_millis(20);

#[async_trait::async_trait]
impl LoadProbe for DockerHttpProbe {
    async fn run(
        &self,
        image: &str,
        duration_seconds: u64,
        benchmark_type: BenchmarkType,
    ) -> Result<Vec<Sample>> {
        let name = format!("af-bench-{}", Uuid::new_v4());

        let started = tokio::process::Command::new("docker")
            .args([
                "run",
                "-d",
                "--name",
                &name,
                "-e",
                "BENCHMARK_MODE=true",
                "-p",
                &format!("0:{AGENT_PORT}"),
                image,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("spawn docker run")?;
        if !started.status.success() {
            return Err(anyhow!(
                "docker run failed: {}",
                String::from_utf8_lossy(&started.stderr).trim()
            ));
        }

        let result = self.drive(&name, duration_seconds, benchmark_type).await;

        let _ = tokio::process::Command::new("docker")
            .args(["rm", "-f", &name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        result
    }
}

impl DockerHttpProbe {
    async fn drive(
        &self,
        name: &str,
        duration_seconds: u64,
        benchmark_type: BenchmarkType,
    ) -> Result<Vec<Sample>> {
        let port = published_port(name).await?;
        let url = format!("http://127.0.0.1:{port}/health");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("build probe client")?;

        // Give the service a moment to bind.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut samples = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(duration_seconds);
        while Instant::now() < deadline {
            let start = Instant::now();
            let ok = matches!(client.get(&url).send().await, Ok(r) if r.status().is_success());
            samples.push(Sample {
                latency_ms: start.elapsed().as_secs_f64() * 1_000.0,
                ok,
            });

            if benchmark_type != BenchmarkType::Stress {
                tokio::time::sleep(PACE).await;
            }
        }

        debug!(container = %name, samples = samples.len(), "probe finished");
        Ok(samples)
    }
}

/// Resolve the host port docker published for the agent port.
async fn published_port(name: &str) -> Result<u16> {
    let out = tokio::process::Command::new("docker")
        .args(["port", name, &AGENT_PORT.to_string()])
        .output()
        .await
        .context("spawn docker port")?;
    if !out.status.success() {
        return Err(anyhow!("docker port failed for {name}"));
    }

    // Output shape: "0.0.0.0:49153" (possibly multiple lines).
    let text = String::from_utf8_lossy(&out.stdout);
    text.lines()
        .filter_map(|l| l.rsplit(':').next())
        .find_map(|p| p.trim().parse::<u16>().ok())
        .ok_or_else(|| anyhow!("no published port in: {}", text.trim()))
}
