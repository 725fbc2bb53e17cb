//! Container performance benchmarking.
//!
//! Starts the agent container as a service and load-tests its health
//! endpoint for a bounded duration. The probe degrades instead of failing:
//! an unreachable or crashing container produces a zeroed result with a 100%
//! error rate and a warning, which the score engine turns into behavior
//! penalties and the error-rate gates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod probe;

pub use probe::{DockerHttpProbe, LoadProbe, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkType {
    Standard,
    Trading,
    Stress,
}

impl BenchmarkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkType::Standard => "standard",
            BenchmarkType::Trading => "trading",
            BenchmarkType::Stress => "stress",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(BenchmarkType::Standard),
            "trading" => Some(BenchmarkType::Trading),
            "stress" => Some(BenchmarkType::Stress),
            _ => None,
        }
    }

    /// Trading benchmarks apply to agent-framework images.
    pub fn for_image(image: &str) -> Self {
        let lower = image.to_ascii_lowercase();
        if ["shade", "agent", "finance", "trading"]
            .iter()
            .any(|p| lower.contains(p))
        {
            BenchmarkType::Trading
        } else {
            BenchmarkType::Standard
        }
    }
}

/// The benchmark record consumed by the score engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub image: String,
    pub duration_seconds: u64,
    pub throughput_tps: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: f64,
    pub error_rate_percent: f64,
    pub benchmark_type: BenchmarkType,
    pub timestamp: DateTime<Utc>,
    pub warnings: Vec<String>,
}

impl BenchmarkResult {
    /// Degraded result for a probe that could not run: zero throughput and a
    /// total error rate, so gates and penalties apply.
    pub fn degraded(image: &str, benchmark_type: BenchmarkType, warning: String) -> Self {
        Self {
            image: image.to_string(),
            duration_seconds: 0,
            throughput_tps: 0.0,
            avg_latency_ms: 0.0,
            p50_latency_ms: 0.0,
            p95_latency_ms: 0.0,
            p99_latency_ms: 0.0,
            max_latency_ms: 0.0,
            error_rate_percent: 100.0,
            benchmark_type,
            timestamp: Utc::now(),
            warnings: vec![warning],
        }
    }
}

/// The benchmarker: a probe behind a seam.
pub struct Benchmarker {
    probe: Box<dyn LoadProbe>,
}

impl Benchmarker {
    pub fn new(probe: Box<dyn LoadProbe>) -> Self {
        Self { probe }
    }

    pub fn with_docker_http() -> Self {
        Self::new(Box::new(DockerHttpProbe::default()))
    }

    /// Run the probe for `duration_seconds`. Infallible: probe failures
    /// degrade.
    pub async fn run(
        &self,
        image: &str,
        duration_seconds: u64,
        benchmark_type: BenchmarkType,
    ) -> BenchmarkResult {
        match self.probe.run(image, duration_seconds, benchmark_type).await {
            Ok(samples) => summarize(image, duration_seconds, benchmark_type, &samples),
            Err(e) => {
                warn!(%image, error = %e, "benchmark probe failed");
                BenchmarkResult::degraded(
                    image,
                    benchmark_type,
                    format!("benchmark probe failed: {e}"),
                )
            }
        }
    }
}

/// Fold raw samples into the benchmark record.
pub fn summarize(
    image: &str,
    duration_seconds: u64,
    benchmark_type: BenchmarkType,
    samples: &[Sample],
) -> BenchmarkResult {
    if samples.is_empty() {
        return BenchmarkResult::degraded(
            image,
            benchmark_type,
            "probe returned no samples".to_string(),
        );
    }

    let errors = samples.iter().filter(|s| !s.ok).count();
    let mut latencies: Vec<f64> = samples.iter().filter(|s| s.ok).map(|s| s.latency_ms).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let avg = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<f64>() / latencies.len() as f64
    };

    BenchmarkResult {
        image: image.to_string(),
        duration_seconds,
        throughput_tps: if duration_seconds == 0 {
            0.0
        } else {
            samples.len() as f64 / duration_seconds as f64
        },
        avg_latency_ms: avg,
        p50_latency_ms: percentile(&latencies, 0.50),
        p95_latency_ms: percentile(&latencies, 0.95),
        p99_latency_ms: percentile(&latencies, 0.99),
        max_latency_ms: latencies.last().copied().unwrap_or(0.0),
        error_rate_percent: errors as f64 / samples.len() as f64 * 100.0,
        benchmark_type,
        timestamp: Utc::now(),
        warnings: Vec::new(),
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64 * q).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}
