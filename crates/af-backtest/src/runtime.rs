//! Container runtime seam.
//!
//! The backtester and the benchmark probe drive containers through this
//! trait so their logic is testable without a docker daemon. The production
//! implementation shells out to the docker CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use uuid::Uuid;

/// How a container should be started.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub env: BTreeMap<String, String>,
    /// (host_path, container_path) read-only bind mounts.
    pub mounts: Vec<(PathBuf, String)>,
    /// docker `--memory` value, e.g. "1g".
    pub memory_limit: String,
    /// docker `--cpus` value.
    pub cpus: f64,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            env: BTreeMap::new(),
            mounts: Vec::new(),
            memory_limit: "1g".to_string(),
            cpus: 0.5,
        }
    }
}

/// Outcome of one container run.
#[derive(Debug, Clone)]
pub struct ContainerRun {
    /// Complete stdout, in emission order.
    pub stdout: String,
    pub timed_out: bool,
    /// Present only for runs that exited on their own.
    pub exit_code: Option<i32>,
}

/// Container operations used by the verification pipeline.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Is the image present locally?
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Run the container, stream stdout until exit or `hard_timeout`, then
    /// force-remove it. Must leave no container behind in any outcome.
    async fn run_collect(&self, spec: &ContainerSpec, hard_timeout: Duration)
        -> Result<ContainerRun>;
}

/// Production runtime using the docker CLI via `tokio::process`.
#[derive(Debug, Default)]
pub struct DockerCliRuntime;

#[async_trait::async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let out = tokio::process::Command::new("docker")
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("spawn docker image inspect")?;
        Ok(out.success())
    }

    async fn run_collect(
        &self,
        spec: &ContainerSpec,
        hard_timeout: Duration,
    ) -> Result<ContainerRun> {
        let name = format!("af-run-{}", Uuid::new_v4());

        let mut cmd = tokio::process::Command::new("docker");
        cmd.arg("run")
            .args(["--name", &name])
            .args(["--network", "bridge"])
            .args(["--memory", &spec.memory_limit])
            .args(["--cpus", &format!("{}", spec.cpus)]);
        for (k, v) in &spec.env {
            cmd.args(["-e", &format!("{k}={v}")]);
        }
        for (host, container) in &spec.mounts {
            cmd.args(["-v", &format!("{}:{container}:ro", host.display())]);
        }
        cmd.arg(&spec.image);
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = cmd.spawn().context("spawn docker run")?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("docker run stdout not captured"))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut collected = String::new();
        let mut timed_out = false;

        let deadline = tokio::time::Instant::now() + hard_timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, lines.next_line()).await;
            match next {
                Ok(Ok(Some(line))) => {
                    collected.push_str(&line);
                    collected.push('\n');
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    warn!(container = %name, error = %e, "stdout read failed");
                    break;
                }
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let exit_code = if timed_out {
            let _ = child.kill().await;
            None
        } else {
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(container = %name, error = %e, "wait failed");
                    None
                }
            }
        };

        // Force-remove regardless of outcome: no orphan containers.
        let rm = tokio::process::Command::new("docker")
            .args(["rm", "-f", &name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = rm {
            warn!(container = %name, error = %e, "force remove failed");
        }

        debug!(container = %name, timed_out, ?exit_code, "container run finished");

        Ok(ContainerRun {
            stdout: collected,
            timed_out,
            exit_code,
        })
    }
}
