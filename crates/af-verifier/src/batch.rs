//! Batch scheduling over the shared per-stage semaphores.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use af_schemas::VerifyError;

use crate::context::VerifierContext;
use crate::pipeline::{verify_agent, VerifyOptions};
use crate::report::VerificationReport;

/// One agent whose pipeline could not produce a Fort Score at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub image: String,
    pub error: VerifyError,
}

/// Aggregate result of a batch run. `results` and `failures` preserve the
/// input ordering of their images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_fort_score: f64,
    pub processing_time_seconds: f64,
    pub results: Vec<VerificationReport>,
    pub failures: Vec<BatchFailure>,
}

/// Verify a batch of images.
///
/// Every pipeline runs as its own task: a crash or failure in one never
/// cancels or starves its siblings. Global backpressure comes from the
/// context's per-stage semaphores; there are no unbounded queues.
pub async fn verify_batch(
    ctx: Arc<VerifierContext>,
    images: &[String],
    opts: &VerifyOptions,
    cancel: &CancellationToken,
) -> BatchReport {
    let started = std::time::Instant::now();
    info!(total = images.len(), "starting batch verification");

    let mut handles = Vec::with_capacity(images.len());
    for image in images {
        let ctx = Arc::clone(&ctx);
        let opts = opts.clone();
        let image = image.clone();
        let cancel = cancel.child_token();

        handles.push((
            image.clone(),
            tokio::spawn(async move { verify_agent(&ctx, &image, &opts, &cancel).await }),
        ));
    }

    let mut results = Vec::new();
    let mut failures = Vec::new();

    for (image, handle) in handles {
        match handle.await {
            Ok(Ok(report)) => results.push(report),
            Ok(Err(err)) => {
                warn!(%image, error = %err, "pipeline failed");
                failures.push(BatchFailure { image, error: err });
            }
            Err(join_err) => {
                warn!(%image, error = %join_err, "pipeline task crashed");
                failures.push(BatchFailure {
                    image,
                    error: VerifyError::Config {
                        message: format!("pipeline task crashed: {join_err}"),
                    },
                });
            }
        }
    }

    let successful = results.len();
    let average_fort_score = if successful == 0 {
        0.0
    } else {
        results.iter().map(|r| r.agent_fort_score as f64).sum::<f64>() / successful as f64
    };

    BatchReport {
        total: images.len(),
        successful,
        failed: failures.len(),
        average_fort_score,
        processing_time_seconds: started.elapsed().as_secs_f64(),
        results,
        failures,
    }
}
