//! Verification orchestrator and public API.
//!
//! One pipeline per agent: the image scan completes first (the judge's
//! context derives from its report), then attestation, backtest, judge and
//! the benchmark probe fan out concurrently under global per-stage
//! semaphores and deadlines; the strategy verifier and the score engine then
//! consume the completed outputs (or their declared failures). Batch mode
//! multiplexes pipelines over the same semaphores with full failure
//! isolation.

pub mod batch;
pub mod context;
pub mod evidence;
pub mod limits;
pub mod pipeline;
pub mod report;

pub use batch::{verify_batch, BatchFailure, BatchReport};
pub use context::VerifierContext;
pub use evidence::{DockerHashEvidence, EvidenceSource, FixedEvidence};
pub use limits::{ResourceLimits, StageDeadlines};
pub use pipeline::{verify_agent, VerifyOptions};
pub use report::{LlmAnalysis, VerificationReport};
