//! Lighthouse benchmark gate
//!
//! Runs an audit against a build, stores the report keyed by git revision and
//! diffs it against a stored baseline report to flag regressions and
//! improvements.
//!
//! ## Key Concepts
//!
//! - **Reports**: Lighthouse JSON parsed into a typed `Report`, stored one folder per revision
//! - **Metrics**: the allow-list of checks evaluated by the comparator
//! - **Digests**: persisted `regressions-digest.json` / `improvements-digest.json`
//! - **Orchestrator**: the single sequential run tying the pieces together

pub mod audit;
pub mod metrics;
pub mod orchestrator;
pub mod reports;
pub mod vcs;

pub use audit::{AuditOptions, AuditOutput, AuditRunner, LighthouseCli};
pub use metrics::{MetricCheck, MetricKind, MetricSet};
pub use orchestrator::{BenchmarkRun, ComparisonStatus, RunConfig, RunOutcome, RunStage, RunSummary};
pub use perfgate_core::ReportFormat;
pub use reports::{
  ComparisonOutcome, Digest, DigestCategory, DigestEntry, Digests, Direction, MetricDetails, MetricResult, Report,
  ReportPayload, ReportStore, StoredLocation, compare,
};
pub use vcs::{GitCli, PublishRequest, SourceControl};

use std::path::PathBuf;

use thiserror::Error;

/// Benchmark-specific errors
#[derive(Debug, Error)]
pub enum BenchmarkError {
  #[error("No stored report at {}", path.display())]
  NotFound { path: PathBuf },

  #[error("Audit failed: {0}")]
  Audit(String),

  #[error("Could not resolve revision '{reference}': {reason}")]
  RevisionResolution { reference: String, reason: String },

  #[error("Source control error: {0}")]
  SourceControl(String),

  #[error("Malformed metric '{metric}': {reason}")]
  MetricParse { metric: String, reason: String },

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Reports in {0} format cannot be parsed")]
  UnsupportedFormat(ReportFormat),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl BenchmarkError {
  /// Whether this is the "nothing stored yet" signal rather than a real failure
  pub fn is_not_found(&self) -> bool {
    matches!(self, BenchmarkError::NotFound { .. })
  }
}

pub type Result<T> = std::result::Result<T, BenchmarkError>;
