//! One benchmark run: resolve revisions, audit, compare, persist.
//!
//! Every step awaits the previous one; later steps depend on the revision
//! resolved first, so nothing here runs concurrently.

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use perfgate_core::{Config, PublishConfig, ReportFormat};
use tracing::{error, info, warn};

use crate::{
  BenchmarkError, Result,
  audit::{AuditOptions, AuditOutput, AuditRunner},
  metrics::MetricSet,
  reports::{Digests, Report, ReportPayload, ReportStore, StoredLocation, compare},
  vcs::{PublishRequest, SourceControl},
};

/// Everything a run needs to know, passed in explicitly.
#[derive(Debug, Clone)]
pub struct RunConfig {
  /// Ref to compare against; `None` disables comparison
  pub benchmark_ref: Option<String>,
  /// Bypass the trunk-skip guard
  pub is_local_run: bool,
  /// Permit writing (and publishing) the canonical trunk baseline
  pub update_baseline: bool,
  pub output_formats: BTreeSet<ReportFormat>,
  pub target_url: Option<String>,
  /// Used when `target_url` is unset; `{revision}` is substituted
  pub url_template: Option<String>,
  pub trunk_branch: String,
  pub trunk_ref: String,
  pub audit: AuditOptions,
  pub metrics: MetricSet,
}

impl RunConfig {
  pub fn from_config(config: &Config) -> Self {
    let audit = AuditOptions::from_config(&config.audit);
    Self {
      benchmark_ref: None,
      is_local_run: false,
      update_baseline: false,
      output_formats: audit.requested_formats(),
      target_url: config.audit.target_url.clone(),
      url_template: config.audit.url_template.clone(),
      trunk_branch: config.benchmark.trunk_branch.clone(),
      trunk_ref: config.benchmark.trunk_ref.clone(),
      audit,
      metrics: MetricSet::from_config(&config.benchmark),
    }
  }

  /// URL to audit for a revision.
  pub fn target_url_for(&self, revision: &str) -> Result<String> {
    if let Some(url) = self.target_url.as_deref().filter(|u| !u.trim().is_empty()) {
      return Ok(url.trim().to_string());
    }

    match &self.url_template {
      Some(template) => Ok(template.replace("{revision}", revision.trim())),
      None => Err(BenchmarkError::Config(
        "no target URL: pass --url or set audit.target_url / audit.url_template".to_string(),
      )),
    }
  }
}

/// States of a run that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
  ResolvingRevision,
  FetchingCurrentReport,
  ResolvingBaseline,
  LoadingBaseline,
  Comparing,
  Persisting,
}

impl RunStage {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunStage::ResolvingRevision => "resolving revision",
      RunStage::FetchingCurrentReport => "fetching current report",
      RunStage::ResolvingBaseline => "resolving baseline",
      RunStage::LoadingBaseline => "loading baseline",
      RunStage::Comparing => "comparing",
      RunStage::Persisting => "persisting",
    }
  }
}

impl std::fmt::Display for RunStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// What happened to the baseline comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonStatus {
  NotRequested,
  /// Benchmarking trunk against itself; the report is its own baseline
  BaselineIsCurrent,
  BaselineMissing { baseline: String },
  BaselineUnreadable { baseline: String, reason: String },
  Compared {
    baseline: String,
    regressions: usize,
    improvements: usize,
  },
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
  pub revision: String,
  pub report_locations: Vec<StoredLocation>,
  pub digest_locations: Vec<StoredLocation>,
  pub comparison: ComparisonStatus,
}

impl RunSummary {
  /// The main stored report: JSON when written, otherwise the first format.
  pub fn primary_report(&self) -> Option<&StoredLocation> {
    self
      .report_locations
      .iter()
      .find(|l| l.format == ReportFormat::Json)
      .or_else(|| self.report_locations.first())
  }

  /// Every file written by the run, digests first.
  pub fn publish_files(&self) -> Vec<PathBuf> {
    self
      .digest_locations
      .iter()
      .chain(self.report_locations.iter())
      .map(|l| l.path.clone())
      .collect()
  }

  pub fn has_regressions(&self) -> bool {
    matches!(self.comparison, ComparisonStatus::Compared { regressions, .. } if regressions > 0)
  }
}

/// Terminal value of a run, translated to an exit code at the boundary.
#[derive(Debug)]
pub enum RunOutcome {
  Done(RunSummary),
  /// Trunk merge; nothing was audited or written
  Skipped { revision: String },
  Failed { stage: RunStage, error: BenchmarkError },
}

impl RunOutcome {
  pub fn is_success(&self) -> bool {
    !matches!(self, RunOutcome::Failed { .. })
  }

  pub fn exit_code(&self) -> i32 {
    if self.is_success() { 0 } else { 1 }
  }
}

type StageResult<T> = std::result::Result<T, (RunStage, BenchmarkError)>;

trait AtStage<T> {
  fn at(self, stage: RunStage) -> StageResult<T>;
}

impl<T> AtStage<T> for Result<T> {
  fn at(self, stage: RunStage) -> StageResult<T> {
    self.map_err(|e| (stage, e))
  }
}

/// Drives a single benchmark run.
pub struct BenchmarkRun {
  config: RunConfig,
  store: ReportStore,
  source_control: Arc<dyn SourceControl>,
  audit: Arc<dyn AuditRunner>,
}

impl BenchmarkRun {
  pub fn new(
    config: RunConfig,
    store: ReportStore,
    source_control: Arc<dyn SourceControl>,
    audit: Arc<dyn AuditRunner>,
  ) -> Self {
    Self {
      config,
      store,
      source_control,
      audit,
    }
  }

  pub fn config(&self) -> &RunConfig {
    &self.config
  }

  pub fn store(&self) -> &ReportStore {
    &self.store
  }

  /// Execute the run to a terminal outcome.
  pub async fn run(&self) -> RunOutcome {
    match self.execute().await {
      Ok(outcome) => outcome,
      Err((stage, error)) => {
        error!(stage = %stage, error = %error, "Benchmark run failed");
        RunOutcome::Failed { stage, error }
      }
    }
  }

  async fn execute(&self) -> StageResult<RunOutcome> {
    let config = &self.config;

    let revision = self
      .source_control
      .current_revision()
      .await
      .at(RunStage::ResolvingRevision)?
      .trim()
      .to_string();
    let on_trunk = revision == config.trunk_branch;
    info!(revision = %revision, on_trunk, "Resolved current revision");

    if on_trunk && !config.update_baseline && !config.is_local_run {
      info!("Skipping lighthouse report on {} merge", config.trunk_branch);
      return Ok(RunOutcome::Skipped { revision });
    }

    let url = config.target_url_for(&revision).at(RunStage::FetchingCurrentReport)?;
    let mut options = config.audit.clone();
    options.formats = config.output_formats.clone();
    info!(runner = self.audit.name(), url = %url, "Starting lighthouse report");
    let AuditOutput { report, payloads } = self
      .audit
      .run(&url, &options)
      .await
      .at(RunStage::FetchingCurrentReport)?;

    let current = Report {
      revision: revision.clone(),
      metrics: report.metrics,
    };

    let (comparison, digests) = match &config.benchmark_ref {
      None => (ComparisonStatus::NotRequested, None),
      Some(benchmark_ref) => self.compare_against(benchmark_ref, &current, on_trunk).await?,
    };

    // Persisting: clear the folder, then digests, then the report
    self.store.recreate_folder(&revision).await.at(RunStage::Persisting)?;

    let digest_locations = match &digests {
      Some(digests) => digests.persist(&self.store).await.at(RunStage::Persisting)?,
      None => Vec::new(),
    };

    let payloads = self.report_payloads(&current, payloads).at(RunStage::Persisting)?;
    let report_locations = self
      .store
      .write_all(&revision, &payloads, None)
      .await
      .at(RunStage::Persisting)?;

    let summary = RunSummary {
      revision,
      report_locations,
      digest_locations,
      comparison,
    };
    if let Some(primary) = summary.primary_report() {
      info!("Report saved to {}", primary.path.display());
    }

    Ok(RunOutcome::Done(summary))
  }

  /// `report.json` is always written; the baseline of later runs is read
  /// from it. Other formats follow in requested order.
  fn report_payloads(&self, current: &Report, payloads: Vec<ReportPayload>) -> Result<Vec<ReportPayload>> {
    let (json, others): (Vec<_>, Vec<_>) = payloads.into_iter().partition(|p| p.format == ReportFormat::Json);

    let json = match json.into_iter().next() {
      Some(payload) => payload,
      None => ReportPayload::new(ReportFormat::Json, current.to_json_pretty()?),
    };

    let mut all = vec![json];
    all.extend(others.into_iter().filter(|p| self.config.output_formats.contains(&p.format)));
    Ok(all)
  }

  async fn compare_against(
    &self,
    benchmark_ref: &str,
    current: &Report,
    on_trunk: bool,
  ) -> StageResult<(ComparisonStatus, Option<Digests>)> {
    let config = &self.config;
    let is_trunk_ref = benchmark_ref == config.trunk_ref;

    if is_trunk_ref && on_trunk && !config.is_local_run {
      warn!("Running on {}, benchmarking is skipped", config.trunk_branch);
      return Ok((ComparisonStatus::BaselineIsCurrent, None));
    }

    let resolved = self
      .source_control
      .resolve_revision(benchmark_ref)
      .await
      .at(RunStage::ResolvingBaseline)?;
    let baseline_key = if is_trunk_ref {
      config.trunk_branch.clone()
    } else {
      resolved.trim().to_string()
    };
    info!(benchmark = %benchmark_ref, baseline = %baseline_key, "Resolved baseline");

    let baseline = match self.store.read(&baseline_key, ReportFormat::Json, None).await {
      Ok(baseline) => baseline,
      Err(e) if e.is_not_found() => {
        warn!(error = %e, "Could not parse and compare: no baseline report yet");
        return Ok((ComparisonStatus::BaselineMissing { baseline: baseline_key }, None));
      }
      Err(BenchmarkError::Json(e)) => {
        warn!(error = %e, baseline = %baseline_key, "Could not parse and compare: baseline report is malformed");
        return Ok((
          ComparisonStatus::BaselineUnreadable {
            baseline: baseline_key,
            reason: e.to_string(),
          },
          None,
        ));
      }
      Err(e) => return Err((RunStage::LoadingBaseline, e)),
    };

    let outcomes = compare(current, &baseline, &config.metrics);
    let digests = Digests::build(&outcomes, &current.revision);
    info!(
      baseline = %baseline_key,
      regressions = digests.regressions.len(),
      improvements = digests.improvements.len(),
      "Comparison finished"
    );

    let status = ComparisonStatus::Compared {
      baseline: baseline_key,
      regressions: digests.regressions.len(),
      improvements: digests.improvements.len(),
    };
    Ok((status, Some(digests)))
  }

  /// Pushes implied by a completed run: per-revision reports to the reports
  /// remote, and the trunk baseline when `update_baseline` is set. Local runs
  /// publish nothing.
  pub fn publish_requests(&self, summary: &RunSummary, publish: &PublishConfig) -> Vec<PublishRequest> {
    let config = &self.config;
    if config.is_local_run {
      return Vec::new();
    }

    let files = summary.publish_files();
    let mut requests = Vec::new();

    if summary.revision != config.trunk_branch {
      requests.push(PublishRequest {
        files: files.clone(),
        remote: publish.reports_remote.clone(),
        target_ref: summary.revision.clone(),
        message: format!("Report files for {}", summary.revision),
      });
    }

    if config.update_baseline {
      requests.push(PublishRequest {
        files,
        remote: publish.baseline_remote.clone(),
        target_ref: config.trunk_branch.clone(),
        message: "RELEASE: Update lighthouse report".to_string(),
      });
    }

    requests
  }

  /// Publish a completed run through the source-control collaborator.
  pub async fn publish(&self, summary: &RunSummary, publish: &PublishConfig) -> Result<()> {
    let requests = self.publish_requests(summary, publish);
    if requests.is_empty() {
      info!("Nothing to publish for this run");
    }

    for request in &requests {
      info!(remote = %request.remote, target = %request.target_ref, "Sending reports");
      self.source_control.publish(request).await?;
    }
    Ok(())
  }
}
