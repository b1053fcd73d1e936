//! Common test utilities for orchestrator integration tests
//!
//! Fakes for the source-control and audit collaborators plus helpers to seed
//! a reports directory.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use perfgate::{
  AuditOptions, AuditOutput, AuditRunner, BenchmarkError, BenchmarkRun, MetricResult, PublishRequest, Report,
  ReportFormat, ReportPayload, ReportStore, Result, RunConfig, SourceControl,
};
use perfgate_core::Config;
use tempfile::TempDir;

pub const PREFIX: &str = "automated-lighthouse-";

/// Source control with a fixed current revision and a table of resolvable refs
#[allow(dead_code)]
pub struct FakeSourceControl {
  pub revision: String,
  pub refs: HashMap<String, String>,
  pub published: Mutex<Vec<PublishRequest>>,
}

#[allow(dead_code)]
impl FakeSourceControl {
  pub fn on(revision: &str) -> Self {
    let refs = HashMap::from([("origin/master".to_string(), "1111111".to_string())]);
    Self {
      revision: revision.to_string(),
      refs,
      published: Mutex::new(Vec::new()),
    }
  }

  pub fn with_ref(mut self, reference: &str, hash: &str) -> Self {
    self.refs.insert(reference.to_string(), hash.to_string());
    self
  }

  pub fn published(&self) -> Vec<PublishRequest> {
    self.published.lock().unwrap().clone()
  }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
  async fn current_revision(&self) -> Result<String> {
    Ok(self.revision.clone())
  }

  async fn resolve_revision(&self, reference: &str) -> Result<String> {
    self
      .refs
      .get(reference)
      .cloned()
      .ok_or_else(|| BenchmarkError::RevisionResolution {
        reference: reference.to_string(),
        reason: "unknown revision".to_string(),
      })
  }

  async fn publish(&self, request: &PublishRequest) -> Result<()> {
    self.published.lock().unwrap().push(request.clone());
    Ok(())
  }
}

/// Audit runner returning a canned report, or failing
#[allow(dead_code)]
pub struct FakeAudit {
  pub report: Option<Report>,
  pub calls: AtomicUsize,
  pub last_url: Mutex<Option<String>>,
  pub last_options: Mutex<Option<AuditOptions>>,
}

#[allow(dead_code)]
impl FakeAudit {
  pub fn returning(report: Report) -> Self {
    Self {
      report: Some(report),
      calls: AtomicUsize::new(0),
      last_url: Mutex::new(None),
      last_options: Mutex::new(None),
    }
  }

  pub fn failing() -> Self {
    Self {
      report: None,
      calls: AtomicUsize::new(0),
      last_url: Mutex::new(None),
      last_options: Mutex::new(None),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn last_url(&self) -> Option<String> {
    self.last_url.lock().unwrap().clone()
  }

  pub fn last_options(&self) -> Option<AuditOptions> {
    self.last_options.lock().unwrap().clone()
  }
}

#[async_trait]
impl AuditRunner for FakeAudit {
  fn name(&self) -> &str {
    "fake"
  }

  async fn run(&self, url: &str, options: &AuditOptions) -> Result<AuditOutput> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.last_url.lock().unwrap() = Some(url.to_string());
    *self.last_options.lock().unwrap() = Some(options.clone());

    let Some(report) = self.report.clone() else {
      return Err(BenchmarkError::Audit("lighthouse exited with status 1".to_string()));
    };

    let payloads = options
      .requested_formats()
      .into_iter()
      .map(|format| match format {
        ReportFormat::Json => ReportPayload::new(format, report.to_json_pretty().unwrap()),
        ReportFormat::Html => ReportPayload::new(format, "<html><body>report</body></html>"),
      })
      .collect();

    Ok(AuditOutput { report, payloads })
  }
}

/// A report with the two scored checks of the default metric set
#[allow(dead_code)]
pub fn scored_report(interactive: (f64, f64), main_thread: (f64, f64)) -> Report {
  Report::new("")
    .with_metric("interactive", MetricResult::scored(interactive.0, interactive.1))
    .with_metric("mainthread-work-breakdown", MetricResult::scored(main_thread.0, main_thread.1))
}

/// Run config pointed at a fixed URL, no comparison requested
#[allow(dead_code)]
pub fn run_config() -> RunConfig {
  let mut config = RunConfig::from_config(&Config::default());
  config.target_url = Some("http://localhost:3000".to_string());
  config
}

#[allow(dead_code)]
pub fn store(dir: &TempDir) -> ReportStore {
  ReportStore::new(dir.path(), PREFIX)
}

/// Seed a stored JSON report for `revision`
#[allow(dead_code)]
pub async fn seed_report(store: &ReportStore, revision: &str, report: &Report) {
  let payload = ReportPayload::new(ReportFormat::Json, report.to_json_pretty().unwrap());
  store.write(revision, &payload, None).await.unwrap();
}

#[allow(dead_code)]
pub fn benchmark_run(
  config: RunConfig,
  store: ReportStore,
  source_control: Arc<FakeSourceControl>,
  audit: Arc<FakeAudit>,
) -> BenchmarkRun {
  BenchmarkRun::new(config, store, source_control, audit)
}
