//! Audit execution through the Lighthouse CLI.
//!
//! The CLI launches and tears down Chrome itself; this module only shapes the
//! invocation and collects the written reports.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::{Path, PathBuf},
  process::Stdio,
  time::{Duration, Instant},
};

use async_trait::async_trait;
use perfgate_core::{AuditConfig, ReportFormat};
use tokio::{process::Command, time::timeout};
use tracing::{debug, error, info};

use crate::{
  BenchmarkError, Result,
  reports::{Report, ReportPayload},
};

/// Options of a single audit run.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOptions {
  /// Formats to write; JSON is always produced alongside them
  pub formats: BTreeSet<ReportFormat>,
  pub chrome_flags: Vec<String>,
  pub extra_headers: BTreeMap<String, String>,
  pub config_path: Option<PathBuf>,
  pub timeout: Duration,
}

impl Default for AuditOptions {
  fn default() -> Self {
    Self::from_config(&AuditConfig::default())
  }
}

impl AuditOptions {
  pub fn from_config(config: &AuditConfig) -> Self {
    Self {
      formats: config.formats.iter().copied().collect(),
      chrome_flags: config.chrome_flags.clone(),
      extra_headers: config.extra_headers.clone(),
      config_path: config.config_path.clone(),
      timeout: Duration::from_secs(config.timeout_secs),
    }
  }

  /// Run Chrome with a visible window.
  pub fn headful(mut self) -> Self {
    self.chrome_flags.retain(|flag| flag != "--headless" && !flag.starts_with("--headless="));
    self
  }

  /// Formats returned to the caller.
  pub fn requested_formats(&self) -> BTreeSet<ReportFormat> {
    if self.formats.is_empty() {
      BTreeSet::from([ReportFormat::Json])
    } else {
      self.formats.clone()
    }
  }
}

/// Result of one audit: the parsed report plus every requested serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOutput {
  pub report: Report,
  pub payloads: Vec<ReportPayload>,
}

impl AuditOutput {
  pub fn payload(&self, format: ReportFormat) -> Option<&ReportPayload> {
    self.payloads.iter().find(|p| p.format == format)
  }
}

/// Produces a structured report for a URL.
#[async_trait]
pub trait AuditRunner: Send + Sync {
  /// The name of this runner (for logging)
  fn name(&self) -> &str;

  async fn run(&self, url: &str, options: &AuditOptions) -> Result<AuditOutput>;
}

/// Lighthouse invoked as an external process.
#[derive(Debug, Clone)]
pub struct LighthouseCli {
  program: String,
  prefix_args: Vec<String>,
}

impl LighthouseCli {
  /// `command` may carry leading arguments, e.g. `npx lighthouse`.
  pub fn new(command: &str) -> Self {
    let mut parts = command.split_whitespace().map(String::from);
    Self {
      program: parts.next().unwrap_or_else(|| "lighthouse".to_string()),
      prefix_args: parts.collect(),
    }
  }

  pub fn from_config(config: &AuditConfig) -> Self {
    Self::new(&config.command)
  }
}

impl Default for LighthouseCli {
  fn default() -> Self {
    Self::new("lighthouse")
  }
}

#[async_trait]
impl AuditRunner for LighthouseCli {
  fn name(&self) -> &str {
    "lighthouse-cli"
  }

  async fn run(&self, url: &str, options: &AuditOptions) -> Result<AuditOutput> {
    let start = Instant::now();
    let output_dir = tempfile::TempDir::new()?;
    let requested = options.requested_formats();
    let mut produced = requested.clone();
    produced.insert(ReportFormat::Json);

    let args = build_args(url, options, &produced, output_dir.path());
    info!(url = %url, formats = ?requested, "Running lighthouse");
    debug!(program = %self.program, args = ?args, "Spawning lighthouse process");

    let mut cmd = Command::new(&self.program);
    cmd
      .args(&self.prefix_args)
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let output = match timeout(options.timeout, cmd.output()).await {
      Ok(Ok(output)) => output,
      Ok(Err(e)) => {
        error!(err = %e, program = %self.program, "Failed to spawn lighthouse");
        return Err(BenchmarkError::Audit(format!("failed to spawn {}: {}", self.program, e)));
      }
      Err(_) => {
        return Err(BenchmarkError::Audit(format!(
          "timed out after {}s",
          options.timeout.as_secs()
        )));
      }
    };

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let exit_code = output.status.code().unwrap_or(-1);
      error!(exit_code, stderr = %stderr.chars().take(500).collect::<String>(), "Lighthouse failed");
      return Err(BenchmarkError::Audit(format!("lighthouse exited with status {}", exit_code)));
    }

    let mut bodies = BTreeMap::new();
    for format in &produced {
      let path = output_file(output_dir.path(), *format);
      let body = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| BenchmarkError::Audit(format!("missing {} output at {}: {}", format, path.display(), e)))?;
      bodies.insert(*format, body);
    }

    let json = bodies.get(&ReportFormat::Json).map(String::as_str).unwrap_or_default();
    let report =
      Report::from_json("", json).map_err(|e| BenchmarkError::Audit(format!("unparsable lighthouse report: {}", e)))?;

    let payloads = produced
      .iter()
      .filter_map(|format| bodies.remove(format).map(|body| ReportPayload::new(*format, body)))
      .collect();

    info!(
      elapsed_ms = start.elapsed().as_millis() as u64,
      audits = report.metrics.len(),
      "Lighthouse run completed"
    );

    Ok(AuditOutput { report, payloads })
  }
}

/// Where Lighthouse writes `format` for an output path inside `dir`.
fn output_file(dir: &Path, format: ReportFormat) -> PathBuf {
  dir.join(format!("audit.report.{}", format.extension()))
}

fn build_args(url: &str, options: &AuditOptions, formats: &BTreeSet<ReportFormat>, dir: &Path) -> Vec<String> {
  let mut args = vec![url.to_string()];

  for format in formats {
    args.push(format!("--output={}", format.extension()));
  }

  // A single output is written to the path as given; several outputs get
  // `<name>.report.<ext>` next to it.
  let output_path = match formats.iter().next() {
    Some(format) if formats.len() == 1 => output_file(dir, *format),
    _ => dir.join("audit"),
  };
  args.push(format!("--output-path={}", output_path.display()));

  if !options.chrome_flags.is_empty() {
    args.push(format!("--chrome-flags={}", options.chrome_flags.join(" ")));
  }

  if !options.extra_headers.is_empty()
    && let Ok(headers) = serde_json::to_string(&options.extra_headers)
  {
    args.push(format!("--extra-headers={}", headers));
  }

  if let Some(config_path) = &options.config_path {
    args.push(format!("--config-path={}", config_path.display()));
  }

  args.push("--quiet".to_string());
  args
}
