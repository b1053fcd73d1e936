//! Source-control access through the git CLI.

use std::{ffi::OsStr, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use perfgate_core::BenchmarkConfig;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{BenchmarkError, Result};

/// Files to publish and where to push them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
  pub files: Vec<PathBuf>,
  pub remote: String,
  pub target_ref: String,
  pub message: String,
}

/// Revision lookup and publishing.
#[async_trait]
pub trait SourceControl: Send + Sync {
  /// Identifier of the working state: the trunk branch name when nothing is
  /// ahead of trunk, else the newest commit hash.
  async fn current_revision(&self) -> Result<String>;

  /// Resolve a ref to a commit hash.
  async fn resolve_revision(&self, reference: &str) -> Result<String>;

  /// Commit the given files and push them to `remote` at `target_ref`.
  async fn publish(&self, request: &PublishRequest) -> Result<()>;
}

/// git invoked as an external process.
#[derive(Debug, Clone)]
pub struct GitCli {
  trunk_branch: String,
  trunk_ref: String,
  workdir: Option<PathBuf>,
}

impl GitCli {
  pub fn new(trunk_branch: impl Into<String>, trunk_ref: impl Into<String>) -> Self {
    Self {
      trunk_branch: trunk_branch.into(),
      trunk_ref: trunk_ref.into(),
      workdir: None,
    }
  }

  pub fn from_config(config: &BenchmarkConfig) -> Self {
    Self::new(config.trunk_branch.clone(), config.trunk_ref.clone())
  }

  /// Run git inside `workdir` instead of the process working directory.
  pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
    self.workdir = Some(workdir.into());
    self
  }

  async fn git<I, S>(&self, args: I) -> std::result::Result<String, String>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    let mut cmd = Command::new("git");
    cmd
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(workdir) = &self.workdir {
      cmd.current_dir(workdir);
    }

    let output = cmd.output().await.map_err(|e| format!("failed to run git: {}", e))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!(stdout = %stdout.trim(), stderr = %String::from_utf8_lossy(&output.stderr).trim(), "git finished");

    if output.status.success() {
      Ok(stdout)
    } else {
      Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
  }
}

#[async_trait]
impl SourceControl for GitCli {
  async fn current_revision(&self) -> Result<String> {
    let range = format!("{}..HEAD", self.trunk_ref);
    let stdout = self
      .git(["rev-list", range.as_str()])
      .await
      .map_err(BenchmarkError::SourceControl)?;
    Ok(revision_from_rev_list(&stdout, &self.trunk_branch))
  }

  async fn resolve_revision(&self, reference: &str) -> Result<String> {
    let stdout = self
      .git(["rev-parse", "--verify", reference])
      .await
      .map_err(|reason| BenchmarkError::RevisionResolution {
        reference: reference.to_string(),
        reason,
      })?;

    match stdout.lines().next().map(str::trim).filter(|s| !s.is_empty()) {
      Some(hash) => Ok(hash.to_string()),
      None => Err(BenchmarkError::RevisionResolution {
        reference: reference.to_string(),
        reason: "git returned no revision".to_string(),
      }),
    }
  }

  async fn publish(&self, request: &PublishRequest) -> Result<()> {
    if request.files.is_empty() {
      debug!("Nothing to publish");
      return Ok(());
    }

    let mut add = vec![OsStr::new("add"), OsStr::new("--")];
    add.extend(request.files.iter().map(|p| p.as_os_str()));
    self.git(add).await.map_err(BenchmarkError::SourceControl)?;

    // `diff --quiet` exits non-zero when something is staged
    if self.git(["diff", "--cached", "--quiet"]).await.is_err() {
      self
        .git(["commit", "-m", request.message.as_str()])
        .await
        .map_err(BenchmarkError::SourceControl)?;
    } else {
      debug!("Files already committed, pushing only");
    }

    let refspec = format!("HEAD:{}", request.target_ref);
    self
      .git(["push", request.remote.as_str(), refspec.as_str()])
      .await
      .map_err(BenchmarkError::SourceControl)?;

    info!(remote = %request.remote, target = %request.target_ref, files = request.files.len(), "Published reports");
    Ok(())
  }
}

/// Newest commit ahead of trunk, or the trunk branch when nothing is ahead.
fn revision_from_rev_list(stdout: &str, trunk_branch: &str) -> String {
  stdout
    .lines()
    .map(str::trim)
    .find(|line| !line.is_empty())
    .unwrap_or(trunk_branch)
    .to_string()
}
