//! On-disk layout of reports, one folder per revision.

use std::path::{Path, PathBuf};

use perfgate_core::{ReportFormat, StorageConfig};
use tracing::{debug, info};

use super::{Report, ReportPayload};
use crate::{BenchmarkError, Result};

/// Base name of the report file inside a revision folder
pub const DEFAULT_FILE_NAME: &str = "report";

/// Where a payload was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLocation {
  pub revision: String,
  pub format: ReportFormat,
  pub file_name: String,
  pub path: PathBuf,
}

/// Sole reader and writer of persisted reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
  reports_dir: PathBuf,
  folder_prefix: String,
}

impl ReportStore {
  pub fn new(reports_dir: impl Into<PathBuf>, folder_prefix: impl Into<String>) -> Self {
    Self {
      reports_dir: reports_dir.into(),
      folder_prefix: folder_prefix.into(),
    }
  }

  pub fn from_config(config: &StorageConfig) -> Self {
    Self::new(config.reports_dir.clone(), config.folder_prefix.clone())
  }

  pub fn reports_dir(&self) -> &Path {
    &self.reports_dir
  }

  /// Folder holding every stored artifact of a revision.
  ///
  /// Revisions usually come from git stdout, so only the first line is used,
  /// trimmed, with path separators flattened to `-`.
  pub fn resolve_folder(&self, revision: &str) -> PathBuf {
    self
      .reports_dir
      .join(format!("{}{}", self.folder_prefix, sanitize_revision(revision)))
  }

  /// Path of `<file_name>.<ext>` inside a folder.
  pub fn resolve_path(folder: &Path, format: ReportFormat, file_name: Option<&str>) -> PathBuf {
    let file_name = file_name.unwrap_or(DEFAULT_FILE_NAME);
    folder.join(format!("{}.{}", file_name, format.extension()))
  }

  /// Full location for a (revision, format, file name) triple.
  pub fn locate(&self, revision: &str, format: ReportFormat, file_name: Option<&str>) -> StoredLocation {
    let folder = self.resolve_folder(revision);
    StoredLocation {
      revision: sanitize_revision(revision),
      format,
      file_name: file_name.unwrap_or(DEFAULT_FILE_NAME).to_string(),
      path: Self::resolve_path(&folder, format, file_name),
    }
  }

  /// Write one payload, creating the revision folder if needed. Overwrites.
  pub async fn write(&self, revision: &str, payload: &ReportPayload, file_name: Option<&str>) -> Result<StoredLocation> {
    let location = self.locate(revision, payload.format, file_name);
    tokio::fs::create_dir_all(self.resolve_folder(revision)).await?;
    tokio::fs::write(&location.path, payload.body.as_bytes()).await?;

    debug!(path = %location.path.display(), bytes = payload.body.len(), "Wrote payload");
    Ok(location)
  }

  /// Write every representation of an audit result under one base name.
  pub async fn write_all(
    &self,
    revision: &str,
    payloads: &[ReportPayload],
    file_name: Option<&str>,
  ) -> Result<Vec<StoredLocation>> {
    let mut locations = Vec::with_capacity(payloads.len());
    for payload in payloads {
      locations.push(self.write(revision, payload, file_name).await?);
    }
    Ok(locations)
  }

  /// Load a stored report.
  ///
  /// A missing file is reported as [`BenchmarkError::NotFound`] so callers can
  /// tell "no baseline yet" apart from real I/O failures.
  pub async fn read(&self, revision: &str, format: ReportFormat, file_name: Option<&str>) -> Result<Report> {
    if format != ReportFormat::Json {
      return Err(BenchmarkError::UnsupportedFormat(format));
    }

    let location = self.locate(revision, format, file_name);
    let json = match tokio::fs::read_to_string(&location.path).await {
      Ok(json) => json,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(BenchmarkError::NotFound { path: location.path });
      }
      Err(e) => return Err(e.into()),
    };

    Report::from_json(&location.revision, &json)
  }

  /// Clear a revision folder and make it again.
  pub async fn recreate_folder(&self, revision: &str) -> Result<PathBuf> {
    let folder = self.resolve_folder(revision);
    match tokio::fs::remove_dir_all(&folder).await {
      Ok(()) => info!(folder = %folder.display(), "Cleared previous reports"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(&folder).await?;
    Ok(folder)
  }
}

fn sanitize_revision(revision: &str) -> String {
  let sanitized = revision
    .trim()
    .lines()
    .next()
    .unwrap_or_default()
    .trim()
    .replace(['/', '\\'], "-");

  // Empty and dot-only names would resolve to the reports dir or its parent
  if sanitized.chars().all(|c| c == '.') {
    return format!("_{}", sanitized.replace('.', "_"));
  }
  sanitized
}
