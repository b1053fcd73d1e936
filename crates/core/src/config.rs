//! Configuration system for perfgate with per-project overrides.
//!
//! Config priority: explicit path > project-relative (.perfgate.toml) > user (~/.config/perfgate/config.toml)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Errors raised while loading an explicitly requested config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Report Formats
// ============================================================================

/// Output format of a stored report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
  Json,
  Html,
}

impl ReportFormat {
  /// File extension token used in stored report paths
  pub fn extension(&self) -> &'static str {
    match self {
      ReportFormat::Json => "json",
      ReportFormat::Html => "html",
    }
  }
}

impl std::fmt::Display for ReportFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.extension())
  }
}

impl std::str::FromStr for ReportFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "json" => Ok(ReportFormat::Json),
      "html" => Ok(ReportFormat::Html),
      other => Err(format!("Unknown report format: {}", other)),
    }
  }
}

// ============================================================================
// Benchmark Configuration
// ============================================================================

/// Metrics compared when no explicit list is configured
pub const DEFAULT_METRICS: &[&str] = &["interactive", "mainthread-work-breakdown", "metrics"];

/// Baseline selection and comparison settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
  /// Name of the trunk branch, also the storage key of the canonical baseline
  pub trunk_branch: String,

  /// Remote ref used as the default benchmark and as the rev-list anchor
  pub trunk_ref: String,

  /// Registered comparison checks to evaluate (allow-list)
  pub metrics: Vec<String>,

  /// Additional scored audits to compare with generic messages
  pub extra_metrics: Vec<String>,
}

impl Default for BenchmarkConfig {
  fn default() -> Self {
    Self {
      trunk_branch: "master".to_string(),
      trunk_ref: "origin/master".to_string(),
      metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
      extra_metrics: Vec::new(),
    }
  }
}

// ============================================================================
// Audit Configuration
// ============================================================================

/// How the Lighthouse audit is invoked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
  /// Lighthouse executable
  pub command: String,

  /// Fixed URL to audit
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_url: Option<String>,

  /// URL template used when no target_url is set; `{revision}` is substituted
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url_template: Option<String>,

  /// Output formats persisted for each run
  pub formats: Vec<ReportFormat>,

  /// Flags forwarded to Chrome
  pub chrome_flags: Vec<String>,

  /// Upper bound for a single audit run
  pub timeout_secs: u64,

  /// Custom Lighthouse config file
  #[serde(skip_serializing_if = "Option::is_none")]
  pub config_path: Option<PathBuf>,

  /// Extra HTTP headers sent with every request of the audit
  pub extra_headers: BTreeMap<String, String>,
}

impl Default for AuditConfig {
  fn default() -> Self {
    Self {
      command: "lighthouse".to_string(),
      target_url: None,
      url_template: None,
      formats: vec![ReportFormat::Json, ReportFormat::Html],
      chrome_flags: vec![
        "--show-paint-rects".to_string(),
        "--headless".to_string(),
        "--ignore-certificate-errors".to_string(),
      ],
      timeout_secs: 300,
      config_path: None,
      extra_headers: BTreeMap::new(),
    }
  }
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// On-disk layout of stored reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Directory holding one folder per revision
  pub reports_dir: PathBuf,

  /// Prefix of every revision folder name
  pub folder_prefix: String,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      reports_dir: PathBuf::from("reports"),
      folder_prefix: "automated-lighthouse-".to_string(),
    }
  }
}

// ============================================================================
// Publish Configuration
// ============================================================================

/// Git remotes that receive published reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
  /// Remote receiving per-revision report refs
  pub reports_remote: String,

  /// Remote whose trunk branch holds the canonical baseline
  pub baseline_remote: String,
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      reports_remote: "lighthouse-base".to_string(),
      baseline_remote: "origin".to_string(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Complete perfgate configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub benchmark: BenchmarkConfig,
  pub audit: AuditConfig,
  pub storage: StorageConfig,
  pub publish: PublishConfig,
}

impl Config {
  /// Load an explicitly requested config file, surfacing read and parse errors
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load config for a project, with fallback to user config
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(content) = std::fs::read_to_string(&project_config)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(content) = std::fs::read_to_string(&user_config_path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    Self::default()
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PERFGATE_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("perfgate").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("perfgate").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".perfgate.toml")
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let metrics = DEFAULT_METRICS
      .iter()
      .map(|m| format!("\"{}\"", m))
      .collect::<Vec<_>>()
      .join(", ");

    format!(
      r#"# perfgate Configuration
# Place in .perfgate.toml (project) or ~/.config/perfgate/config.toml (user)

# ============================================================================
# Benchmark
# ============================================================================

[benchmark]
# Trunk branch; runs on trunk are skipped unless --update-baseline or --local
trunk_branch = "master"

# Default benchmark ref (used by a bare --benchmark)
trunk_ref = "origin/master"

# Comparison checks to evaluate
metrics = [{metrics}]

# Additional scored audits compared by score and rawValue
# extra_metrics = ["first-contentful-paint", "speed-index"]

# ============================================================================
# Audit
# ============================================================================

[audit]
command = "lighthouse"

# Either a fixed URL...
# target_url = "http://localhost:3000"
# ...or a template where {{revision}} is replaced by the current revision
# url_template = "https://pages.example/{{revision}}/build/index.html"

formats = ["json", "html"]
chrome_flags = ["--show-paint-rects", "--headless", "--ignore-certificate-errors"]
timeout_secs = 300

# Custom Lighthouse config
# config_path = "lighthouse.config.js"

[audit.extra_headers]
# shipping-module-version = "1.0.0"

# ============================================================================
# Storage
# ============================================================================

[storage]
reports_dir = "reports"
folder_prefix = "automated-lighthouse-"

# ============================================================================
# Publishing
# ============================================================================

[publish]
reports_remote = "lighthouse-base"
baseline_remote = "origin"
"#
    )
  }
}
