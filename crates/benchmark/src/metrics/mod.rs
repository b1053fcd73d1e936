//! Comparison allow-list.
//!
//! Only metrics registered here are ever compared; everything else in a
//! Lighthouse report is ignored. Two kinds of checks exist:
//! - Scored: classified by `score`, delta taken from `rawValue`
//! - SubReadings: a family of named readings under `details.items[0]`

use perfgate_core::BenchmarkConfig;
use tracing::debug;

/// Unit attached to rendered deltas
pub const DEFAULT_UNIT: &str = "ms";

/// How a registered metric is compared.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
  /// Compared by score, lower score is a regression
  Scored {
    regression_message: String,
    improvement_message: String,
  },
  /// Every named reading that grew is a regression; nothing else is flagged
  SubReadings { regression_message: String },
}

/// One registered comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCheck {
  /// Lighthouse audit id
  pub id: String,
  pub kind: MetricKind,
  /// Native unit of raw values
  pub unit: String,
}

impl MetricCheck {
  pub fn scored(id: impl Into<String>, regression_message: impl Into<String>, improvement_message: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind: MetricKind::Scored {
        regression_message: regression_message.into(),
        improvement_message: improvement_message.into(),
      },
      unit: DEFAULT_UNIT.to_string(),
    }
  }

  pub fn sub_readings(id: impl Into<String>, regression_message: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind: MetricKind::SubReadings {
        regression_message: regression_message.into(),
      },
      unit: DEFAULT_UNIT.to_string(),
    }
  }

  /// Scored check with messages derived from the audit id.
  pub fn generic_scored(id: impl Into<String>) -> Self {
    let id = id.into();
    Self::scored(
      id.clone(),
      format!("{} regressed against benchmark", id),
      format!("{} improved against benchmark", id),
    )
  }
}

/// Ordered set of checks evaluated by the comparator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricSet {
  checks: Vec<MetricCheck>,
}

impl MetricSet {
  /// Empty set.
  pub fn new() -> Self {
    Self { checks: Vec::new() }
  }

  /// The checks shipped with perfgate.
  pub fn builtin() -> Self {
    Self::new()
      .with(MetricCheck::scored(
        "interactive",
        "TTI is longer than benchmark",
        "TTI has improved from last version",
      ))
      .with(MetricCheck::scored(
        "mainthread-work-breakdown",
        "This hash is hogging more on the main thread than benchmark",
        "This hash has freed CPU workload compared to last release",
      ))
      .with(MetricCheck::sub_readings(
        "metrics",
        "This hash has the follow regressions on raw metrics",
      ))
  }

  /// Build the set selected by configuration.
  ///
  /// Ids in `metrics` that are not built in become generic scored checks, as do
  /// all `extra_metrics`.
  pub fn from_config(config: &BenchmarkConfig) -> Self {
    let builtin = Self::builtin();
    let mut set = Self::new();

    for id in config.metrics.iter().chain(config.extra_metrics.iter()) {
      let check = match builtin.get(id) {
        Some(check) => check.clone(),
        None => {
          debug!(metric = %id, "Registering generic scored check");
          MetricCheck::generic_scored(id.as_str())
        }
      };
      set.push(check);
    }

    set
  }

  /// Add a check, replacing any existing check with the same id.
  pub fn push(&mut self, check: MetricCheck) {
    match self.checks.iter_mut().find(|c| c.id == check.id) {
      Some(existing) => *existing = check,
      None => self.checks.push(check),
    }
  }

  pub fn with(mut self, check: MetricCheck) -> Self {
    self.push(check);
    self
  }

  /// Keep only the given ids, preserving registration order.
  pub fn only<S: AsRef<str>>(&self, ids: &[S]) -> Self {
    Self {
      checks: self
        .checks
        .iter()
        .filter(|c| ids.iter().any(|id| id.as_ref() == c.id))
        .cloned()
        .collect(),
    }
  }

  pub fn get(&self, id: &str) -> Option<&MetricCheck> {
    self.checks.iter().find(|c| c.id == id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &MetricCheck> {
    self.checks.iter()
  }

  pub fn ids(&self) -> Vec<&str> {
    self.checks.iter().map(|c| c.id.as_str()).collect()
  }

  pub fn len(&self) -> usize {
    self.checks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.checks.is_empty()
  }
}
