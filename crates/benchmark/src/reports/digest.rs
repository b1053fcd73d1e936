//! Persisted digests of a comparison, one document per category.

use std::collections::BTreeMap;

use perfgate_core::ReportFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ComparisonOutcome, Direction, ReportPayload, ReportStore, StoredLocation};
use crate::Result;

/// Category of a digest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestCategory {
  Regressions,
  Improvements,
}

impl DigestCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      DigestCategory::Regressions => "regressions",
      DigestCategory::Improvements => "improvements",
    }
  }

  /// Base name of the persisted digest file
  pub fn file_name(&self) -> String {
    format!("{}-digest", self.as_str())
  }
}

impl std::fmt::Display for DigestCategory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Persisted payload of one outcome.
///
/// Field names are part of the on-disk contract read by dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DigestEntry {
  Regression {
    regression: String,
    #[serde(rename = "regressionMessage")]
    regression_message: String,
  },
  Improvement {
    improvement: String,
    message: String,
  },
}

impl DigestEntry {
  /// Entry for an outcome; unchanged outcomes have none.
  pub fn from_outcome(outcome: &ComparisonOutcome) -> Option<Self> {
    let delta = render_delta(outcome.delta, &outcome.unit);
    match outcome.direction {
      Direction::Regression => Some(DigestEntry::Regression {
        regression: delta,
        regression_message: outcome.message.clone(),
      }),
      Direction::Improvement => Some(DigestEntry::Improvement {
        improvement: delta,
        message: outcome.message.clone(),
      }),
      Direction::Unchanged => None,
    }
  }

  pub fn delta(&self) -> &str {
    match self {
      DigestEntry::Regression { regression, .. } => regression,
      DigestEntry::Improvement { improvement, .. } => improvement,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      DigestEntry::Regression { regression_message, .. } => regression_message,
      DigestEntry::Improvement { message, .. } => message,
    }
  }
}

/// All outcomes of one category for one revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
  pub category: DigestCategory,
  pub revision: String,
  pub entries: BTreeMap<String, DigestEntry>,
}

impl Digest {
  pub fn new(category: DigestCategory, revision: impl Into<String>) -> Self {
    Self {
      category,
      revision: revision.into(),
      entries: BTreeMap::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Canonical pretty-printed form written to disk.
  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(&self.entries)?)
  }

  fn insert(&mut self, metric_id: &str, entry: DigestEntry) {
    if self.entries.contains_key(metric_id) {
      debug!(metric = %metric_id, category = %self.category, "Duplicate digest key, keeping first entry");
      return;
    }
    self.entries.insert(metric_id.to_string(), entry);
  }
}

/// The regression and improvement digests of one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Digests {
  pub regressions: Digest,
  pub improvements: Digest,
}

impl Digests {
  /// Partition outcomes by direction.
  pub fn build(outcomes: &[ComparisonOutcome], revision: &str) -> Self {
    let mut digests = Self {
      regressions: Digest::new(DigestCategory::Regressions, revision),
      improvements: Digest::new(DigestCategory::Improvements, revision),
    };

    for outcome in outcomes {
      let Some(entry) = DigestEntry::from_outcome(outcome) else {
        continue;
      };
      match outcome.direction {
        Direction::Regression => digests.regressions.insert(&outcome.metric_id, entry),
        Direction::Improvement => digests.improvements.insert(&outcome.metric_id, entry),
        Direction::Unchanged => {}
      }
    }

    digests
  }

  pub fn iter(&self) -> impl Iterator<Item = &Digest> {
    [&self.regressions, &self.improvements].into_iter()
  }

  pub fn is_empty(&self) -> bool {
    self.iter().all(Digest::is_empty)
  }

  /// Write every non-empty digest under its category file name.
  pub async fn persist(&self, store: &ReportStore) -> Result<Vec<StoredLocation>> {
    let mut locations = Vec::new();

    for digest in self.iter() {
      if digest.is_empty() {
        debug!(category = %digest.category, "Digest is empty, not writing");
        continue;
      }

      let payload = ReportPayload::new(ReportFormat::Json, digest.to_json_pretty()?);
      let file_name = digest.category.file_name();
      let location = store.write(&digest.revision, &payload, Some(&file_name)).await?;
      info!(path = %location.path.display(), entries = digest.len(), "Saved {} digest", digest.category);
      locations.push(location);
    }

    Ok(locations)
  }

  /// Generate markdown summary.
  pub fn to_markdown(&self) -> String {
    let mut out = String::new();

    out.push_str("# Benchmark Comparison\n\n");
    out.push_str(&format!("**Revision:** {}\n\n", self.regressions.revision));

    let status = if self.regressions.is_empty() { "✅ PASS" } else { "❌ FAIL" };
    out.push_str(&format!("## Summary: {}\n\n", status));
    out.push_str("| Category | Metrics |\n");
    out.push_str("|----------|---------|\n");
    out.push_str(&format!("| Regressions | {} |\n", self.regressions.len()));
    out.push_str(&format!("| Improvements | {} |\n\n", self.improvements.len()));

    for (digest, heading) in [(&self.regressions, "Regressions ❌"), (&self.improvements, "Improvements ✅")] {
      if digest.is_empty() {
        continue;
      }
      out.push_str(&format!("## {}\n\n", heading));
      out.push_str("| Metric | Delta | Message |\n");
      out.push_str("|--------|-------|---------|\n");
      for (metric, entry) in &digest.entries {
        out.push_str(&format!("| {} | {} | {} |\n", metric, entry.delta(), entry.message()));
      }
      out.push('\n');
    }

    out
  }
}

fn render_delta(delta: Option<f64>, unit: &str) -> String {
  match delta {
    Some(d) if d.fract() == 0.0 => format!("{}{}", d as i64, unit),
    Some(d) => format!("{:.2}{}", d, unit),
    None => "n/a".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn outcome(metric_id: &str, direction: Direction, delta: Option<f64>, message: &str) -> ComparisonOutcome {
    ComparisonOutcome {
      metric_id: metric_id.to_string(),
      direction,
      delta,
      message: message.to_string(),
      unit: "ms".to_string(),
    }
  }

  #[test]
  fn test_build_partitions_by_direction() {
    let outcomes = vec![
      outcome("interactive", Direction::Regression, Some(-50.0), "TTI is longer than benchmark"),
      outcome("mainthread-work-breakdown", Direction::Improvement, Some(-30.0), "freed"),
      outcome("speed-index", Direction::Unchanged, None, "same"),
    ];

    let digests = Digests::build(&outcomes, "abc123");

    assert_eq!(digests.regressions.len(), 1);
    assert_eq!(digests.improvements.len(), 1);
    assert_eq!(digests.regressions.revision, "abc123");
    assert_eq!(
      digests.regressions.entries["interactive"],
      DigestEntry::Regression {
        regression: "-50ms".to_string(),
        regression_message: "TTI is longer than benchmark".to_string(),
      }
    );
  }

  #[test]
  fn test_persisted_shape() {
    let outcomes = vec![
      outcome("interactive", Direction::Regression, Some(-50.0), "TTI is longer than benchmark"),
      outcome("mainthread-work-breakdown", Direction::Improvement, Some(12.0), "freed"),
      outcome("speedIndex", Direction::Regression, Some(12.5), "raw"),
    ];
    let digests = Digests::build(&outcomes, "abc123");

    let regressions: serde_json::Value = serde_json::from_str(&digests.regressions.to_json_pretty().unwrap()).unwrap();
    assert_eq!(regressions["interactive"]["regression"], "-50ms");
    assert_eq!(regressions["interactive"]["regressionMessage"], "TTI is longer than benchmark");
    assert_eq!(regressions["speedIndex"]["regression"], "12.50ms");

    let improvements: serde_json::Value =
      serde_json::from_str(&digests.improvements.to_json_pretty().unwrap()).unwrap();
    assert_eq!(improvements["mainthread-work-breakdown"]["improvement"], "12ms");
    assert_eq!(improvements["mainthread-work-breakdown"]["message"], "freed");
  }

  #[test]
  fn test_entries_parse_back() {
    let json = r#"{
      "interactive": { "regression": "-50ms", "regressionMessage": "TTI is longer than benchmark" },
      "speed-index": { "improvement": "n/a", "message": "better" }
    }"#;
    let entries: BTreeMap<String, DigestEntry> = serde_json::from_str(json).unwrap();

    assert!(matches!(entries["interactive"], DigestEntry::Regression { .. }));
    assert!(matches!(entries["speed-index"], DigestEntry::Improvement { .. }));
  }

  #[test]
  fn test_duplicate_key_keeps_first() {
    let outcomes = vec![
      outcome("interactive", Direction::Regression, Some(-50.0), "scored"),
      outcome("interactive", Direction::Regression, Some(300.0), "reading"),
    ];
    let digests = Digests::build(&outcomes, "abc");

    assert_eq!(digests.regressions.len(), 1);
    assert_eq!(digests.regressions.entries["interactive"].message(), "scored");
  }

  #[tokio::test]
  async fn test_persist_skips_empty_digests() {
    let temp = TempDir::new().unwrap();
    let store = ReportStore::new(temp.path(), "automated-lighthouse-");
    let outcomes = vec![outcome("interactive", Direction::Regression, Some(-50.0), "slower")];

    let locations = Digests::build(&outcomes, "abc").persist(&store).await.unwrap();

    assert_eq!(locations.len(), 1);
    let folder = store.resolve_folder("abc");
    assert!(folder.join("regressions-digest.json").exists());
    assert!(!folder.join("improvements-digest.json").exists());
  }

  #[tokio::test]
  async fn test_persist_nothing_for_empty_comparison() {
    let temp = TempDir::new().unwrap();
    let store = ReportStore::new(temp.path(), "automated-lighthouse-");

    let digests = Digests::build(&[], "abc");
    assert!(digests.is_empty());

    let locations = digests.persist(&store).await.unwrap();
    assert!(locations.is_empty());
    assert!(!store.resolve_folder("abc").exists());
  }

  #[test]
  fn test_markdown_output() {
    let outcomes = vec![
      outcome("interactive", Direction::Regression, Some(-50.0), "TTI is longer than benchmark"),
      outcome("mainthread-work-breakdown", Direction::Improvement, None, "freed"),
    ];
    let md = Digests::build(&outcomes, "abc").to_markdown();

    assert!(md.contains("# Benchmark Comparison"));
    assert!(md.contains("FAIL"));
    assert!(md.contains("| interactive | -50ms | TTI is longer than benchmark |"));
    assert!(md.contains("| mainthread-work-breakdown | n/a | freed |"));
  }

  #[test]
  fn test_markdown_passes_without_regressions() {
    let md = Digests::build(&[], "abc").to_markdown();
    assert!(md.contains("PASS"));
    assert!(!md.contains("## Regressions"));
  }
}
