//! Audit reports and their lifecycle.
//!
//! - Model: typed view over a Lighthouse JSON report
//! - Store: one folder per revision on disk
//! - Comparison: metric-by-metric diff against a baseline
//! - Digest: persisted regressions/improvements per revision

mod comparison;
mod digest;
mod store;

use std::collections::BTreeMap;

use perfgate_core::ReportFormat;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use tracing::debug;

pub use comparison::{ComparisonOutcome, Direction, compare};
pub use digest::{Digest, DigestCategory, DigestEntry, Digests};
pub use store::{DEFAULT_FILE_NAME, ReportStore, StoredLocation};

use crate::Result;

/// Structured output of one audit run.
///
/// Serializes with the Lighthouse `audits` key so raw Lighthouse output parses directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
  /// Revision the report was produced for (absent in raw Lighthouse output)
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub revision: String,
  /// Audited metrics by audit id
  #[serde(rename = "audits", default, deserialize_with = "lenient_audits")]
  pub metrics: BTreeMap<String, MetricResult>,
}

impl Report {
  /// Create an empty report for a revision.
  pub fn new(revision: impl Into<String>) -> Self {
    Self {
      revision: revision.into(),
      metrics: BTreeMap::new(),
    }
  }

  /// Add a metric while building a report.
  pub fn with_metric(mut self, id: impl Into<String>, metric: MetricResult) -> Self {
    self.metrics.insert(id.into(), metric);
    self
  }

  /// Look up a metric by audit id.
  pub fn metric(&self, id: &str) -> Option<&MetricResult> {
    self.metrics.get(id)
  }

  /// Parse a JSON payload, attributing it to `revision` when it carries none.
  pub fn from_json(revision: &str, json: &str) -> Result<Self> {
    let mut report: Report = serde_json::from_str(json)?;
    if report.revision.is_empty() {
      report.revision = revision.to_string();
    }
    Ok(report)
  }

  /// Serialize to pretty-printed JSON.
  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

/// One measured audit dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
  /// Normalized score in [0, 1]
  #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
  pub score: Option<f64>,
  /// Measurement in the metric's native unit
  #[serde(
    rename = "rawValue",
    alias = "numericValue",
    default,
    deserialize_with = "lenient",
    skip_serializing_if = "Option::is_none"
  )]
  pub raw_value: Option<f64>,
  /// Named sub-readings
  #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
  pub details: Option<MetricDetails>,
}

impl MetricResult {
  /// A metric with a score and a raw value.
  pub fn scored(score: f64, raw_value: f64) -> Self {
    Self {
      score: Some(score),
      raw_value: Some(raw_value),
      details: None,
    }
  }

  /// A metric exposing only named sub-readings.
  pub fn with_readings<I, S>(readings: I) -> Self
  where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
  {
    let item: serde_json::Map<String, serde_json::Value> = readings
      .into_iter()
      .map(|(name, value)| (name.into(), serde_json::Value::from(value)))
      .collect();

    Self {
      score: None,
      raw_value: None,
      details: Some(MetricDetails {
        items: vec![serde_json::Value::Object(item)],
      }),
    }
  }

  /// Whether the metric carries a score or a raw value.
  pub fn is_comparable(&self) -> bool {
    self.score.is_some() || self.raw_value.is_some()
  }
}

/// Lighthouse `details` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDetails {
  #[serde(default)]
  pub items: Vec<serde_json::Value>,
}

impl MetricDetails {
  /// Numeric named readings of the first item, in name order.
  pub fn readings(&self) -> BTreeMap<String, f64> {
    let Some(serde_json::Value::Object(item)) = self.items.first() else {
      return BTreeMap::new();
    };

    item
      .iter()
      .filter_map(|(name, value)| match value.as_f64() {
        Some(v) => Some((name.clone(), v)),
        None => {
          debug!(reading = %name, "Skipping non-numeric sub-reading");
          None
        }
      })
      .collect()
  }
}

/// One serialized representation of an audit result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPayload {
  pub format: ReportFormat,
  pub body: String,
}

impl ReportPayload {
  pub fn new(format: ReportFormat, body: impl Into<String>) -> Self {
    Self {
      format,
      body: body.into(),
    }
  }
}

/// Lighthouse fields change type across versions (`rawValue` used to be a
/// boolean for pass/fail audits); anything that doesn't fit becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let value = serde_json::Value::deserialize(deserializer)?;
  Ok(serde_json::from_value(value).ok())
}

/// Parses each audit on its own; an entry of the wrong shape is dropped
/// instead of failing the whole report.
fn lenient_audits<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, MetricResult>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;

  Ok(
    raw
      .unwrap_or_default()
      .into_iter()
      .filter_map(|(id, value)| {
        if !value.is_object() {
          debug!(audit = %id, "Skipping audit entry that is not an object");
          return None;
        }
        match serde_json::from_value::<MetricResult>(value) {
          Ok(metric) => Some((id, metric)),
          Err(e) => {
            debug!(audit = %id, error = %e, "Skipping malformed audit entry");
            None
          }
        }
      })
      .collect(),
  )
}
