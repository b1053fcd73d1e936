//! Comparison and regression detection between a report and its baseline.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{MetricResult, Report};
use crate::{
  BenchmarkError, Result,
  metrics::{MetricCheck, MetricKind, MetricSet},
};

/// Divisor coarsening raw deltas of scored metrics into a stable reporting unit
const DELTA_DIVISOR: f64 = 10.0;

/// Classification of one metric across two reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Regression,
  Improvement,
  Unchanged,
}

/// Result of comparing one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
  /// Audit id, or sub-reading name for reading families
  pub metric_id: String,
  pub direction: Direction,
  /// current − baseline in the native unit (coarsened for scored metrics)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub delta: Option<f64>,
  pub message: String,
  /// Unit of `delta`
  pub unit: String,
}

/// Compare every registered metric of `current` against `baseline`.
///
/// Metrics missing from either report are skipped silently, malformed ones
/// are skipped with a warning. Unchanged metrics produce no outcome.
pub fn compare(current: &Report, baseline: &Report, metrics: &MetricSet) -> Vec<ComparisonOutcome> {
  let mut outcomes = Vec::new();

  for check in metrics.iter() {
    let (Some(current_metric), Some(baseline_metric)) = (current.metric(&check.id), baseline.metric(&check.id)) else {
      debug!(metric = %check.id, "Metric absent from one report, skipping");
      continue;
    };

    let result = match &check.kind {
      MetricKind::Scored {
        regression_message,
        improvement_message,
      } => compare_scored(check, current_metric, baseline_metric, regression_message, improvement_message)
        .map(|outcome| outcome.into_iter().collect::<Vec<_>>()),
      MetricKind::SubReadings { regression_message } => {
        compare_readings(check, current_metric, baseline_metric, regression_message)
      }
    };

    match result {
      Ok(found) => outcomes.extend(found),
      Err(e) => warn!(error = %e, "Could not parse and compare metric"),
    }
  }

  outcomes
}

fn compare_scored(
  check: &MetricCheck,
  current: &MetricResult,
  baseline: &MetricResult,
  regression_message: &str,
  improvement_message: &str,
) -> Result<Option<ComparisonOutcome>> {
  if !current.is_comparable() || !baseline.is_comparable() {
    debug!(metric = %check.id, "Metric carries neither score nor raw value, skipping");
    return Ok(None);
  }

  let direction = match (current.score, baseline.score) {
    (Some(current_score), Some(baseline_score)) => classify(current_score.partial_cmp(&baseline_score), true),
    (None, None) => match (current.raw_value, baseline.raw_value) {
      // Without scores, raw values are timings: lower is better
      (Some(current_raw), Some(baseline_raw)) => classify(current_raw.partial_cmp(&baseline_raw), false),
      _ => None,
    },
    _ => return Err(malformed(check, "score present in only one report")),
  }
  .ok_or_else(|| malformed(check, "values are not comparable numbers"))?;

  let message = match direction {
    Direction::Unchanged => return Ok(None),
    Direction::Regression => regression_message,
    Direction::Improvement => improvement_message,
  };

  let delta = match (current.raw_value, baseline.raw_value) {
    (Some(current_raw), Some(baseline_raw)) => Some(((current_raw - baseline_raw) / DELTA_DIVISOR).floor()),
    _ => None,
  };

  match direction {
    Direction::Regression => warn!(metric = %check.id, delta = ?delta, "WARN: {}", message),
    _ => info!(metric = %check.id, delta = ?delta, "INFO: {}", message),
  }

  Ok(Some(ComparisonOutcome {
    metric_id: check.id.clone(),
    direction,
    delta,
    message: message.to_string(),
    unit: check.unit.clone(),
  }))
}

/// Flags every reading that got worse. Ties and improvements are ignored.
fn compare_readings(
  check: &MetricCheck,
  current: &MetricResult,
  baseline: &MetricResult,
  regression_message: &str,
) -> Result<Vec<ComparisonOutcome>> {
  let (Some(current_details), Some(baseline_details)) = (&current.details, &baseline.details) else {
    return Err(malformed(check, "details missing"));
  };

  let baseline_readings = baseline_details.readings();
  let outcomes: Vec<ComparisonOutcome> = current_details
    .readings()
    .into_iter()
    .filter_map(|(name, current_value)| {
      let baseline_value = *baseline_readings.get(&name)?;
      (current_value > baseline_value).then(|| ComparisonOutcome {
        metric_id: name,
        direction: Direction::Regression,
        delta: Some(current_value - baseline_value),
        message: regression_message.to_string(),
        unit: check.unit.clone(),
      })
    })
    .collect();

  if !outcomes.is_empty() {
    warn!(metric = %check.id, count = outcomes.len(), "WARN: {}", regression_message);
    for outcome in &outcomes {
      debug!(reading = %outcome.metric_id, delta = ?outcome.delta, "Raw metric regression");
    }
  }

  Ok(outcomes)
}

fn classify(ordering: Option<Ordering>, higher_is_better: bool) -> Option<Direction> {
  let direction = match ordering? {
    Ordering::Equal => Direction::Unchanged,
    Ordering::Less if higher_is_better => Direction::Regression,
    Ordering::Greater if higher_is_better => Direction::Improvement,
    Ordering::Less => Direction::Improvement,
    Ordering::Greater => Direction::Regression,
  };
  Some(direction)
}

fn malformed(check: &MetricCheck, reason: &str) -> BenchmarkError {
  BenchmarkError::MetricParse {
    metric: check.id.clone(),
    reason: reason.to_string(),
  }
}
