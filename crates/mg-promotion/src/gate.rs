//! Threshold gate: pure evaluation of a candidate's metrics against the
//! configured bounds. All bounds must pass; a missing metric fails its check
//! rather than being skipped (fail closed).

use mg_config::ThresholdSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    /// Observed must be <= limit (e.g. error metrics).
    UpperBound,
    /// Observed must be >= limit (e.g. score metrics).
    LowerBound,
}

/// One comparison the gate performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBound {
    pub metric: String,
    pub limit: f64,
    pub kind: BoundKind,
}

/// Expand config threshold specs into gate bounds. A spec carrying both
/// `max` and `min` yields two bounds on the same metric.
pub fn bounds_from_specs(specs: &[ThresholdSpec]) -> Vec<MetricBound> {
    let mut bounds = Vec::new();
    for spec in specs {
        if let Some(max) = spec.max {
            bounds.push(MetricBound {
                metric: spec.metric.clone(),
                limit: max,
                kind: BoundKind::UpperBound,
            });
        }
        if let Some(min) = spec.min {
            bounds.push(MetricBound {
                metric: spec.metric.clone(),
                limit: min,
                kind: BoundKind::LowerBound,
            });
        }
    }
    bounds
}

/// Result of one bound check, with the observed number for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub metric: String,
    pub limit: f64,
    pub kind: BoundKind,
    /// None when the metric was absent from the candidate.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Full gate verdict. `fail_reasons` ordering follows the bound list, so
/// reports are stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub passed: bool,
    pub checks: Vec<GateCheck>,
    pub fail_reasons: Vec<String>,
}

pub fn evaluate_gate(bounds: &[MetricBound], metrics: &BTreeMap<String, f64>) -> GateReport {
    let mut checks = Vec::with_capacity(bounds.len());
    let mut fail_reasons = Vec::new();

    for bound in bounds {
        let observed = metrics.get(&bound.metric).copied();
        let passed = match (observed, bound.kind) {
            (Some(v), BoundKind::UpperBound) => v <= bound.limit,
            (Some(v), BoundKind::LowerBound) => v >= bound.limit,
            (None, _) => false,
        };

        if !passed {
            match (observed, bound.kind) {
                (Some(v), BoundKind::UpperBound) => fail_reasons.push(format!(
                    "{} {:.6} > max {:.6}",
                    bound.metric, v, bound.limit
                )),
                (Some(v), BoundKind::LowerBound) => fail_reasons.push(format!(
                    "{} {:.6} < min {:.6}",
                    bound.metric, v, bound.limit
                )),
                (None, _) => fail_reasons.push(format!("{} missing", bound.metric)),
            }
        }

        checks.push(GateCheck {
            metric: bound.metric.clone(),
            limit: bound.limit,
            kind: bound.kind,
            observed,
            passed,
        });
    }

    GateReport {
        passed: fail_reasons.is_empty(),
        checks,
        fail_reasons,
    }
}
