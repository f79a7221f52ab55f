//! Derived-metric evaluation
//!
//! Evaluation never mutates the counter results it reads. A view (aggregate or
//! one partition) is materialised into a [`MetricSnapshot`] and computed
//! metrics are evaluated against it in request order, so a computed metric may
//! read one evaluated before it.

use std::collections::BTreeMap;

use serde::Serialize;

use super::catalog::Metric;
use super::result::ResultStore;
use crate::error::{ProfilerError, Result};

/// Which values of the results a snapshot is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultView {
    /// Totals across all partitions
    Aggregate,
    /// One partition's values
    Partition(u32),
}

/// Counter and metric values for one view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    /// `None` for the aggregate view
    pub partition: Option<u32>,
    pub values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Build a snapshot of `view` and evaluate every computed metric in `metrics`.
/// `KERNEL_DURATION` takes `kernel_duration` as is.
pub fn evaluate(
    results: &ResultStore,
    metrics: &[&Metric],
    kernel_duration: u64,
    view: ResultView,
) -> Result<MetricSnapshot> {
    let mut values = BTreeMap::new();
    for r in results.iter() {
        let v = match view {
            ResultView::Aggregate => r.value,
            ResultView::Partition(xcc) => *r.xcc_values.get(xcc as usize).ok_or(
                ProfilerError::PartitionOutOfRange {
                    index: xcc,
                    xcc_count: r.xcc_values.len() as u32,
                },
            )?,
        };
        values.insert(r.name.clone(), v);
    }

    for metric in metrics.iter().filter(|m| m.is_computed()) {
        if !values.contains_key(metric.name()) {
            return Err(ProfilerError::MissingResult(metric.name().to_string()));
        }
        let v = match metric.expr() {
            Some(expr) => {
                let lookup = |name: &str| values.get(name).copied();
                expr.eval(&lookup)
                    .map_err(|e| ProfilerError::UnresolvedVariable(e.0))?
            }
            None => kernel_duration as f64,
        };
        values.insert(metric.name().to_string(), v);
    }

    Ok(MetricSnapshot {
        partition: match view {
            ResultView::Aggregate => None,
            ResultView::Partition(xcc) => Some(xcc),
        },
        values,
    })
}

/// Evaluate computed metrics over the aggregate totals and store each value in
/// its result.
pub fn get_metrics_data(
    results: &mut ResultStore,
    metrics: &[&Metric],
    kernel_duration: u64,
) -> Result<()> {
    let snapshot = evaluate(results, metrics, kernel_duration, ResultView::Aggregate)?;
    for metric in metrics.iter().filter(|m| m.is_computed()) {
        let v = snapshot.values[metric.name()];
        if let Some(r) = results.get_mut(metric.name()) {
            r.value = v;
        }
    }
    Ok(())
}

/// Counter and metric values as seen by partition `xcc` alone. The stored
/// totals are left untouched.
pub fn get_counters_and_metric_results_by_xcc(
    xcc: u32,
    results: &ResultStore,
    metrics: &[&Metric],
    kernel_duration: u64,
) -> Result<MetricSnapshot> {
    evaluate(results, metrics, kernel_duration, ResultView::Partition(xcc))
}
