//! Per-pass result accumulators
//!
//! A [`ResultStore`] owns every [`MetricResult`] of one evaluation pass. Results
//! are reachable by name (counters and computed metrics alike) and, for counters
//! that were granted a hardware slot, through the ordered counter list that raw
//! samples are matched against.

use std::collections::HashMap;

use rocscope_shared::Event;
use serde::Serialize;

/// Accumulated value of one counter or computed metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub name: String,

    /// Hardware source; `None` for computed metrics
    pub event: Option<Event>,

    /// Aggregate over all partitions, or the evaluated value of a computed metric
    pub value: f64,

    /// Per-partition values, indexed by partition id
    pub xcc_values: Vec<f64>,
}

impl MetricResult {
    pub fn new(name: impl Into<String>, event: Option<Event>, xcc_count: u32) -> Self {
        Self {
            name: name.into(),
            event,
            value: 0.0,
            xcc_values: vec![0.0; xcc_count as usize],
        }
    }
}

/// Results of one pass, owned in insertion order
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: Vec<MetricResult>,
    by_name: HashMap<String, usize>,
    counters: Vec<usize>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&MetricResult> {
        self.by_name.get(name).map(|&i| &self.results[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MetricResult> {
        self.by_name.get(name).map(|&i| &mut self.results[i])
    }

    /// Current value of a named result
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|r| r.value)
    }

    /// Every result, in creation order
    pub fn iter(&self) -> impl Iterator<Item = &MetricResult> {
        self.results.iter()
    }

    /// Results holding a hardware slot, in programming order
    pub fn counter_results(&self) -> impl Iterator<Item = &MetricResult> {
        self.counters.iter().map(|&i| &self.results[i])
    }

    /// Get or create the result of a computed metric
    pub fn ensure(&mut self, name: &str, xcc_count: u32) -> usize {
        if let Some(&i) = self.by_name.get(name) {
            return i;
        }
        self.push(MetricResult::new(name, None, xcc_count))
    }

    /// Create a counter result. It only receives samples once
    /// [`track_counter`](Self::track_counter) has been called for it.
    pub fn insert_counter(&mut self, name: &str, event: Event, xcc_count: u32) -> usize {
        self.push(MetricResult::new(name, Some(event), xcc_count))
    }

    pub fn track_counter(&mut self, index: usize) {
        self.counters.push(index);
    }

    fn push(&mut self, result: MetricResult) -> usize {
        let i = self.results.len();
        self.by_name.insert(result.name.clone(), i);
        self.results.push(result);
        i
    }

    /// Add `value` to every tracked counter whose event equals `event`.
    ///
    /// Returns the number of results updated, or `None` when `xcc` lies outside
    /// a matching result's partition array; nothing is added in that case.
    pub fn accumulate(&mut self, event: &Event, xcc: u32, value: f64) -> Option<usize> {
        let xcc = xcc as usize;
        let matching: Vec<usize> = self
            .counters
            .iter()
            .copied()
            .filter(|&i| self.results[i].event.as_ref() == Some(event))
            .collect();

        if matching
            .iter()
            .any(|&i| xcc >= self.results[i].xcc_values.len())
        {
            return None;
        }

        for &i in &matching {
            let result = &mut self.results[i];
            result.xcc_values[xcc] += value;
            result.value += value;
        }
        Some(matching.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocscope_shared::BlockKind;

    #[test]
    fn test_ensure_is_idempotent() {
        let mut store = ResultStore::new();
        let a = store.ensure("GPUBusy", 2);
        let b = store.ensure("GPUBusy", 2);
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("GPUBusy").unwrap().xcc_values, vec![0.0, 0.0]);
        assert!(store.get("GPUBusy").unwrap().event.is_none());
    }

    #[test]
    fn test_untracked_counter_ignores_samples() {
        let mut store = ResultStore::new();
        let ev = Event::new(BlockKind::Sq, 0, 1);
        store.insert_counter("SQ_A", ev, 1);
        assert_eq!(store.accumulate(&ev, 0, 5.0), Some(0));
        assert_eq!(store.value("SQ_A"), Some(0.0));
        assert_eq!(store.counter_results().count(), 0);
    }

    #[test]
    fn test_accumulate_by_event_equality() {
        let mut store = ResultStore::new();
        let ev = Event::new(BlockKind::Sq, 0, 1);
        let i = store.insert_counter("SQ_A", ev, 2);
        store.track_counter(i);

        assert_eq!(store.accumulate(&ev, 0, 3.0), Some(1));
        assert_eq!(store.accumulate(&ev, 1, 4.0), Some(1));
        assert_eq!(store.accumulate(&Event::new(BlockKind::Sq, 0, 2), 0, 100.0), Some(0));

        let r = store.get("SQ_A").unwrap();
        assert_eq!(r.value, 7.0);
        assert_eq!(r.xcc_values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_accumulate_out_of_range_partition() {
        let mut store = ResultStore::new();
        let ev = Event::new(BlockKind::Tcc, 0, 9);
        let i = store.insert_counter("TCC_X", ev, 1);
        store.track_counter(i);
        assert_eq!(store.accumulate(&ev, 1, 2.0), None);
        assert_eq!(store.value("TCC_X"), Some(0.0));
    }
}
