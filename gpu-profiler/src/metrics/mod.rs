//! Hardware counter metric evaluation
//!
//! A profiling pass runs in four steps:
//!
//! 1. [`MetricEngine::extract_metric_events`] resolves metric names to the
//!    smallest set of hardware events, claiming block slots as it goes;
//! 2. [`MetricEngine::get_counter_data`] folds the raw samples of a completed
//!    profile into the counter results, per partition and in total;
//! 3. [`get_metrics_data`] evaluates derived metrics over the totals;
//! 4. [`get_counters_and_metric_results_by_xcc`] gives the same view for a
//!    single partition.

pub mod aggregate;
pub mod block;
pub mod catalog;
pub mod evaluate;
pub mod expr;
pub mod result;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use rocscope_shared::{Agent, BlockKey, Event};
use tracing::{debug, warn};

use crate::error::{ProfilerError, Result};
use crate::hardware::{HardwareBackend, ProfileBuffer};

pub use aggregate::SampleLayout;
pub use block::{BlockAllocation, BlockAllocator, Claim};
pub use catalog::{Counter, InMemoryCatalog, Metric, MetricCatalog, MetricKind, KERNEL_DURATION};
pub use evaluate::{
    evaluate, get_counters_and_metric_results_by_xcc, get_metrics_data, MetricSnapshot,
    ResultView,
};
pub use result::{MetricResult, ResultStore};

/// Output of event extraction, consumed by the later steps
#[derive(Debug, Clone, Default)]
pub struct ProfilePass {
    /// Partition count of the target agent
    pub xcc_count: u32,

    /// Results by name; counter results in programming order
    pub results: ResultStore,

    /// Events to program, one per granted counter
    pub events: Vec<Event>,

    /// Hardware capacity of every block that received a counter
    pub block_capacity: BTreeMap<BlockKey, u32>,

    /// Counter names each derived metric depends on
    pub metric_counters: BTreeMap<String, BTreeSet<String>>,
}

impl ProfilePass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events programmed on each block instance
    pub fn block_usage(&self) -> BTreeMap<BlockKey, u32> {
        let mut usage = BTreeMap::new();
        for e in &self.events {
            *usage.entry(e.block_key()).or_insert(0) += 1;
        }
        usage
    }
}

/// Resolves metrics against the hardware and turns raw samples into values
pub struct MetricEngine {
    hardware: Arc<dyn HardwareBackend>,

    /// Serializes extraction: block capacity queries and result registration
    /// must not interleave between requests.
    extract_lock: Mutex<()>,
}

impl MetricEngine {
    pub fn new(hardware: Arc<dyn HardwareBackend>) -> Self {
        Self {
            hardware,
            extract_lock: Mutex::new(()),
        }
    }

    pub fn hardware(&self) -> &Arc<dyn HardwareBackend> {
        &self.hardware
    }

    /// Resolve `metric_names` into hardware events for `agent`, filling `pass`.
    ///
    /// Counters shared by several metrics are allocated once. Fails on the first
    /// unknown or empty metric and on the first counter whose block has no free
    /// slot; `pass` is then partially filled and must be discarded.
    pub fn extract_metric_events<S: AsRef<str>>(
        &self,
        metric_names: &[S],
        agent: &Agent,
        catalog: &dyn MetricCatalog,
        pass: &mut ProfilePass,
    ) -> Result<()> {
        let _guard = self.extract_lock.lock().unwrap();

        let info = self.hardware.device_info(agent)?;
        let xcc_count = info.xcc_count;
        pass.xcc_count = xcc_count;
        let mut blocks = BlockAllocator::new();

        for name in metric_names {
            let name = name.as_ref();
            let metric = catalog
                .get(name)
                .ok_or_else(|| ProfilerError::UnknownMetric {
                    metric: name.to_string(),
                    device: info.name.clone(),
                })?;

            if metric.is_kernel_duration() {
                pass.results.ensure(name, xcc_count);
                continue;
            }

            let counters = metric.counters();
            if counters.is_empty() {
                return Err(ProfilerError::EmptyMetric(name.to_string()));
            }

            if metric.expr().is_some() && !pass.results.contains(name) {
                pass.results.ensure(name, xcc_count);
                pass.metric_counters
                    .entry(name.to_string())
                    .or_default()
                    .extend(counters.iter().map(|c| c.name.clone()));
            }

            for counter in counters {
                if pass.results.contains(&counter.name) {
                    continue;
                }
                let index = pass
                    .results
                    .insert_counter(&counter.name, counter.event, xcc_count);

                let key = counter.event.block_key();
                let claim = blocks.claim(key, || {
                    self.hardware.block_counter_capacity(agent, &counter.event)
                })?;
                let max_slots = match claim {
                    Claim::Granted { max_slots } => max_slots,
                    Claim::Full { max_slots } => {
                        warn!(
                            counter = %counter.name,
                            block = %key,
                            max_slots,
                            "hardware block counter limit exceeded"
                        );
                        return Err(ProfilerError::CapacityExceeded {
                            counter: counter.name.clone(),
                            block: key.block,
                            index: key.index,
                            max: max_slots,
                        });
                    }
                };

                pass.events.push(counter.event);
                pass.results.track_counter(index);
                pass.block_capacity.entry(key).or_insert(max_slots);
            }
        }

        debug!(
            metrics = metric_names.len(),
            events = pass.events.len(),
            xcc_count,
            "extracted metric events"
        );
        Ok(())
    }

    /// Fold the samples of `buffer` into the tracked counter results.
    ///
    /// Only a failing hardware iteration is an error. Samples of events that
    /// were not requested are skipped, as are samples whose partition lies
    /// outside the results' partition range.
    pub fn get_counter_data(
        &self,
        buffer: &ProfileBuffer,
        results: &mut ResultStore,
    ) -> Result<()> {
        let info = self.hardware.device_info(&buffer.agent)?;
        let layout = SampleLayout::for_buffer(buffer, info.xcc_count);

        let mut index = 0usize;
        let mut out_of_range = 0usize;
        self.hardware.iterate_samples(buffer, &mut |event, value| {
            let xcc = layout.partition_of(index);
            if results.accumulate(event, xcc, value).is_none() {
                out_of_range += 1;
            }
            index += 1;
        })?;

        if out_of_range > 0 {
            warn!(
                skipped = out_of_range,
                xcc_count = info.xcc_count,
                "samples mapped past the last partition"
            );
        }
        debug!(
            samples = index,
            extra = layout.extra_samples,
            per_partition = layout.per_partition,
            "aggregated counter data"
        );
        Ok(())
    }
}

/// Look up each name in `catalog`; `device` names the hardware in the error
/// for a name the catalog does not know
pub fn resolve_metrics<'c, S: AsRef<str>>(
    names: &[S],
    catalog: &'c dyn MetricCatalog,
    device: &str,
) -> Result<Vec<&'c Metric>> {
    names
        .iter()
        .map(|n| {
            catalog
                .get(n.as_ref())
                .ok_or_else(|| ProfilerError::UnknownMetric {
                    metric: n.as_ref().to_string(),
                    device: device.to_string(),
                })
        })
        .collect()
}
