//! Eval command implementation
//!
//! Replays recorded counter values through the simulated device and the full
//! metric pipeline. The sample file maps counter names to either one value
//! (used for every partition) or an array of per-partition values:
//!
//! ```json
//! { "GRBM_COUNT": 1000, "GRBM_GUI_ACTIVE": [250, 300], "UMC_RD_REQ": [42] }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use rocscope_profiler::metrics::{get_counters_and_metric_results_by_xcc, resolve_metrics};
use rocscope_profiler::{
    HardwareBackend, InMemoryCatalog, MetricEngine, MetricSnapshot, ProfilerConfig,
    SessionRegistry, SimulatedDevice,
};
use rocscope_shared::{Event, ReplayMode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CommonArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Metrics to evaluate (comma or space separated, `pmc:` prefix allowed)
    #[arg(short, long, value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// Recorded counter values (JSON)
    #[arg(short, long)]
    pub samples: PathBuf,

    /// Kernel duration reported as KERNEL_DURATION, in nanoseconds
    #[arg(long, default_value = "0")]
    pub duration_ns: u64,

    /// Also show the values of every partition
    #[arg(long)]
    pub per_xcc: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// GPU agent index
    #[arg(long, default_value = "0")]
    pub gpu: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SampleValue {
    Uniform(u64),
    PerXcc(Vec<u64>),
}

impl SampleValue {
    fn at(&self, xcc: u32) -> u64 {
        match self {
            SampleValue::Uniform(v) => *v,
            SampleValue::PerXcc(values) => values.get(xcc as usize).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
struct EvalReport {
    replay_mode: ReplayMode,
    metrics: Vec<String>,
    total: MetricSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    per_xcc: Vec<MetricSnapshot>,
}

fn read_samples(path: &Path) -> Result<BTreeMap<String, SampleValue>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse samples {}", path.display()))
}

pub fn run(common: &CommonArgs, args: EvalArgs) -> Result<()> {
    let cfg = super::load_config(common)?;
    let names = super::requested_metrics(&cfg, &args.metrics)?;
    let catalog = super::load_catalog(common)?;
    let samples = read_samples(&args.samples)?;
    let device = Arc::new(super::load_device(common)?);

    let report = replay(&cfg, names, &catalog, device, &samples, &args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Run one profiling pass over the recorded samples inside a session that
/// uses the configured replay mode
fn replay(
    cfg: &ProfilerConfig,
    names: Vec<String>,
    catalog: &InMemoryCatalog,
    device: Arc<SimulatedDevice>,
    samples: &BTreeMap<String, SampleValue>,
    args: &EvalArgs,
) -> Result<EvalReport> {
    let registry = SessionRegistry::new(device.clone());
    let engine = MetricEngine::new(registry.hardware().clone());

    let session_id = registry.create_session(cfg.replay_mode);
    let profile = registry.get_session(session_id)?;
    for name in &names {
        profile.add_counter_name(name);
    }
    registry.start_session(session_id)?;

    let id = registry.create_device_profiling_session(names.clone(), 0, args.gpu)?;
    let session = registry.get_device_profiling_session(id)?;

    let mut pass = session.prepare(&engine, catalog)?;

    let by_event: HashMap<Event, String> = pass
        .results
        .counter_results()
        .filter_map(|r| r.event.map(|e| (e, r.name.clone())))
        .collect();
    for name in by_event.values() {
        if !samples.contains_key(name) {
            output::warning(&format!("No samples for {}, using 0", name));
        }
    }

    session.start();
    let buffer = device.capture(session.gpu_agent(), &pass.events, |xcc, event| {
        by_event
            .get(event)
            .and_then(|name| samples.get(name))
            .map(|v| v.at(xcc))
            .unwrap_or(0)
    });
    session.stop();
    debug!(bytes = buffer.size(), "captured profile buffer");

    let elapsed = Duration::from_nanos(args.duration_ns);
    let total = session.read(&engine, catalog, &mut pass, &buffer, elapsed)?;

    let mut per_xcc = Vec::new();
    if args.per_xcc {
        let info = registry.hardware().device_info(session.gpu_agent())?;
        let metrics = resolve_metrics(&names, catalog, &info.name)?;
        for xcc in 0..pass.xcc_count {
            per_xcc.push(get_counters_and_metric_results_by_xcc(
                xcc,
                &pass.results,
                &metrics,
                args.duration_ns,
            )?);
        }
    }

    registry.destroy_device_profiling_session(id)?;
    registry.terminate_session(session_id)?;
    registry.destroy_session(session_id)?;

    Ok(EvalReport {
        replay_mode: profile.replay_mode(),
        metrics: names,
        total,
        per_xcc,
    })
}

fn print_report(report: &EvalReport) {
    output::info(&format!("{} metric(s)", report.metrics.len()));

    let mut header = format!("\n  {:<24} {:>14}", "NAME", "TOTAL");
    for snap in &report.per_xcc {
        header.push_str(&format!(" {:>12}", format!("XCC{}", snap.partition.unwrap_or(0))));
    }
    println!("{header}");

    for (name, value) in &report.total.values {
        let marker = if report.metrics.contains(name) { "*" } else { " " };
        let mut line = format!("{} {:<24} {:>14}", marker, name, output::format_value(*value));
        for snap in &report.per_xcc {
            let v = snap.get(name).map(output::format_value).unwrap_or_default();
            line.push_str(&format!(" {:>12}", v));
        }
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(per_xcc: bool) -> EvalArgs {
        EvalArgs {
            metrics: Vec::new(),
            samples: PathBuf::from("samples.json"),
            duration_ns: 500,
            per_xcc,
            json: true,
            gpu: 0,
        }
    }

    fn samples() -> BTreeMap<String, SampleValue> {
        serde_json::from_str(r#"{ "GRBM_COUNT": 1000, "GRBM_GUI_ACTIVE": [250, 750] }"#).unwrap()
    }

    #[test]
    fn test_replay_uses_configured_mode() {
        let cfg = ProfilerConfig {
            counters: vec!["GPUBusy".to_string()],
            replay_mode: ReplayMode::Application,
        };
        let catalog = InMemoryCatalog::from_toml_str(super::super::DEFAULT_CATALOG).unwrap();
        let device = Arc::new(SimulatedDevice::new("gfx942", 2));

        let report = replay(&cfg, cfg.counters.clone(), &catalog, device, &samples(), &args(true))
            .unwrap();
        assert_eq!(report.replay_mode, ReplayMode::Application);
        // GRBM_GUI_ACTIVE = 250 + 750, GRBM_COUNT = 1000 + 1000
        assert_eq!(report.total.get("GPUBusy"), Some(50.0));
        assert_eq!(report.per_xcc.len(), 2);
        assert_eq!(report.per_xcc[0].get("GPUBusy"), Some(25.0));
        assert_eq!(report.per_xcc[1].get("GPUBusy"), Some(75.0));
    }

    #[test]
    fn test_replay_rejects_unknown_gpu() {
        let cfg = ProfilerConfig::default();
        let catalog = InMemoryCatalog::from_toml_str(super::super::DEFAULT_CATALOG).unwrap();
        let device = Arc::new(SimulatedDevice::new("gfx90a", 1));

        let mut bad = args(false);
        bad.gpu = 3;
        let names = vec!["GPUBusy".to_string()];
        assert!(replay(&cfg, names, &catalog, device, &samples(), &bad).is_err());
    }
}
