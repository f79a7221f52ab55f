//! Check command implementation

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use rocscope_profiler::{HardwareBackend, MetricEngine, ProfilePass};

use super::CommonArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Metrics to resolve (comma or space separated, `pmc:` prefix allowed)
    #[arg(short, long, value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// GPU agent index
    #[arg(long, default_value = "0")]
    pub gpu: u32,
}

pub fn run(common: &CommonArgs, args: CheckArgs) -> Result<()> {
    let cfg = super::load_config(common)?;
    let names = super::requested_metrics(&cfg, &args.metrics)?;
    let catalog = super::load_catalog(common)?;
    let device = Arc::new(super::load_device(common)?);

    let agent = device
        .find_agent(rocscope_shared::AgentKind::Gpu, args.gpu)
        .with_context(|| format!("No GPU agent at index {}", args.gpu))?;
    let info = device.device_info(&agent)?;

    let engine = MetricEngine::new(device);
    let mut pass = ProfilePass::new();
    engine
        .extract_metric_events(&names, &agent, &catalog, &mut pass)
        .context("Metrics do not fit in a single pass")?;

    output::info(&format!(
        "{} on {} ({} XCC)",
        agent, info.name, info.xcc_count
    ));

    println!("\n  {:<24} {}", "COUNTER", "EVENT");
    for r in pass.results.counter_results() {
        if let Some(event) = r.event {
            println!("  {:<24} {}", r.name, event);
        }
    }

    let usage = pass.block_usage();
    println!("\n  {:<10} {:>6} {:>6}", "BLOCK", "USED", "MAX");
    for (block, max) in &pass.block_capacity {
        println!(
            "  {:<10} {:>6} {:>6}",
            block.to_string(),
            usage.get(block).copied().unwrap_or(0),
            max
        );
    }

    if !pass.metric_counters.is_empty() {
        println!();
        for (metric, counters) in &pass.metric_counters {
            let deps: Vec<&str> = counters.iter().map(String::as_str).collect();
            println!("  {} <- {}", metric, deps.join(", "));
        }
    }

    println!();
    output::success(&format!(
        "{} metric(s) resolved to {} event(s)",
        names.len(),
        pass.events.len()
    ));
    Ok(())
}
