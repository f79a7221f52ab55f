//! List command implementation

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use rocscope_profiler::metrics::MetricKind;
use rocscope_profiler::MetricCatalog;

use super::CommonArgs;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list hardware counters
    #[arg(long, conflicts_with = "derived")]
    pub basic: bool,

    /// Only list derived metrics
    #[arg(long)]
    pub derived: bool,
}

pub fn run(common: &CommonArgs, args: ListArgs) -> Result<()> {
    let catalog = super::load_catalog(common)?;

    let mut shown = 0;
    for metric in catalog.metrics() {
        let line = match metric.kind() {
            MetricKind::Basic if !args.derived => {
                let event = metric
                    .counters()
                    .first()
                    .map(|c| c.event.to_string())
                    .unwrap_or_default();
                format!("{:<24} {:<14} {}", metric.name().bold(), event, metric.description())
            }
            MetricKind::Derived { source, .. } if !args.basic => {
                format!(
                    "{:<24} {:<14} {}",
                    metric.name().bold(),
                    "derived".cyan(),
                    metric.description()
                ) + &format!("\n{:<24} = {}", "", source.dimmed())
            }
            MetricKind::KernelDuration if !args.basic => {
                format!(
                    "{:<24} {:<14} {}",
                    metric.name().bold(),
                    "timer".cyan(),
                    metric.description()
                )
            }
            _ => continue,
        };
        println!("{line}");
        shown += 1;
    }

    println!("\n{} entries", shown);
    Ok(())
}
