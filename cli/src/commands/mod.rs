//! Subcommands and the setup they share

pub mod check;
pub mod eval;
pub mod list;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rocscope_profiler::hardware::SimulatedDeviceSpec;
use rocscope_profiler::{InMemoryCatalog, ProfilerConfig, SimulatedDevice};
use rocscope_shared::utils::parse_counter_list;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_CATALOG: &str = include_str!("../../data/default_catalog.toml");

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Counter catalog (TOML); the built-in catalog is used when omitted
    #[arg(long, global = true, env = "ROCSCOPE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Simulated device description (TOML with a [device] table)
    #[arg(long, global = true, env = "ROCSCOPE_DEVICE")]
    pub device: Option<PathBuf>,

    /// Profiler configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceFile {
    device: SimulatedDeviceSpec,
}

pub fn load_catalog(common: &CommonArgs) -> Result<InMemoryCatalog> {
    match &common.catalog {
        Some(path) => InMemoryCatalog::from_file(path),
        None => {
            InMemoryCatalog::from_toml_str(DEFAULT_CATALOG).context("Built-in catalog is invalid")
        }
    }
}

pub fn load_device(common: &CommonArgs) -> Result<SimulatedDevice> {
    let spec = match &common.device {
        Some(path) => read_device_spec(path)?,
        None => SimulatedDeviceSpec::default(),
    };
    debug!(name = %spec.name, xcc_count = spec.xcc_count, "simulated device");
    SimulatedDevice::from_spec(&spec).context("Invalid device description")
}

fn read_device_spec(path: &Path) -> Result<SimulatedDeviceSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read device file {}", path.display()))?;
    let file: DeviceFile = toml::from_str(&text)
        .with_context(|| format!("Failed to parse device file {}", path.display()))?;
    Ok(file.device)
}

pub fn load_config(common: &CommonArgs) -> Result<ProfilerConfig> {
    let cfg = ProfilerConfig::load(common.config.as_deref())?;
    debug!(counters = cfg.counters.len(), replay_mode = %cfg.replay_mode, "profiler config");
    Ok(cfg)
}

/// Metrics named on the command line, or else the configured counter list
pub fn requested_metrics(cfg: &ProfilerConfig, metrics: &[String]) -> Result<Vec<String>> {
    let names = if metrics.is_empty() {
        cfg.counters.clone()
    } else {
        parse_counter_list(&metrics.join(" "))
    };

    if names.is_empty() {
        anyhow::bail!("No metrics requested (use --metrics or set ROCSCOPE_COUNTERS)");
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn common() -> CommonArgs {
        CommonArgs {
            catalog: None,
            device: None,
            config: None,
            verbose: false,
        }
    }

    #[test]
    fn test_builtin_catalog_loads() {
        use rocscope_profiler::MetricCatalog;

        let catalog = load_catalog(&common()).unwrap();
        assert!(catalog.get("GPUBusy").is_some());
        assert_eq!(catalog.get("MissPerBusy").unwrap().counters().len(), 3);
    }

    #[test]
    fn test_device_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[device]
name = "gfx942"
xcc_count = 8

[device.block_capacity]
SQ = 8
"#
        )
        .unwrap();

        let args = CommonArgs {
            device: Some(file.path().to_path_buf()),
            ..common()
        };
        let dev = load_device(&args).unwrap();
        assert_eq!(dev.xcc_count(), 8);
    }

    #[test]
    fn test_requested_metrics_from_args() {
        let names = requested_metrics(
            &ProfilerConfig::default(),
            &["pmc:".to_string(), "GPUBusy".to_string(), "GPUBusy,TCC_HIT".to_string()],
        )
        .unwrap();
        assert_eq!(names, vec!["GPUBusy", "TCC_HIT"]);
    }

    #[test]
    fn test_requested_metrics_from_config() {
        let cfg = ProfilerConfig {
            counters: vec!["SQ_WAVES".to_string(), "GPUBusy".to_string()],
            ..Default::default()
        };
        assert_eq!(requested_metrics(&cfg, &[]).unwrap(), vec!["SQ_WAVES", "GPUBusy"]);

        let names = requested_metrics(&cfg, &["TCC_HIT".to_string()]).unwrap();
        assert_eq!(names, vec!["TCC_HIT"]);

        assert!(requested_metrics(&ProfilerConfig::default(), &[]).is_err());
    }
}
