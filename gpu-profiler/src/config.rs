//! Runtime configuration
//!
//! Values come from an optional TOML file overlaid with `ROCSCOPE_*`
//! environment variables (`ROCSCOPE_COUNTERS`, `ROCSCOPE_REPLAY_MODE`):
//!
//! ```toml
//! counters = ["SQ_WAVES", "GPUBusy"]
//! replay_mode = "kernel"
//! ```

use std::path::Path;

use anyhow::Context;
use rocscope_shared::utils::parse_counter_list;
use rocscope_shared::ReplayMode;
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix of every environment variable the runtime reads
pub const ENV_PREFIX: &str = "ROCSCOPE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Requested counters and metrics; a string is split like a `pmc:` line
    #[serde(default, deserialize_with = "counter_list")]
    pub counters: Vec<String>,

    /// Replay mode of the sessions created for this configuration
    #[serde(default = "default_replay_mode")]
    pub replay_mode: ReplayMode,
}

fn default_replay_mode() -> ReplayMode {
    ReplayMode::Kernel
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CounterListRepr {
    Line(String),
    List(Vec<String>),
}

fn counter_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match CounterListRepr::deserialize(d)? {
        CounterListRepr::Line(line) => parse_counter_list(&line),
        CounterListRepr::List(names) => parse_counter_list(&names.join(",")),
    })
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            counters: Vec::new(),
            replay_mode: default_replay_mode(),
        }
    }
}

impl ProfilerConfig {
    /// Load from `path` (if given) with environment overrides applied on top
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(env)
            .build()
            .context("Failed to read profiler configuration")?;

        let cfg: ProfilerConfig = settings
            .try_deserialize()
            .context("Invalid profiler configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.replay_mode == ReplayMode::User && self.counters.is_empty() {
            anyhow::bail!("User replay mode requires at least one counter");
        }

        Ok(())
    }
}
