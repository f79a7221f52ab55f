//! Simulated GPU backend
//!
//! Stands in for the driver in tests and in the CLI. Output buffer layout:
//!
//! * partition 0 holds one little-endian `u64` per programmed event, in
//!   programming order, device-wide (UMC) events included;
//! * partitions `1..xcc_count` each hold one `u64` per non device-wide event.
//!
//! With a single partition every event appears exactly once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rocscope_shared::{
    Agent, AgentKind, BlockKind, DeviceInfo, Event, ParseBlockKindError, SAMPLE_BYTE_WIDTH,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{HardwareBackend, HardwareError, ProfileBuffer};

const CPU_HANDLE_BASE: u64 = 0x1000;
const GPU_HANDLE_BASE: u64 = 0x2000;

fn default_capacity() -> u32 {
    4
}

fn default_one() -> u32 {
    1
}

/// Description of a simulated device, usually read from the `[device]` table of
/// a TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDeviceSpec {
    pub name: String,

    #[serde(default = "default_one")]
    pub xcc_count: u32,

    #[serde(default = "default_one")]
    pub cpu_agents: u32,

    #[serde(default = "default_one")]
    pub gpu_agents: u32,

    /// Capacity for blocks not listed in `block_capacity`
    #[serde(default = "default_capacity")]
    pub default_block_capacity: u32,

    /// Per-block counter capacity keyed by block name (`SQ`, `TCC`, ...)
    #[serde(default)]
    pub block_capacity: BTreeMap<String, u32>,
}

impl Default for SimulatedDeviceSpec {
    fn default() -> Self {
        Self {
            name: "gfx-sim".to_string(),
            xcc_count: 1,
            cpu_agents: 1,
            gpu_agents: 1,
            default_block_capacity: default_capacity(),
            block_capacity: BTreeMap::new(),
        }
    }
}

/// In-process [`HardwareBackend`] with configurable partitions and capacities
#[derive(Debug)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    cpu_agents: u32,
    gpu_agents: u32,
    default_capacity: u32,
    capacity: BTreeMap<BlockKind, u32>,
    capacity_queries: AtomicUsize,
    fail_iteration: AtomicBool,
    fail_capacity: AtomicBool,
}

impl SimulatedDevice {
    /// A single-GPU device with `xcc_count` partitions and default capacities
    pub fn new(name: &str, xcc_count: u32) -> Self {
        Self {
            info: DeviceInfo {
                name: name.to_string(),
                xcc_count: xcc_count.max(1),
            },
            cpu_agents: 1,
            gpu_agents: 1,
            default_capacity: default_capacity(),
            capacity: BTreeMap::new(),
            capacity_queries: AtomicUsize::new(0),
            fail_iteration: AtomicBool::new(false),
            fail_capacity: AtomicBool::new(false),
        }
    }

    pub fn from_spec(spec: &SimulatedDeviceSpec) -> Result<Self, ParseBlockKindError> {
        let mut capacity = BTreeMap::new();
        for (name, max) in &spec.block_capacity {
            capacity.insert(name.parse::<BlockKind>()?, *max);
        }
        Ok(Self {
            info: DeviceInfo {
                name: spec.name.clone(),
                xcc_count: spec.xcc_count.max(1),
            },
            cpu_agents: spec.cpu_agents,
            gpu_agents: spec.gpu_agents,
            default_capacity: spec.default_block_capacity,
            capacity,
            capacity_queries: AtomicUsize::new(0),
            fail_iteration: AtomicBool::new(false),
            fail_capacity: AtomicBool::new(false),
        })
    }

    /// Override the counter capacity of one block kind
    pub fn with_block_capacity(mut self, block: BlockKind, max: u32) -> Self {
        self.capacity.insert(block, max);
        self
    }

    pub fn xcc_count(&self) -> u32 {
        self.info.xcc_count
    }

    /// Number of capacity queries served so far
    pub fn capacity_queries(&self) -> usize {
        self.capacity_queries.load(Ordering::Relaxed)
    }

    /// Make subsequent `iterate_samples` calls fail
    pub fn set_iteration_failure(&self, fail: bool) {
        self.fail_iteration.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent `block_counter_capacity` calls fail
    pub fn set_capacity_failure(&self, fail: bool) {
        self.fail_capacity.store(fail, Ordering::Relaxed);
    }

    /// The first GPU agent
    pub fn gpu(&self) -> Agent {
        gpu_agent(0)
    }

    /// The event sequence the device writes for `events`, in buffer order,
    /// paired with the partition each slot belongs to
    fn layout<'a>(&self, events: &'a [Event]) -> Vec<(u32, &'a Event)> {
        let mut slots: Vec<(u32, &Event)> = events.iter().map(|e| (0, e)).collect();
        for xcc in 1..self.info.xcc_count {
            slots.extend(
                events
                    .iter()
                    .filter(|e| !e.block.is_device_wide())
                    .map(|e| (xcc, e)),
            );
        }
        slots
    }

    /// Build the output buffer a kernel run would produce. `value` is asked for
    /// the raw count of each `(partition, event)` slot.
    pub fn capture<F>(&self, agent: &Agent, events: &[Event], mut value: F) -> ProfileBuffer
    where
        F: FnMut(u32, &Event) -> u64,
    {
        let slots = self.layout(events);
        let mut data = Vec::with_capacity(slots.len() * SAMPLE_BYTE_WIDTH);
        for (xcc, event) in slots {
            data.extend_from_slice(&value(xcc, event).to_le_bytes());
        }
        ProfileBuffer::new(agent.clone(), events.to_vec(), data)
    }

    fn check_gpu(&self, agent: &Agent) -> Result<(), HardwareError> {
        if agent.kind == AgentKind::Gpu && agent.index < self.gpu_agents {
            Ok(())
        } else {
            Err(HardwareError::UnknownAgent(agent.handle))
        }
    }
}

fn gpu_agent(index: u32) -> Agent {
    Agent {
        handle: GPU_HANDLE_BASE + index as u64,
        kind: AgentKind::Gpu,
        index,
    }
}

impl HardwareBackend for SimulatedDevice {
    fn agents(&self) -> Vec<Agent> {
        let cpus = (0..self.cpu_agents).map(|index| Agent {
            handle: CPU_HANDLE_BASE + index as u64,
            kind: AgentKind::Cpu,
            index,
        });
        cpus.chain((0..self.gpu_agents).map(gpu_agent)).collect()
    }

    fn device_info(&self, agent: &Agent) -> Result<DeviceInfo, HardwareError> {
        self.check_gpu(agent)?;
        Ok(self.info.clone())
    }

    fn block_counter_capacity(&self, agent: &Agent, event: &Event) -> Result<u32, HardwareError> {
        self.check_gpu(agent)?;
        self.capacity_queries.fetch_add(1, Ordering::Relaxed);
        if self.fail_capacity.load(Ordering::Relaxed) {
            return Err(HardwareError::CapacityQuery {
                event: *event,
                reason: "device reported an error".to_string(),
            });
        }
        let max = self
            .capacity
            .get(&event.block)
            .copied()
            .unwrap_or(self.default_capacity);
        debug!(block = %event.block_key(), max, "block capacity query");
        Ok(max)
    }

    fn iterate_samples(
        &self,
        buffer: &ProfileBuffer,
        visit: &mut dyn FnMut(&Event, f64),
    ) -> Result<(), HardwareError> {
        self.check_gpu(&buffer.agent)?;
        if self.fail_iteration.load(Ordering::Relaxed) {
            return Err(HardwareError::Iterate("device reported an error".to_string()));
        }
        if buffer.size() % SAMPLE_BYTE_WIDTH != 0 {
            return Err(HardwareError::Iterate(format!(
                "buffer size {} is not a multiple of {}",
                buffer.size(),
                SAMPLE_BYTE_WIDTH
            )));
        }

        let slots = self.layout(&buffer.events);
        let samples = buffer.data.chunks_exact(SAMPLE_BYTE_WIDTH);
        if samples.len() > slots.len() {
            return Err(HardwareError::Iterate(format!(
                "buffer holds {} samples but only {} were programmed",
                samples.len(),
                slots.len()
            )));
        }

        for (chunk, (_, event)) in samples.zip(slots) {
            let mut raw = [0u8; SAMPLE_BYTE_WIDTH];
            raw.copy_from_slice(chunk);
            visit(event, u64::from_le_bytes(raw) as f64);
        }
        Ok(())
    }
}
