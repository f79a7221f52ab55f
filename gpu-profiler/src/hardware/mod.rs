//! Hardware layer interface
//!
//! The metric engine never talks to a driver directly. Everything it needs from
//! the device goes through [`HardwareBackend`]: partition count, per-block counter
//! capacity, and ordered iteration over the samples of a completed profile.

pub mod simulated;

use rocscope_shared::{Agent, AgentKind, DeviceInfo, Event};

pub use simulated::{SimulatedDevice, SimulatedDeviceSpec};

/// Errors reported by the hardware layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    #[error("unknown agent handle 0x{0:x}")]
    UnknownAgent(u64),

    #[error("get block_counters info failed for {event}: {reason}")]
    CapacityQuery { event: Event, reason: String },

    #[error("sample iteration failed: {0}")]
    Iterate(String),
}

/// A completed hardware profile: the events that were programmed and the raw
/// output buffer the device wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileBuffer {
    /// Agent the profile was collected on
    pub agent: Agent,

    /// Programmed events, in programming order
    pub events: Vec<Event>,

    /// Raw output buffer
    pub data: Vec<u8>,
}

impl ProfileBuffer {
    pub fn new(agent: Agent, events: Vec<Event>, data: Vec<u8>) -> Self {
        Self {
            agent,
            events,
            data,
        }
    }

    /// Size of the output buffer in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Access to the device-side profiling primitives
pub trait HardwareBackend: Send + Sync {
    /// All agents known to the runtime
    fn agents(&self) -> Vec<Agent>;

    /// Static device properties for a GPU agent
    fn device_info(&self, agent: &Agent) -> Result<DeviceInfo, HardwareError>;

    /// Maximum number of counters that can be programmed at once on the block
    /// instance `event` belongs to
    fn block_counter_capacity(&self, agent: &Agent, event: &Event) -> Result<u32, HardwareError>;

    /// Deliver every `(event, value)` pair of `buffer` to `visit`, in buffer order
    fn iterate_samples(
        &self,
        buffer: &ProfileBuffer,
        visit: &mut dyn FnMut(&Event, f64),
    ) -> Result<(), HardwareError>;

    /// Find the `index`-th agent of the given kind
    fn find_agent(&self, kind: AgentKind, index: u32) -> Option<Agent> {
        self.agents()
            .into_iter()
            .find(|a| a.kind == kind && a.index == index)
    }
}
