//! Agent (device) identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an execution agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Cpu,
    Gpu,
}

/// A CPU or GPU agent as enumerated by the hardware layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    /// Opaque runtime handle
    pub handle: u64,

    pub kind: AgentKind,

    /// Index among agents of the same kind
    pub index: u32,
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AgentKind::Cpu => "cpu",
            AgentKind::Gpu => "gpu",
        };
        write!(f, "{}{} (handle 0x{:x})", kind, self.index, self.handle)
    }
}

/// Static properties of a GPU agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Marketing or architecture name, e.g. `gfx942`
    pub name: String,

    /// Number of independently counted partitions (XCCs); at least 1
    pub xcc_count: u32,
}
