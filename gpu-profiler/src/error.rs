//! Error types for the profiler runtime

use rocscope_shared::{BlockKind, SessionId};

use crate::hardware::HardwareError;
use crate::metrics::catalog::CatalogError;

/// Errors raised by the session registry and the metric engine
#[derive(Debug, thiserror::Error)]
pub enum ProfilerError {
    #[error("input metric '{metric}' not supported on this hardware: {device}")]
    UnknownMetric { metric: String, device: String },

    #[error("bad metric '{0}' is empty")]
    EmptyMetric(String),

    #[error("{counter} exceeded hardware block counters limit ({block}[{index}] holds {max})")]
    CapacityExceeded {
        counter: String,
        block: BlockKind,
        index: u32,
        max: u32,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("metric results not found for '{0}'")]
    MissingResult(String),

    #[error("var '{0}' is not found")]
    UnresolvedVariable(String),

    #[error("partition {index} out of range (device has {xcc_count})")]
    PartitionOutOfRange { index: u32, xcc_count: u32 },

    #[error("couldn't find a created session with id {0}")]
    SessionNotFound(SessionId),

    #[error("couldn't find a device profiling session with id {0}")]
    DeviceSessionNotFound(SessionId),

    #[error("no {kind} agent at index {index}")]
    AgentNotFound { kind: &'static str, index: u32 },
}

pub type Result<T, E = ProfilerError> = std::result::Result<T, E>;
