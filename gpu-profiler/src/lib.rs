//! GPU counter profiling runtime
//!
//! Manages profiling sessions and evaluates hardware performance-counter
//! metrics: resolving metric names to hardware events under per-block capacity
//! limits, aggregating raw samples per compute partition (XCC), and computing
//! derived metrics.

pub mod config;
pub mod error;
pub mod hardware;
pub mod metrics;
pub mod session;

pub use config::ProfilerConfig;
pub use error::{ProfilerError, Result};
pub use hardware::{HardwareBackend, HardwareError, ProfileBuffer, SimulatedDevice};
pub use metrics::{InMemoryCatalog, MetricCatalog, MetricEngine, MetricSnapshot, ProfilePass};
pub use session::{DeviceProfileSession, Session, SessionRegistry};
