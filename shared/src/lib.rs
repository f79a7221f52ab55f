//! Shared types and utilities for rocscope
//!
//! This crate contains the hardware-facing identifiers (events, blocks, agents)
//! and session identifiers used by the profiler runtime and the CLI.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{agent::*, events::*, session::*};
