//! Core data types shared across crates

pub mod agent;
pub mod events;
pub mod session;
