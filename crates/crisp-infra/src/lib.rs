//! Crisp Infrastructure Library
//!
//! This crate provides host-side infrastructure shared by crisp front ends:
//! - Telemetry initialization
//! - System memory monitoring for the upscaler pool

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "capacity")]
pub mod capacity;

#[cfg(feature = "observability-basic")]
pub use telemetry::init_telemetry;

#[cfg(feature = "capacity")]
pub use capacity::{MemorySnapshot, SystemMemoryMonitor};
