//! Memory monitoring
//!
//! This module samples system memory and exposes it as a `MemoryPressure` gate.

pub use checker::{MemorySnapshot, SystemMemoryMonitor};

mod checker;
