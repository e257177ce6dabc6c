//! Memory pressure gate for pooled resources.
//!
//! Implementations report whether the host is under memory pressure. The
//! upscaler pool's monitor samples the gate periodically and runs a soft
//! cleanup when it reports pressure.

use async_trait::async_trait;

/// Gate that reports whether the host is short on memory.
#[async_trait]
pub trait MemoryPressure: Send + Sync {
    /// Returns true if memory usage is above the configured threshold.
    async fn under_pressure(&self) -> bool;
}

/// Gate that never reports pressure. Used when no system monitor is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemoryPressure;

#[async_trait]
impl MemoryPressure for NoMemoryPressure {
    async fn under_pressure(&self) -> bool {
        false
    }
}

/// Gate with a fixed answer, handy for hosts that track pressure themselves.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryPressure(pub bool);

#[async_trait]
impl MemoryPressure for FixedMemoryPressure {
    async fn under_pressure(&self) -> bool {
        self.0
    }
}
