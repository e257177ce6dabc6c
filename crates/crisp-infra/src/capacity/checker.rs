use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use sysinfo::System;
use tracing::{error, warn};

use crisp_core::MemoryPressure;

/// Point-in-time memory reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl MemorySnapshot {
    pub fn available_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }

    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

#[derive(Clone)]
pub struct SystemMemoryMonitor {
    max_usage_percent: f64,
    system: Arc<std::sync::Mutex<System>>,
}

impl SystemMemoryMonitor {
    pub fn new(max_usage_percent: f64) -> Self {
        let mut system = System::new();
        system.refresh_memory();

        Self {
            max_usage_percent,
            system: Arc::new(std::sync::Mutex::new(system)),
        }
    }

    pub fn max_usage_percent(&self) -> f64 {
        self.max_usage_percent
    }

    /// Refresh and read system memory
    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        let mut system = self.system.lock().map_err(|e| {
            error!(error = %e, "Failed to acquire system lock for memory check");
            anyhow::anyhow!("Failed to check memory: mutex poisoned")
        })?;
        system.refresh_memory();

        Ok(MemorySnapshot {
            total_bytes: system.total_memory(),
            used_bytes: system.used_memory(),
        })
    }

    /// Whether usage exceeds the configured threshold
    pub fn exceeds_threshold(&self) -> Result<bool> {
        let snapshot = self.snapshot()?;
        let usage_percent = snapshot.usage_percent();
        if usage_percent > self.max_usage_percent {
            warn!(
                usage_percent = usage_percent,
                threshold = self.max_usage_percent,
                available_bytes = snapshot.available_bytes(),
                "Memory usage exceeds threshold"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Refresh in spawn_blocking to avoid blocking the runtime
    pub async fn exceeds_threshold_async(&self) -> Result<bool> {
        let monitor = self.clone();
        tokio::task::spawn_blocking(move || monitor.exceeds_threshold())
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking for memory check: {}", e))?
    }
}

#[async_trait]
impl MemoryPressure for SystemMemoryMonitor {
    async fn under_pressure(&self) -> bool {
        match self.exceeds_threshold_async().await {
            Ok(high) => high,
            Err(e) => {
                warn!(error = %e, "Memory check failed, assuming no pressure");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_usage_percent() {
        let snapshot = MemorySnapshot {
            total_bytes: 1000,
            used_bytes: 250,
        };
        assert_eq!(snapshot.usage_percent(), 25.0);
        assert_eq!(snapshot.available_bytes(), 750);
    }

    #[test]
    fn test_snapshot_with_unknown_total() {
        let snapshot = MemorySnapshot {
            total_bytes: 0,
            used_bytes: 10,
        };
        assert_eq!(snapshot.usage_percent(), 0.0);
        assert_eq!(snapshot.available_bytes(), 0);
    }

    #[tokio::test]
    async fn test_threshold_above_hundred_never_reports_pressure() {
        let monitor = SystemMemoryMonitor::new(101.0);
        assert!(!monitor.under_pressure().await);
    }
}
