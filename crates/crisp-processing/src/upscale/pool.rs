//! Reference-counted pool of enlargement resources, one per scale factor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crisp_core::{EngineConfig, EngineError, MemoryPressure};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;

use super::resample::ResampleEnlarger;
use super::scale::{CPU_SCALE, POOLED_SCALES};
use crate::image::SharpenKernel;
use crate::raster::Raster;
use crate::traits::{Enlarger, ModelProvider};

struct Entry {
    enlarger: Arc<dyn Enlarger>,
    learned: bool,
    usage_count: u32,
    last_used_at: Instant,
}

/// Point-in-time view of one pooled resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntryStatus {
    pub scale: u32,
    pub usage_count: u32,
    pub learned: bool,
}

struct PoolInner {
    entries: Mutex<HashMap<u32, Entry>>,
    provider: Arc<dyn ModelProvider>,
    cleanup_in_progress: AtomicBool,
    idle_window: Duration,
    soft_cleanup_idle: Duration,
    kernel: SharpenKernel,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Entry>> {
        // A panic while holding the lock leaves counts intact; keep going
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_scale(self: &Arc<Self>, scale: u32) {
        let reached_zero = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(&scale) else {
                tracing::warn!(scale, "Release for a scale with no pooled resource");
                return;
            };
            if entry.usage_count == 0 {
                tracing::warn!(scale, "Release without a matching acquire ignored");
                return;
            }
            entry.usage_count -= 1;
            entry.last_used_at = Instant::now();
            entry.usage_count == 0
        };

        if reached_zero {
            self.schedule_idle_disposal(scale);
        }
    }

    fn schedule_idle_disposal(self: &Arc<Self>, scale: u32) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(scale, "No runtime to schedule idle disposal; left for cleanup");
            return;
        };
        let weak: Weak<PoolInner> = Arc::downgrade(self);
        let idle_window = self.idle_window;
        handle.spawn(async move {
            tokio::time::sleep(idle_window).await;
            if let Some(inner) = weak.upgrade() {
                inner.dispose_if_idle(scale);
            }
        });
    }

    /// Disposal re-check: only an unused entry idle for the full window goes
    fn dispose_if_idle(&self, scale: u32) {
        let removed = {
            let mut entries = self.lock();
            let idle = entries.get(&scale).is_some_and(|e| {
                e.usage_count == 0 && e.last_used_at.elapsed() >= self.idle_window
            });
            if idle {
                entries.remove(&scale)
            } else {
                None
            }
        };
        if let Some(entry) = removed {
            tracing::debug!(scale, "Disposing idle upscale resource");
            entry.enlarger.dispose();
        }
    }
}

/// Upscaler resource pool
#[derive(Clone)]
pub struct UpscalerPool {
    inner: Arc<PoolInner>,
}

/// Handle to a pooled enlarger; releases its usage on drop
pub struct UpscaleLease {
    pool: Arc<PoolInner>,
    scale: u32,
    enlarger: Arc<dyn Enlarger>,
    learned: bool,
    released: bool,
}

impl std::fmt::Debug for UpscaleLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpscaleLease")
            .field("scale", &self.scale)
            .field("enlarger", &self.enlarger.name())
            .field("learned", &self.learned)
            .finish()
    }
}

impl UpscaleLease {
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Whether the resource is model-backed rather than resampling
    pub fn is_learned(&self) -> bool {
        self.learned
    }

    pub async fn enlarge(&self, raster: &Raster) -> Result<Raster, EngineError> {
        self.enlarger.enlarge(raster, self.scale).await
    }
}

impl Drop for UpscaleLease {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release_scale(self.scale);
        }
    }
}

impl UpscalerPool {
    pub fn new(provider: Arc<dyn ModelProvider>, config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                entries: Mutex::new(HashMap::new()),
                provider,
                cleanup_in_progress: AtomicBool::new(false),
                idle_window: config.pool_idle_window,
                soft_cleanup_idle: config.soft_cleanup_idle,
                kernel: SharpenKernel::from(config),
            }),
        }
    }

    /// Check out the resource for `scale`, constructing it on first use
    pub async fn acquire(&self, scale: u32) -> Result<UpscaleLease, EngineError> {
        if scale != CPU_SCALE && !POOLED_SCALES.contains(&scale) {
            return Err(EngineError::InvalidInput(format!(
                "unsupported upscale factor {}",
                scale
            )));
        }

        if let Some(lease) = self.reuse(scale) {
            return Ok(lease);
        }

        let (enlarger, learned) = self.construct(scale).await;

        let lease = {
            let mut entries = self.inner.lock();
            let entry = entries.entry(scale).or_insert_with(|| Entry {
                enlarger: enlarger.clone(),
                learned,
                usage_count: 0,
                last_used_at: Instant::now(),
            });
            entry.usage_count += 1;
            entry.last_used_at = Instant::now();
            self.lease(scale, entry)
        };

        if !Arc::ptr_eq(&lease.enlarger, &enlarger) {
            // Lost a construction race; the pooled instance wins
            enlarger.dispose();
        }
        tracing::debug!(scale, learned = lease.learned, "Upscale resource acquired");
        Ok(lease)
    }

    fn reuse(&self, scale: u32) -> Option<UpscaleLease> {
        let mut entries = self.inner.lock();
        let entry = entries.get_mut(&scale)?;
        entry.usage_count += 1;
        entry.last_used_at = Instant::now();
        Some(self.lease(scale, entry))
    }

    fn lease(&self, scale: u32, entry: &Entry) -> UpscaleLease {
        UpscaleLease {
            pool: self.inner.clone(),
            scale,
            enlarger: entry.enlarger.clone(),
            learned: entry.learned,
            released: false,
        }
    }

    async fn construct(&self, scale: u32) -> (Arc<dyn Enlarger>, bool) {
        let resample = || -> Arc<dyn Enlarger> { Arc::new(ResampleEnlarger::new(self.inner.kernel)) };
        if scale == CPU_SCALE {
            return (resample(), false);
        }
        match self.inner.provider.load_enlarger(scale).await {
            Ok(enlarger) => (enlarger, true),
            Err(e) => {
                tracing::info!(scale, error = %e, "Learned enlarger unavailable, using resampling");
                (resample(), false)
            }
        }
    }

    /// Return a lease to the pool
    pub fn release(&self, mut lease: UpscaleLease) {
        lease.released = true;
        self.inner.release_scale(lease.scale);
    }

    /// Decrement the usage of `scale`; over-release is logged and ignored
    pub fn release_scale(&self, scale: u32) {
        self.inner.release_scale(scale);
    }

    pub fn usage_count(&self, scale: u32) -> Option<u32> {
        self.inner.lock().get(&scale).map(|e| e.usage_count)
    }

    pub fn in_use(&self) -> bool {
        self.inner.lock().values().any(|e| e.usage_count > 0)
    }

    pub fn status(&self) -> Vec<PoolEntryStatus> {
        let mut status: Vec<PoolEntryStatus> = self
            .inner
            .lock()
            .iter()
            .map(|(scale, e)| PoolEntryStatus {
                scale: *scale,
                usage_count: e.usage_count,
                learned: e.learned,
            })
            .collect();
        status.sort_by_key(|s| s.scale);
        status
    }

    /// Evict unused resources idle for at least the soft-cleanup window.
    ///
    /// Skipped when another cleanup is running. Returns the number evicted.
    pub fn soft_cleanup(&self) -> usize {
        if self
            .inner
            .cleanup_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Cleanup already in progress, skipping soft cleanup");
            return 0;
        }

        let evicted = self.collect_disposable(|e| {
            e.usage_count == 0 && e.last_used_at.elapsed() >= self.inner.soft_cleanup_idle
        });
        self.inner.cleanup_in_progress.store(false, Ordering::Release);

        let count = evicted.len();
        for enlarger in evicted {
            enlarger.dispose();
        }
        if count > 0 {
            tracing::info!(count, "Soft cleanup evicted idle upscale resources");
        }
        count
    }

    /// Dispose every resource; refused while any is in use or another cleanup runs
    pub fn aggressive_cleanup(&self) -> Result<usize, EngineError> {
        if self
            .inner
            .cleanup_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::ResourceBusy(
                "another pool cleanup is running".to_string(),
            ));
        }

        let result = {
            let mut entries = self.inner.lock();
            let busy: Vec<u32> = entries
                .iter()
                .filter(|(_, e)| e.usage_count > 0)
                .map(|(scale, _)| *scale)
                .collect();
            if busy.is_empty() {
                Ok(entries.drain().map(|(_, e)| e.enlarger).collect::<Vec<_>>())
            } else {
                Err(EngineError::ResourceBusy(format!(
                    "upscale resources in use for scales {:?}",
                    busy
                )))
            }
        };
        self.inner.cleanup_in_progress.store(false, Ordering::Release);

        let evicted = result?;
        let count = evicted.len();
        for enlarger in evicted {
            enlarger.dispose();
        }
        tracing::info!(count, "Aggressive cleanup disposed upscale resources");
        Ok(count)
    }

    /// Dispose everything regardless of usage
    pub fn teardown(&self) -> usize {
        let drained: Vec<(u32, Entry)> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (scale, entry) in drained {
            if entry.usage_count > 0 {
                tracing::warn!(scale, usage = entry.usage_count, "Tearing down in-use upscale resource");
            }
            entry.enlarger.dispose();
        }
        count
    }

    fn collect_disposable<F>(&self, predicate: F) -> Vec<Arc<dyn Enlarger>>
    where
        F: Fn(&Entry) -> bool,
    {
        let mut entries = self.inner.lock();
        let scales: Vec<u32> = entries
            .iter()
            .filter(|(_, e)| predicate(e))
            .map(|(scale, _)| *scale)
            .collect();
        scales
            .into_iter()
            .filter_map(|scale| entries.remove(&scale))
            .map(|e| e.enlarger)
            .collect()
    }

    /// One monitor sample: soft cleanup under pressure when nothing is in use
    pub async fn monitor_tick(&self, pressure: &dyn MemoryPressure) -> usize {
        if !pressure.under_pressure().await {
            return 0;
        }
        if self.in_use() {
            tracing::debug!("Memory pressure while upscale resources are in use; skipping");
            return 0;
        }
        tracing::warn!("Memory pressure detected, running soft cleanup");
        self.soft_cleanup()
    }

    /// Periodically sample `pressure` until `cancel_token` fires
    pub fn start_monitor(
        &self,
        pressure: Arc<dyn MemoryPressure>,
        check_interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut interval = interval(check_interval);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(inner) = pool.upgrade() else {
                            break;
                        };
                        UpscalerPool { inner }.monitor_tick(pressure.as_ref()).await;
                    }
                }
            }
            tracing::debug!("Upscale pool monitor stopped");
        })
    }
}
