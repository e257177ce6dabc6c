//! Processing engine: owner of every piece of pooled state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crisp_core::models::{ImageAsset, ProcessedResult, ProcessingConfig, TemplateSpec};
use crisp_core::{EngineConfig, EngineError, MemoryPressure, NoMemoryPressure};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::detect::SubjectDetector;
use crate::image::AssetInspector;
use crate::traits::{ModelProvider, OfflineModelProvider};
use crate::upscale::UpscalerPool;
use crate::{batch, templates};

/// Progress callback: `(phase, percent)`
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Counters since engine construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub images_processed: u64,
    /// Resize or crop computations performed
    pub transforms_computed: u64,
    pub results_emitted: u64,
    pub failed_results: u64,
}

#[derive(Default)]
struct Counters {
    images: AtomicU64,
    transforms: AtomicU64,
    results: AtomicU64,
    failures: AtomicU64,
}

struct Monitor {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ProcessingEngine {
    config: Arc<EngineConfig>,
    pool: UpscalerPool,
    provider: Arc<dyn ModelProvider>,
    detector: OnceCell<SubjectDetector>,
    pressure: Arc<dyn MemoryPressure>,
    progress: Option<ProgressCallback>,
    counters: Counters,
    monitor: Mutex<Option<Monitor>>,
}

/// Builder for [`ProcessingEngine`]
pub struct ProcessingEngineBuilder {
    config: EngineConfig,
    provider: Arc<dyn ModelProvider>,
    pressure: Arc<dyn MemoryPressure>,
    progress: Option<ProgressCallback>,
}

impl ProcessingEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn memory_pressure(mut self, pressure: Arc<dyn MemoryPressure>) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, u8) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<ProcessingEngine, EngineError> {
        self.config
            .validate()
            .map_err(|e| EngineError::InvalidInput(format!("invalid engine config: {}", e)))?;
        let pool = UpscalerPool::new(self.provider.clone(), &self.config);
        Ok(ProcessingEngine {
            config: Arc::new(self.config),
            pool,
            provider: self.provider,
            detector: OnceCell::new(),
            pressure: self.pressure,
            progress: self.progress,
            counters: Counters::default(),
            monitor: Mutex::new(None),
        })
    }
}

impl ProcessingEngine {
    pub fn builder() -> ProcessingEngineBuilder {
        ProcessingEngineBuilder {
            config: EngineConfig::default(),
            provider: Arc::new(OfflineModelProvider),
            pressure: Arc::new(NoMemoryPressure),
            progress: None,
        }
    }

    /// Start the memory-pressure monitor. Calling twice is a no-op.
    pub fn init(&self) {
        let mut monitor = self.monitor.lock().unwrap_or_else(|p| p.into_inner());
        if monitor.is_some() {
            return;
        }
        let cancel_token = CancellationToken::new();
        let handle = self.pool.start_monitor(
            self.pressure.clone(),
            self.config.monitor_interval,
            cancel_token.clone(),
        );
        *monitor = Some(Monitor {
            cancel_token,
            handle,
        });
        tracing::info!(
            interval_secs = self.config.monitor_interval.as_secs(),
            "Processing engine initialized"
        );
    }

    /// Stop the monitor and dispose every pooled resource
    pub async fn dispose(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(monitor) = monitor {
            monitor.cancel_token.cancel();
            if let Err(e) = monitor.handle.await {
                tracing::warn!(error = %e, "Pool monitor ended abnormally");
            }
        }
        let disposed = self.pool.teardown();
        tracing::info!(disposed, "Processing engine disposed");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &UpscalerPool {
        &self.pool
    }

    /// Subject detector, loaded from the model provider on first use.
    ///
    /// A failed load is cached as the heuristic detector.
    pub async fn detector(&self) -> &SubjectDetector {
        self.detector
            .get_or_init(|| async {
                match self.provider.load_detector().await {
                    Ok(model) => {
                        tracing::info!(detector = model.name(), "Object detector loaded");
                        SubjectDetector::new(Some(model))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Object detector unavailable, using heuristic");
                        SubjectDetector::heuristic_only()
                    }
                }
            })
            .await
    }

    pub fn inspector(&self) -> AssetInspector {
        AssetInspector::new(self.config.max_total_pixels, self.config.decode_timeout)
    }

    /// Detect format, dimensions and preview of `asset`
    pub async fn inspect(&self, asset: &mut ImageAsset) -> Result<(), EngineError> {
        self.inspector().inspect(asset).await
    }

    /// Apply `config` to every image, in order
    pub async fn process_batch(
        &self,
        images: &[ImageAsset],
        config: &ProcessingConfig,
        ai_available: bool,
    ) -> Result<Vec<ProcessedResult>, EngineError> {
        batch::process_batch(self, images, config, ai_available).await
    }

    /// Render every template in `specs` from one image
    pub async fn expand_templates(
        &self,
        image: &ImageAsset,
        specs: &[TemplateSpec],
        ai_available: bool,
    ) -> Result<Vec<ProcessedResult>, EngineError> {
        templates::expand_templates(self, image, specs, ai_available).await
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            images_processed: self.counters.images.load(Ordering::Relaxed),
            transforms_computed: self.counters.transforms.load(Ordering::Relaxed),
            results_emitted: self.counters.results.load(Ordering::Relaxed),
            failed_results: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn report(&self, phase: &str, percent: u8) {
        if let Some(callback) = &self.progress {
            callback(phase, percent.min(100));
        }
    }

    pub(crate) fn record_image(&self) {
        self.counters.images.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transform(&self) {
        self.counters.transforms.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_results(&self, results: &[ProcessedResult]) {
        let failed = results.iter().filter(|r| !r.is_success()).count() as u64;
        self.counters
            .results
            .fetch_add(results.len() as u64, Ordering::Relaxed);
        self.counters.failures.fetch_add(failed, Ordering::Relaxed);
    }
}

impl Default for ProcessingEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        let provider: Arc<dyn ModelProvider> = Arc::new(OfflineModelProvider);
        Self {
            pool: UpscalerPool::new(provider.clone(), &config),
            config: Arc::new(config),
            provider,
            detector: OnceCell::new(),
            pressure: Arc::new(NoMemoryPressure),
            progress: None,
            counters: Counters::default(),
            monitor: Mutex::new(None),
        }
    }
}
