//! Capability traits
//!
//! Object detection and learned enlargement are optional capabilities the
//! engine receives through a `ModelProvider`. Every call site degrades to a
//! deterministic fallback when a capability is missing or fails.

use std::sync::Arc;

use async_trait::async_trait;
use crisp_core::models::SubjectDetection;
use crisp_core::EngineError;

use crate::raster::Raster;

/// Detects objects in a raster
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Unranked detections in pixel coordinates of `raster`
    async fn detect(&self, raster: &Raster) -> Result<Vec<SubjectDetection>, EngineError>;
}

/// Enlarges a raster by an integer factor
#[async_trait]
pub trait Enlarger: Send + Sync {
    fn name(&self) -> &str;

    /// Output is `scale` times the input on both axes
    async fn enlarge(&self, raster: &Raster, scale: u32) -> Result<Raster, EngineError>;

    /// Release backing resources. Called once when the pool disposes the enlarger.
    fn dispose(&self) {}
}

/// Source of model-backed capabilities
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>, EngineError>;

    async fn load_enlarger(&self, scale: u32) -> Result<Arc<dyn Enlarger>, EngineError>;
}

/// Provider with no models; every load reports `ModelUnavailable`
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineModelProvider;

#[async_trait]
impl ModelProvider for OfflineModelProvider {
    async fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>, EngineError> {
        Err(EngineError::ModelUnavailable(
            "no object detection model configured".to_string(),
        ))
    }

    async fn load_enlarger(&self, scale: u32) -> Result<Arc<dyn Enlarger>, EngineError> {
        Err(EngineError::ModelUnavailable(format!(
            "no x{} enlargement model configured",
            scale
        )))
    }
}
