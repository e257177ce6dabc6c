//! Enlargement: scale selection, pooled enlargers and CPU resampling.

pub mod pool;
pub mod resample;
pub mod scale;

pub use pool::{PoolEntryStatus, UpscaleLease, UpscalerPool};
pub use resample::{tiled_resize, ResampleEnlarger};
pub use scale::{required_ratio, select_scale, ScaleSelection, UpscalePath, CPU_SCALE, POOLED_SCALES};

use crisp_core::{EngineConfig, EngineError};

use crate::image::{ImageResize, SharpenKernel};
use crate::raster::Raster;

/// Result of growing a raster to cover a crop target
#[derive(Debug, Clone)]
pub struct Enlarged {
    pub raster: Raster,
    pub selection: ScaleSelection,
    pub learned: bool,
}

/// Grow `raster` to exactly `cover` (a size covering the crop target).
///
/// Pooled scales enlarge through the pool and then resize the remainder;
/// the CPU paths resample directly.
pub async fn enlarge_to_cover(
    pool: &UpscalerPool,
    raster: &Raster,
    cover: (u32, u32),
    config: &EngineConfig,
) -> Result<Enlarged, EngineError> {
    let selection = select_scale((raster.width(), raster.height()), cover, config);
    let kernel = SharpenKernel::from(config);
    tracing::debug!(
        scale = selection.scale,
        adjusted = selection.adjusted,
        path = ?selection.path,
        "Upscaling before crop"
    );

    match selection.path {
        UpscalePath::Pooled => {
            let lease = pool.acquire(selection.scale).await?;
            let learned = lease.is_learned();
            let enlarged = lease.enlarge(raster).await;
            pool.release(lease);
            let source = enlarged?;

            let raster = tokio::task::spawn_blocking(move || {
                ImageResize::resize_exact(&source, cover.0, cover.1)
            })
            .await
            .map_err(|e| EngineError::Internal(format!("resize task failed: {}", e)))?;
            Ok(Enlarged {
                raster,
                selection,
                learned,
            })
        }
        UpscalePath::Cpu => {
            let source = raster.clone();
            let raster = tokio::task::spawn_blocking(move || {
                ImageResize::resize_sharpened(&source, cover.0, cover.1, kernel)
            })
            .await
            .map_err(|e| EngineError::Internal(format!("resample task failed: {}", e)))?;
            Ok(Enlarged {
                raster,
                selection,
                learned: false,
            })
        }
        UpscalePath::CpuTiled => {
            let source = raster.clone();
            let tile_edge = config.tile_edge;
            let raster = tokio::task::spawn_blocking(move || {
                tiled_resize(&source, cover.0, cover.1, tile_edge, kernel)
            })
            .await
            .map_err(|e| EngineError::Internal(format!("tiled resample task failed: {}", e)))??;
            Ok(Enlarged {
                raster,
                selection,
                learned: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::traits::OfflineModelProvider;

    #[tokio::test]
    async fn test_enlarge_to_cover_exact() {
        let config = EngineConfig::default();
        let pool = UpscalerPool::new(Arc::new(OfflineModelProvider), &config);
        let raster = Raster::filled(300, 200, [7, 7, 7, 255]);

        let out = enlarge_to_cover(&pool, &raster, (880, 600), &config).await.unwrap();
        assert_eq!((out.raster.width(), out.raster.height()), (880, 600));
        assert_eq!(out.selection.scale, 3);
        assert_eq!(out.selection.path, UpscalePath::Pooled);
        assert!(!out.learned);
        assert_eq!(pool.usage_count(3), Some(0));
    }

    #[tokio::test]
    async fn test_enlarge_to_cover_cpu_path() {
        let config = EngineConfig::default();
        let pool = UpscalerPool::new(Arc::new(OfflineModelProvider), &config);
        let raster = Raster::filled(50, 40, [7, 7, 7, 255]);

        let out = enlarge_to_cover(&pool, &raster, (500, 400), &config).await.unwrap();
        assert_eq!((out.raster.width(), out.raster.height()), (500, 400));
        assert_eq!(out.selection.path, UpscalePath::Cpu);
        assert!(pool.status().is_empty());
    }
}
