use std::time::Duration;

use crisp_core::models::{CompressionOptions, Dimensions, ImageAsset, OutputFormat};
use crisp_core::EngineError;
use image::imageops;

use super::resize::ImageResize;
use crate::compression::ImageCompressor;
use crate::format::{self, FormatNormalizer, RasterTarget};
use crate::raster::Raster;
use crate::runtime::bounded_blocking;

/// Longest edge of generated previews
pub const PREVIEW_EDGE: u32 = 256;

/// Fills in format, natural dimensions and a preview on ingested assets
#[derive(Debug, Clone, Copy)]
pub struct AssetInspector {
    normalizer: FormatNormalizer,
    timeout: Duration,
}

impl AssetInspector {
    pub fn new(max_pixels: u64, timeout: Duration) -> Self {
        Self {
            normalizer: FormatNormalizer::new(max_pixels),
            timeout,
        }
    }

    /// Inspect `asset` in place. Undecodable sources still get dimensions
    /// and a placeholder preview.
    pub async fn inspect(&self, asset: &mut ImageAsset) -> Result<(), EngineError> {
        let snapshot = asset.clone();
        let normalizer = self.normalizer;

        let (info, dimensions, preview) = bounded_blocking("inspect", self.timeout, move || {
            let info = format::detect(&snapshot);
            let mut probed = snapshot.clone();
            probed.format = Some(info);

            let preview_source = normalizer.normalize(&probed, RasterTarget::LongestSide(PREVIEW_EDGE));
            let dimensions = format::probe_dimensions(&probed, info)
                .map(|(w, h)| Dimensions::new(w, h))
                .unwrap_or_else(|| preview_source.raster.dimensions());

            let raster = &preview_source.raster;
            let thumb = if raster.width().max(raster.height()) > PREVIEW_EDGE {
                let (w, h) = ImageResize::dimensions_for(raster.width(), raster.height(), PREVIEW_EDGE);
                Raster::from_rgba(imageops::thumbnail(raster.as_rgba(), w, h))
            } else {
                raster.clone()
            };
            let preview = ImageCompressor::encode(
                &thumb,
                OutputFormat::Png,
                &CompressionOptions::default(),
                true,
            )?;
            Ok((info, dimensions, preview.bytes))
        })
        .await?;

        tracing::debug!(
            name = %asset.name,
            format = ?info.format,
            dimensions = %dimensions,
            "Asset inspected"
        );
        asset.format = Some(info);
        asset.dimensions = Some(dimensions);
        asset.preview = Some(preview);
        Ok(())
    }
}
