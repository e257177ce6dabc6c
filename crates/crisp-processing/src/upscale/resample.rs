use async_trait::async_trait;
use crisp_core::EngineError;
use image::{imageops, RgbaImage};

use crate::image::crop::CropWindow;
use crate::image::resize::SHARPEN_THRESHOLD;
use crate::image::{ImageCrop, ImageFilters, ImageResize, SharpenKernel};
use crate::raster::Raster;
use crate::traits::Enlarger;

/// Source pixels read beyond each tile edge so filters see real neighbors
const TILE_MARGIN: u32 = 3;

/// Enlarger backed by high-quality resampling plus sharpening
#[derive(Debug, Clone, Copy)]
pub struct ResampleEnlarger {
    kernel: SharpenKernel,
}

impl ResampleEnlarger {
    pub fn new(kernel: SharpenKernel) -> Self {
        Self { kernel }
    }
}

#[async_trait]
impl Enlarger for ResampleEnlarger {
    fn name(&self) -> &str {
        "resample"
    }

    async fn enlarge(&self, raster: &Raster, scale: u32) -> Result<Raster, EngineError> {
        let source = raster.clone();
        let kernel = self.kernel;
        let (width, height) = (
            raster.width().saturating_mul(scale.max(1)),
            raster.height().saturating_mul(scale.max(1)),
        );
        tokio::task::spawn_blocking(move || {
            ImageResize::resize_sharpened(&source, width, height, kernel)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("resample task failed: {}", e)))
    }
}

/// Resample to `width` x `height` one `tile_edge` output tile at a time.
///
/// Each tile reads a slightly larger source window so seams line up, and is
/// sharpened before it is copied out, so the output buffer is the only
/// full-size allocation.
pub fn tiled_resize(
    raster: &Raster,
    width: u32,
    height: u32,
    tile_edge: u32,
    kernel: SharpenKernel,
) -> Result<Raster, EngineError> {
    let (sw, sh) = (raster.width(), raster.height());
    let (width, height, tile_edge) = (width.max(1), height.max(1), tile_edge.max(16));
    let step_x = sw as f64 / width as f64;
    let step_y = sh as f64 / height as f64;

    let sharpen = ImageResize::enlargement_factor((sw, sh), (width, height)) >= SHARPEN_THRESHOLD;
    let mut out = RgbaImage::new(width, height);
    tracing::debug!(sw, sh, width, height, tile_edge, sharpen, "Tiled resample");

    for ty in (0..height).step_by(tile_edge as usize) {
        let th = tile_edge.min(height - ty);
        for tx in (0..width).step_by(tile_edge as usize) {
            let tw = tile_edge.min(width - tx);

            let x0 = ((tx as f64 * step_x).floor() as u32).saturating_sub(TILE_MARGIN);
            let y0 = ((ty as f64 * step_y).floor() as u32).saturating_sub(TILE_MARGIN);
            let x1 = (((tx + tw) as f64 * step_x).ceil() as u32 + TILE_MARGIN).min(sw);
            let y1 = (((ty + th) as f64 * step_y).ceil() as u32 + TILE_MARGIN).min(sh);

            let region = ImageCrop::crop(
                raster,
                CropWindow {
                    x: x0,
                    y: y0,
                    width: (x1 - x0).max(1),
                    height: (y1 - y0).max(1),
                },
            )?;

            let off_x = (tx as f64 - x0 as f64 / step_x).round().max(0.0) as u32;
            let off_y = (ty as f64 - y0 as f64 / step_y).round().max(0.0) as u32;
            let region_w = (((x1 - x0) as f64 / step_x).round() as u32).max(off_x + tw);
            let region_h = (((y1 - y0) as f64 / step_y).round() as u32).max(off_y + th);

            let mut resized = ImageResize::resize_exact(&region, region_w, region_h);
            if sharpen {
                resized = ImageFilters::sharpen(&resized, kernel);
            }
            let tile = imageops::crop_imm(resized.as_rgba(), off_x, off_y, tw, th).to_image();
            imageops::replace(&mut out, &tile, tx as i64, ty as i64);
        }
    }

    Ok(Raster::from_rgba(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resample_enlarger_scales() {
        let enlarger = ResampleEnlarger::new(SharpenKernel::default());
        let raster = Raster::filled(10, 7, [40, 50, 60, 255]);
        let out = enlarger.enlarge(&raster, 3).await.unwrap();
        assert_eq!((out.width(), out.height()), (30, 21));
        assert_eq!(out.pixel(15, 10), [40, 50, 60, 255]);
    }

    #[test]
    fn test_tiled_resize_exact_dimensions() {
        let raster = Raster::filled(50, 30, [200, 10, 10, 255]);
        let out = tiled_resize(&raster, 333, 201, 64, SharpenKernel::default()).unwrap();
        assert_eq!((out.width(), out.height()), (333, 201));
        // Every tile is written
        assert_eq!(out.pixel(0, 0), [200, 10, 10, 255]);
        assert_eq!(out.pixel(332, 200), [200, 10, 10, 255]);
        assert_eq!(out.pixel(64, 64), [200, 10, 10, 255]);
    }

    #[test]
    fn test_tiled_sharpen_matches_single_tile() {
        let gradient = RgbaImage::from_fn(40, 30, |x, _| {
            image::Rgba([(x * 5) as u8, 80, (200 - x * 4) as u8, 255])
        });
        let raster = Raster::from_rgba(gradient);
        let kernel = SharpenKernel::default();

        let tiled = tiled_resize(&raster, 160, 120, 32, kernel).unwrap();
        let whole = tiled_resize(&raster, 160, 120, 4096, kernel).unwrap();
        assert_eq!((tiled.width(), tiled.height()), (160, 120));

        let max_diff = tiled
            .as_bytes()
            .iter()
            .zip(whole.as_bytes())
            .map(|(a, b)| (*a as i16 - *b as i16).abs())
            .max()
            .unwrap();
        assert!(max_diff <= 8, "tile seams differ by {}", max_diff);
    }
}
