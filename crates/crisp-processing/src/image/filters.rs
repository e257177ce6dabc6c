use crisp_core::EngineConfig;
use image::{Rgba, RgbaImage};

use crate::raster::Raster;

/// Coefficients of the post-enlargement sharpen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpenKernel {
    pub center: f32,
    pub neighbor: f32,
}

impl Default for SharpenKernel {
    fn default() -> Self {
        Self {
            center: 1.5,
            neighbor: 0.125,
        }
    }
}

impl From<&EngineConfig> for SharpenKernel {
    fn from(config: &EngineConfig) -> Self {
        Self {
            center: config.sharpen_center,
            neighbor: config.sharpen_neighbor,
        }
    }
}

pub struct ImageFilters;

impl ImageFilters {
    /// Sharpen color channels with a cross-shaped kernel; alpha is kept as is.
    ///
    /// `out = clamp(c * center - (top + bottom + left + right) * neighbor)`.
    /// Border pixels reuse the nearest in-bounds neighbor.
    pub fn sharpen(raster: &Raster, kernel: SharpenKernel) -> Raster {
        let (width, height) = (raster.width(), raster.height());
        let src = raster.as_rgba();
        let mut sharpened = RgbaImage::new(width, height);

        for y in 0..height {
            let up = y.saturating_sub(1);
            let down = (y + 1).min(height - 1);
            for x in 0..width {
                let left = x.saturating_sub(1);
                let right = (x + 1).min(width - 1);

                let c = src.get_pixel(x, y);
                let t = src.get_pixel(x, up);
                let b = src.get_pixel(x, down);
                let l = src.get_pixel(left, y);
                let r = src.get_pixel(right, y);

                let mut out = [0u8; 4];
                for ch in 0..3 {
                    let sum = t[ch] as f32 + b[ch] as f32 + l[ch] as f32 + r[ch] as f32;
                    let value = c[ch] as f32 * kernel.center - sum * kernel.neighbor;
                    out[ch] = value.round().clamp(0.0, 255.0) as u8;
                }
                out[3] = c[3];

                sharpened.put_pixel(x, y, Rgba(out));
            }
        }

        Raster::from_rgba(sharpened)
    }
}
