use image::imageops::{self, FilterType};

use super::filters::{ImageFilters, SharpenKernel};
use crate::raster::Raster;

/// Enlargement factor at or above which output is sharpened
pub const SHARPEN_THRESHOLD: f32 = 2.0;

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Target size for a single dimension `d`: the longer side becomes `d`.
    ///
    /// Landscape or square sources get width `d`; portrait sources get height `d`.
    /// Neither side drops below 1.
    pub fn dimensions_for(width: u32, height: u32, d: u32) -> (u32, u32) {
        let (width, height, d) = (width.max(1), height.max(1), d.max(1));
        if width >= height {
            let h = (height as f64 * (d as f64 / width as f64)).round() as u32;
            (d, h.max(1))
        } else {
            let w = (width as f64 * (d as f64 / height as f64)).round() as u32;
            (w.max(1), d)
        }
    }

    /// Smallest aspect-preserving size that covers `target_width` x `target_height`
    pub fn cover_dimensions(
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    ) -> (u32, u32) {
        let (width, height) = (width.max(1) as f64, height.max(1) as f64);
        let scale = (target_width as f64 / width).max(target_height as f64 / height);
        (
            ((width * scale).round() as u32).max(target_width).max(1),
            ((height * scale).round() as u32).max(target_height).max(1),
        )
    }

    /// Largest per-axis enlargement from `from` to `to`
    pub fn enlargement_factor(from: (u32, u32), to: (u32, u32)) -> f32 {
        let fx = to.0 as f32 / from.0.max(1) as f32;
        let fy = to.1 as f32 / from.1.max(1) as f32;
        fx.max(fy)
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }

    /// Resize to exact dimensions
    pub fn resize_exact(raster: &Raster, width: u32, height: u32) -> Raster {
        let (width, height) = (width.max(1), height.max(1));
        if raster.width() == width && raster.height() == height {
            return raster.clone();
        }
        let filter = Self::select_filter(raster.width(), raster.height(), width, height);
        Raster::from_rgba(imageops::resize(raster.as_rgba(), width, height, filter))
    }

    /// Resize and sharpen when the enlargement reaches the threshold
    pub fn resize_sharpened(
        raster: &Raster,
        width: u32,
        height: u32,
        kernel: SharpenKernel,
    ) -> Raster {
        let resized = Self::resize_exact(raster, width, height);
        let factor = Self::enlargement_factor((raster.width(), raster.height()), (width, height));
        if factor >= SHARPEN_THRESHOLD {
            tracing::debug!(factor, "Sharpening enlarged raster");
            ImageFilters::sharpen(&resized, kernel)
        } else {
            resized
        }
    }

    /// Resize so the longer side equals `d`
    pub fn resize_to_dimension(raster: &Raster, d: u32, kernel: SharpenKernel) -> Raster {
        let (width, height) = Self::dimensions_for(raster.width(), raster.height(), d);
        tracing::debug!(
            from_width = raster.width(),
            from_height = raster.height(),
            width,
            height,
            "Resizing to dimension"
        );
        Self::resize_sharpened(raster, width, height, kernel)
    }
}
