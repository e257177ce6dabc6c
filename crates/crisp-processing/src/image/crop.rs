use crisp_core::models::{BoundingBox, CropPosition};
use crisp_core::EngineError;
use image::imageops;

use super::resize::ImageResize;
use crate::raster::Raster;

/// Rectangle inside a source raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Image crop operations
pub struct ImageCrop;

impl ImageCrop {
    /// Offset along one axis for an anchor of -1 (start), 0 (middle) or 1 (end)
    fn anchor_axis(source: u32, target: u32, anchor: i8) -> u32 {
        let slack = source.saturating_sub(target);
        match anchor {
            a if a < 0 => 0,
            0 => slack / 2,
            _ => slack,
        }
    }

    /// Offset of a `width` x `height` window anchored at `position`
    pub fn anchor_offset(
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
        position: CropPosition,
    ) -> (u32, u32) {
        (
            Self::anchor_axis(source_width, width, position.horizontal()),
            Self::anchor_axis(source_height, height, position.vertical()),
        )
    }

    /// Clamp a signed offset so a `target`-wide window stays inside `source`
    pub fn clamp_offset(offset: f32, source: u32, target: u32) -> u32 {
        let max = source.saturating_sub(target) as f32;
        offset.round().clamp(0.0, max) as u32
    }

    /// Window centered on the subject, nudged so the subject keeps a margin.
    ///
    /// `bbox` is in the coordinate space of the `source_width` x `source_height`
    /// raster. `margin` is a fraction of the window size.
    pub fn subject_offset(
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
        bbox: &BoundingBox,
        margin: f32,
    ) -> (u32, u32) {
        let (cx, cy) = bbox.center();
        let x = Self::subject_axis(cx, bbox.x, bbox.right(), width, margin);
        let y = Self::subject_axis(cy, bbox.y, bbox.bottom(), height, margin);
        (
            Self::clamp_offset(x, source_width, width),
            Self::clamp_offset(y, source_height, height),
        )
    }

    fn subject_axis(center: f32, start: f32, end: f32, window: u32, margin: f32) -> f32 {
        let window = window as f32;
        let pad = window * margin;
        let mut offset = center - window / 2.0;

        // Only correct when the subject fits inside the window with its margins
        if end - start + 2.0 * pad <= window {
            if start - offset < pad {
                offset = start - pad;
            }
            if offset + window - end < pad {
                offset = end + pad - window;
            }
        }
        offset
    }

    /// Cut `window` out of `raster`
    pub fn crop(raster: &Raster, window: CropWindow) -> Result<Raster, EngineError> {
        let fits_x = window.x as u64 + window.width as u64 <= raster.width() as u64;
        let fits_y = window.y as u64 + window.height as u64 <= raster.height() as u64;
        if window.width == 0 || window.height == 0 || !fits_x || !fits_y {
            return Err(EngineError::InvalidInput(format!(
                "crop window {}x{}+{}+{} outside {}x{} raster",
                window.width,
                window.height,
                window.x,
                window.y,
                raster.width(),
                raster.height()
            )));
        }
        if window.x == 0
            && window.y == 0
            && window.width == raster.width()
            && window.height == raster.height()
        {
            return Ok(raster.clone());
        }
        let view = imageops::crop_imm(
            raster.as_rgba(),
            window.x,
            window.y,
            window.width,
            window.height,
        );
        Ok(Raster::from_rgba(view.to_image()))
    }

    /// Crop an anchored `width` x `height` window; the raster must already cover it
    pub fn crop_anchored(
        raster: &Raster,
        width: u32,
        height: u32,
        position: CropPosition,
    ) -> Result<Raster, EngineError> {
        let (x, y) = Self::anchor_offset(raster.width(), raster.height(), width, height, position);
        Self::crop(
            raster,
            CropWindow {
                x,
                y,
                width,
                height,
            },
        )
    }

    /// Resize to cover the target, then crop at `position`
    pub fn cover_and_crop(
        raster: &Raster,
        width: u32,
        height: u32,
        position: CropPosition,
    ) -> Result<Raster, EngineError> {
        let (cw, ch) = ImageResize::cover_dimensions(raster.width(), raster.height(), width, height);
        let covered = ImageResize::resize_exact(raster, cw, ch);
        Self::crop_anchored(&covered, width, height, position)
    }

    /// Largest window with the target aspect ratio that fits the source, anchored at `position`
    pub fn source_region(
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
        position: CropPosition,
    ) -> CropWindow {
        let (sw, sh) = (source_width.max(1) as f64, source_height.max(1) as f64);
        let aspect = width.max(1) as f64 / height.max(1) as f64;
        let (rw, rh) = if sw / sh > aspect {
            ((sh * aspect).round().max(1.0), sh)
        } else {
            (sw, (sw / aspect).round().max(1.0))
        };
        let (rw, rh) = ((rw as u32).min(source_width), (rh as u32).min(source_height));
        let (x, y) = Self::anchor_offset(source_width, source_height, rw, rh, position);
        CropWindow {
            x,
            y,
            width: rw,
            height: rh,
        }
    }

    /// Crop the aspect-matched region in source space, then resize it to the target.
    ///
    /// Avoids allocating a cover surface larger than the target.
    pub fn region_crop(
        raster: &Raster,
        width: u32,
        height: u32,
        position: CropPosition,
    ) -> Result<Raster, EngineError> {
        let window =
            Self::source_region(raster.width(), raster.height(), width, height, position);
        let region = Self::crop(raster, window)?;
        Ok(ImageResize::resize_exact(&region, width, height))
    }
}
