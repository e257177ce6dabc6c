//! Immutable raster value passed between pixel operations.

use std::sync::Arc;

use crisp_core::models::Dimensions;
use crisp_core::EngineError;
use image::{DynamicImage, RgbaImage};

/// Bytes per RGBA pixel
pub const CHANNELS: usize = 4;

/// RGBA8 pixel buffer with fixed dimensions.
///
/// Cloning is cheap; the pixel data is shared. Operations never mutate a
/// raster in place, they return a new one.
#[derive(Clone)]
pub struct Raster {
    image: Arc<RgbaImage>,
}

impl Raster {
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_rgba(image.into_rgba8())
    }

    /// Build from raw RGBA bytes; `data` must be exactly `width * height * 4` long
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, EngineError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(EngineError::Internal(format!(
                "raster buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        RgbaImage::from_raw(width, height, data)
            .map(Self::from_rgba)
            .ok_or_else(|| EngineError::Internal("invalid raster buffer".to_string()))
    }

    /// Uniformly filled raster
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(
            width.max(1),
            height.max(1),
            image::Rgba(rgba),
        ))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// Row length in bytes
    pub fn stride(&self) -> usize {
        self.width() as usize * CHANNELS
    }

    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    /// RGBA value at (x, y); coordinates must be in bounds
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.image.as_ref().clone())
    }

    /// Take the buffer, copying only if it is shared
    pub fn into_rgba(self) -> RgbaImage {
        Arc::try_unwrap(self.image).unwrap_or_else(|shared| shared.as_ref().clone())
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl From<RgbaImage> for Raster {
    fn from(image: RgbaImage) -> Self {
        Self::from_rgba(image)
    }
}
