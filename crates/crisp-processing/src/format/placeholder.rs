//! Synthesized stand-in rasters for undecodable inputs and failed crops.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use regex::Regex;

use crate::raster::Raster;

/// Size used when neither tags nor the filename give one
pub const DEFAULT_PLACEHOLDER_WIDTH: u32 = 800;
pub const DEFAULT_PLACEHOLDER_HEIGHT: u32 = 600;

/// Edge cap so a bogus filename cannot request a huge surface
const MAX_PLACEHOLDER_EDGE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// Source could not be decoded
    Undecodable,
    /// Processing failed after decode
    Error,
}

impl PlaceholderKind {
    fn palette(self) -> (Rgba<u8>, Rgba<u8>) {
        match self {
            PlaceholderKind::Undecodable => (Rgba([236, 236, 236, 255]), Rgba([150, 150, 150, 255])),
            PlaceholderKind::Error => (Rgba([250, 228, 228, 255]), Rgba([200, 60, 60, 255])),
        }
    }
}

/// Parse a `WxH` size out of a filename, e.g. `scan_1024x768.tif`
pub fn dimensions_from_filename(name: &str) -> Option<(u32, u32)> {
    let pattern = match Regex::new(r"(\d{1,5})\s*[xX×]\s*(\d{1,5})") {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "Failed to compile filename size pattern");
            return None;
        }
    };
    let caps = pattern.captures(name)?;
    let width = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let height = caps.get(2)?.as_str().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width.min(MAX_PLACEHOLDER_EDGE), height.min(MAX_PLACEHOLDER_EDGE)))
}

/// Placeholder size from parsed tags, else the filename, else the default
pub fn placeholder_dimensions(parsed: Option<(u32, u32)>, filename: &str) -> (u32, u32) {
    parsed
        .filter(|(w, h)| *w > 0 && *h > 0)
        .map(|(w, h)| (w.min(MAX_PLACEHOLDER_EDGE), h.min(MAX_PLACEHOLDER_EDGE)))
        .or_else(|| dimensions_from_filename(filename))
        .unwrap_or((DEFAULT_PLACEHOLDER_WIDTH, DEFAULT_PLACEHOLDER_HEIGHT))
}

/// Draw a framed, crossed-out placeholder of the given size
pub fn render(width: u32, height: u32, kind: PlaceholderKind) -> Raster {
    let width = width.max(1);
    let height = height.max(1);
    let (background, ink) = kind.palette();
    let mut canvas = RgbaImage::from_pixel(width, height, background);

    let inset = (width.min(height) / 20).max(1);
    if width > inset * 2 && height > inset * 2 {
        let frame = Rect::at(inset as i32, inset as i32)
            .of_size(width - inset * 2, height - inset * 2);
        draw_hollow_rect_mut(&mut canvas, frame, ink);

        let (x0, y0) = (inset as f32, inset as f32);
        let (x1, y1) = ((width - inset) as f32, (height - inset) as f32);
        draw_line_segment_mut(&mut canvas, (x0, y0), (x1, y1), ink);
        draw_line_segment_mut(&mut canvas, (x0, y1), (x1, y0), ink);

        // Badge in the middle so error placeholders stand out at thumbnail size
        let badge = (width.min(height) / 6).max(1);
        if kind == PlaceholderKind::Error && badge < width && badge < height {
            let rect = Rect::at(((width - badge) / 2) as i32, ((height - badge) / 2) as i32)
                .of_size(badge, badge);
            draw_filled_rect_mut(&mut canvas, rect, ink);
        }
    }

    Raster::from_rgba(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_from_filename() {
        assert_eq!(dimensions_from_filename("scan_1024x768.tif"), Some((1024, 768)));
        assert_eq!(dimensions_from_filename("poster 300 X 200.tiff"), Some((300, 200)));
        assert_eq!(dimensions_from_filename("photo.tif"), None);
        assert_eq!(dimensions_from_filename("0x0.tif"), None);
    }

    #[test]
    fn test_placeholder_dimension_priority() {
        assert_eq!(placeholder_dimensions(Some((10, 20)), "a_300x200.tif"), (10, 20));
        assert_eq!(placeholder_dimensions(None, "a_300x200.tif"), (300, 200));
        assert_eq!(
            placeholder_dimensions(None, "a.tif"),
            (DEFAULT_PLACEHOLDER_WIDTH, DEFAULT_PLACEHOLDER_HEIGHT)
        );
        assert_eq!(placeholder_dimensions(Some((0, 20)), "a.tif"), (800, 600));
    }

    #[test]
    fn test_render_sizes() {
        let raster = render(120, 80, PlaceholderKind::Undecodable);
        assert_eq!((raster.width(), raster.height()), (120, 80));
        let tiny = render(0, 0, PlaceholderKind::Error);
        assert_eq!((tiny.width(), tiny.height()), (1, 1));
    }
}
