use crisp_core::models::SourceFormat;

use crate::raster::Raster;

/// Pixel count up to which every alpha value is inspected
pub const FULL_SCAN_LIMIT: u64 = 1_000_000;

/// Samples per axis of the stratified grid used above the full-scan limit
const GRID_STEPS: u32 = 256;

const SVG_TRANSPARENCY_MARKERS: &[&str] = &[
    "transparent",
    "opacity",
    "rgba(",
    "hsla(",
    "fill=\"none\"",
    "fill='none'",
    "fill:none",
];

/// Format-aware transparency detection
pub struct TransparencyProbe;

impl TransparencyProbe {
    /// Whether the image carries visible transparency.
    ///
    /// `source` holds the original encoded bytes; `raster` the decoded pixels.
    pub fn has_transparency(format: SourceFormat, source: &[u8], raster: &Raster) -> bool {
        match format {
            f if f.is_always_opaque() => false,
            SourceFormat::Svg => Self::svg_markup_transparent(source),
            SourceFormat::Gif => Self::gif_transparency_flag(source),
            _ => Self::sample_alpha(raster),
        }
    }

    /// Keyword scan of SVG markup
    pub fn svg_markup_transparent(markup: &[u8]) -> bool {
        let text = String::from_utf8_lossy(markup).to_ascii_lowercase();
        SVG_TRANSPARENCY_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
    }

    /// Transparency flag of any GIF89a graphic control extension
    pub fn gif_transparency_flag(bytes: &[u8]) -> bool {
        if !bytes.starts_with(b"GIF89a") {
            return false;
        }
        // Extension introducer, GCE label, block size 4, packed fields
        bytes
            .windows(4)
            .any(|w| w[0] == 0x21 && w[1] == 0xF9 && w[2] == 0x04 && w[3] & 0x01 == 0x01)
    }

    /// Look for any alpha below 255
    pub fn sample_alpha(raster: &Raster) -> bool {
        if raster.pixel_count() <= FULL_SCAN_LIMIT {
            return raster.as_bytes().chunks_exact(4).any(|px| px[3] < 255);
        }

        let (width, height) = (raster.width(), raster.height());
        let (max_x, max_y) = (width - 1, height - 1);
        let key_points = [
            (0, 0),
            (max_x, 0),
            (0, max_y),
            (max_x, max_y),
            (max_x / 2, 0),
            (max_x / 2, max_y),
            (0, max_y / 2),
            (max_x, max_y / 2),
            (max_x / 2, max_y / 2),
        ];
        if key_points.iter().any(|&(x, y)| raster.pixel(x, y)[3] < 255) {
            return true;
        }

        // One sample near the middle of each grid cell
        for gy in 0..GRID_STEPS {
            let y = ((gy as u64 * 2 + 1) * height as u64 / (GRID_STEPS as u64 * 2)) as u32;
            for gx in 0..GRID_STEPS {
                let x = ((gx as u64 * 2 + 1) * width as u64 / (GRID_STEPS as u64 * 2)) as u32;
                if raster.pixel(x.min(max_x), y.min(max_y))[3] < 255 {
                    return true;
                }
            }
        }
        false
    }
}
