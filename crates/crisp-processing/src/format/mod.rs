//! Format normalization
//!
//! Turns any supported input (raster codecs, multi-directory TIFF, SVG) into
//! a `Raster`. Normalization never fails: when every decode strategy is
//! exhausted an informative placeholder raster is returned instead.

pub mod placeholder;
pub mod svg;
pub mod tiff;

use crisp_core::models::{FormatInfo, ImageAsset, SourceFormat};
use crisp_core::EngineError;
use image::ImageFormat;

use crate::fallback::Ladder;
use crate::raster::Raster;
use placeholder::PlaceholderKind;

/// Requested raster size for sources without a fixed pixel grid (SVG)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterTarget {
    #[default]
    Natural,
    Width(u32),
    Height(u32),
    LongestSide(u32),
    /// Smallest size covering the box while keeping the aspect ratio
    Cover(u32, u32),
}

impl RasterTarget {
    /// Resolve against an intrinsic size, keeping the aspect ratio
    pub fn resolve(self, width: f32, height: f32) -> (u32, u32) {
        let (w, h) = (width.max(1.0), height.max(1.0));
        let (out_w, out_h) = match self {
            RasterTarget::Natural => (w, h),
            RasterTarget::Width(tw) => (tw as f32, tw as f32 * h / w),
            RasterTarget::Height(th) => (th as f32 * w / h, th as f32),
            RasterTarget::LongestSide(d) if w >= h => (d as f32, d as f32 * h / w),
            RasterTarget::LongestSide(d) => (d as f32 * w / h, d as f32),
            RasterTarget::Cover(tw, th) => {
                let scale = (tw as f32 / w).max(th as f32 / h);
                (w * scale, h * scale)
            }
        };
        ((out_w.round() as u32).max(1), (out_h.round() as u32).max(1))
    }
}

/// How a normalized raster was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterOrigin {
    Decoded,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub raster: Raster,
    pub origin: RasterOrigin,
    pub format: FormatInfo,
    /// Name of the strategy that produced the raster
    pub rung: &'static str,
}

/// Format from magic bytes
pub fn sniff(bytes: &[u8]) -> SourceFormat {
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return SourceFormat::Tiff;
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && (&bytes[8..12] == b"avif" || &bytes[8..12] == b"avis") {
        return SourceFormat::Avif;
    }
    if bytes.starts_with(&[0, 0, 1, 0]) {
        return SourceFormat::Ico;
    }
    if let Ok(format) = image::guess_format(bytes) {
        return match format {
            ImageFormat::Jpeg => SourceFormat::Jpeg,
            ImageFormat::Png => SourceFormat::Png,
            ImageFormat::Gif => SourceFormat::Gif,
            ImageFormat::WebP => SourceFormat::WebP,
            ImageFormat::Bmp => SourceFormat::Bmp,
            ImageFormat::Ico => SourceFormat::Ico,
            ImageFormat::Tiff => SourceFormat::Tiff,
            ImageFormat::Avif => SourceFormat::Avif,
            _ => SourceFormat::Unknown,
        };
    }
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    if text.contains("<svg") {
        return SourceFormat::Svg;
    }
    SourceFormat::Unknown
}

/// Detect the format from declared type and filename suffix, using magic bytes to break ties
pub fn detect(asset: &ImageAsset) -> FormatInfo {
    let declared = SourceFormat::from_mime(&asset.declared_type);
    let suffix = asset
        .extension()
        .map(|ext| SourceFormat::from_extension(&ext))
        .unwrap_or(SourceFormat::Unknown);

    let format = match (declared, suffix) {
        (d, s) if d == s => d,
        (d, SourceFormat::Unknown) => d,
        (SourceFormat::Unknown, s) => s,
        (d, s) => {
            let sniffed = sniff(&asset.bytes);
            tracing::debug!(declared = ?d, suffix = ?s, sniffed = ?sniffed, name = %asset.name, "Declared type and suffix disagree");
            if sniffed == SourceFormat::Unknown {
                d
            } else {
                sniffed
            }
        }
    };

    let format = if format == SourceFormat::Unknown {
        sniff(&asset.bytes)
    } else {
        format
    };
    FormatInfo::of(format)
}

fn to_image_format(format: SourceFormat) -> Option<ImageFormat> {
    match format {
        SourceFormat::Jpeg => Some(ImageFormat::Jpeg),
        SourceFormat::Png => Some(ImageFormat::Png),
        SourceFormat::Gif => Some(ImageFormat::Gif),
        SourceFormat::WebP => Some(ImageFormat::WebP),
        SourceFormat::Bmp => Some(ImageFormat::Bmp),
        SourceFormat::Ico => Some(ImageFormat::Ico),
        SourceFormat::Tiff => Some(ImageFormat::Tiff),
        SourceFormat::Avif => Some(ImageFormat::Avif),
        SourceFormat::Svg | SourceFormat::Unknown => None,
    }
}

fn check_budget(width: u32, height: u32, max_pixels: u64) -> Result<(), EngineError> {
    if width as u64 * height as u64 > max_pixels {
        return Err(EngineError::ResourceLimitExceeded {
            width,
            height,
            limit: format!("pixel budget of {}", max_pixels),
        });
    }
    Ok(())
}

/// Header-only size probe through the codec
fn codec_dimensions(bytes: &[u8], format: Option<ImageFormat>) -> Option<(u32, u32)> {
    let cursor = std::io::Cursor::new(bytes);
    let reader = match format {
        Some(f) => image::ImageReader::with_format(cursor, f),
        None => image::ImageReader::new(cursor).with_guessed_format().ok()?,
    };
    reader.into_dimensions().ok()
}

/// Codec decode; multi-frame formats yield their first frame
fn codec_decode(bytes: &[u8], format: Option<ImageFormat>, max_pixels: u64) -> Result<Raster, EngineError> {
    if let Some(f) = format {
        if !f.reading_enabled() {
            return Err(EngineError::DecodeFailure(format!("{:?} decoding not available", f)));
        }
    }
    if let Some((w, h)) = codec_dimensions(bytes, format) {
        check_budget(w, h, max_pixels)?;
    }
    let decoded = match format {
        Some(f) => image::load_from_memory_with_format(bytes, f),
        None => image::load_from_memory(bytes),
    }
    .map_err(|e| EngineError::DecodeFailure(e.to_string()))?;
    Ok(Raster::from_dynamic(decoded))
}

/// Natural size without a full decode, where the format allows it
pub fn probe_dimensions(asset: &ImageAsset, format: FormatInfo) -> Option<(u32, u32)> {
    match format.format {
        SourceFormat::Svg => {
            let size = svg::intrinsic_size(&String::from_utf8_lossy(&asset.bytes));
            Some(RasterTarget::Natural.resolve(size.width, size.height))
        }
        SourceFormat::Tiff => codec_dimensions(&asset.bytes, Some(ImageFormat::Tiff))
            .or_else(|| tiff::probe_dimensions(&asset.bytes)),
        other => codec_dimensions(&asset.bytes, to_image_format(other)),
    }
}

/// Decodes assets into rasters
#[derive(Debug, Clone, Copy)]
pub struct FormatNormalizer {
    max_pixels: u64,
}

impl FormatNormalizer {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    /// Decode `asset`; never fails
    pub fn normalize(&self, asset: &ImageAsset, target: RasterTarget) -> Normalized {
        let format = asset.format.unwrap_or_else(|| detect(asset));
        let bytes = &asset.bytes[..];
        let max_pixels = self.max_pixels;

        let ladder = match format.format {
            SourceFormat::Svg => Ladder::new("svg").rung("vector", move || {
                let size = svg::intrinsic_size(&String::from_utf8_lossy(bytes));
                let (w, h) = target.resolve(size.width, size.height);
                check_budget(w, h, max_pixels)?;
                svg::rasterize(bytes, w, h)
            }),
            SourceFormat::Tiff => Ladder::new("tiff")
                .rung("native", move || codec_decode(bytes, Some(ImageFormat::Tiff), max_pixels))
                .rung("directory", move || tiff::decode(bytes, max_pixels).map_err(EngineError::from)),
            other => {
                let declared = to_image_format(other);
                Ladder::new("raster")
                    .rung("codec", move || codec_decode(bytes, declared, max_pixels))
                    .rung("sniffed", move || codec_decode(bytes, None, max_pixels))
            }
        };

        match ladder.climb() {
            Ok(outcome) => Normalized {
                raster: outcome.value,
                origin: RasterOrigin::Decoded,
                format,
                rung: outcome.rung,
            },
            Err(e) => {
                let parsed = match format.format {
                    SourceFormat::Tiff => tiff::probe_dimensions(bytes),
                    _ => probe_dimensions(asset, format),
                };
                let (w, h) = placeholder::placeholder_dimensions(parsed, &asset.name);
                let (w, h) = clamp_to_budget(w, h, max_pixels);
                tracing::warn!(
                    name = %asset.name,
                    format = ?format.format,
                    error = %e,
                    width = w,
                    height = h,
                    "Decode failed, substituting placeholder"
                );
                Normalized {
                    raster: placeholder::render(w, h, PlaceholderKind::Undecodable),
                    origin: RasterOrigin::Placeholder,
                    format,
                    rung: "placeholder",
                }
            }
        }
    }
}

/// Shrink (w, h) proportionally until it fits the pixel budget
fn clamp_to_budget(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let pixels = width as u64 * height as u64;
    if pixels <= max_pixels || pixels == 0 {
        return (width, height);
    }
    let scale = (max_pixels as f64 / pixels as f64).sqrt();
    (
        ((width as f64 * scale).floor() as u32).max(1),
        ((height as f64 * scale).floor() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        Bytes::from(buf)
    }

    #[test]
    fn test_resolve_targets() {
        assert_eq!(RasterTarget::Width(600).resolve(300.0, 200.0), (600, 400));
        assert_eq!(RasterTarget::LongestSide(100).resolve(50.0, 200.0), (25, 100));
        assert_eq!(RasterTarget::Cover(500, 500).resolve(2000.0, 100.0), (10000, 500));
        assert_eq!(RasterTarget::Natural.resolve(0.0, 0.0), (1, 1));
    }

    #[test]
    fn test_detect_prefers_magic_on_disagreement() {
        let asset = ImageAsset::new("photo.jpg", "image/gif", png_bytes(2, 2));
        assert_eq!(detect(&asset).format, SourceFormat::Png);

        let agreed = ImageAsset::new("scan.tif", "image/tiff", Bytes::from_static(b"junk"));
        assert_eq!(detect(&agreed).format, SourceFormat::Tiff);
        assert!(detect(&agreed).is_legacy_tiff);

        let unnamed = ImageAsset::new("upload", "", png_bytes(1, 1));
        assert_eq!(detect(&unnamed).format, SourceFormat::Png);
    }

    #[test]
    fn test_normalize_png() {
        let asset = ImageAsset::new("a.png", "image/png", png_bytes(7, 5));
        let normalized = FormatNormalizer::new(u64::MAX).normalize(&asset, RasterTarget::Natural);
        assert_eq!(normalized.origin, RasterOrigin::Decoded);
        assert_eq!(normalized.raster.dimensions().width, 7);
        assert_eq!(normalized.raster.dimensions().height, 5);
    }

    #[test]
    fn test_normalize_garbage_gives_placeholder() {
        let asset = ImageAsset::new("broken_320x240.png", "image/png", Bytes::from_static(b"\x89PNG garbage"));
        let normalized = FormatNormalizer::new(u64::MAX).normalize(&asset, RasterTarget::Natural);
        assert_eq!(normalized.origin, RasterOrigin::Placeholder);
        assert_eq!((normalized.raster.width(), normalized.raster.height()), (320, 240));
    }

    #[test]
    fn test_normalize_manual_tiff_rung() {
        let data = tiff::test_support::build_tiff(3, 2, 1, 32773, &[(-5i8) as u8, 200]);
        let asset = ImageAsset::new("gray.tif", "image/tiff", Bytes::from(data));
        let normalized = FormatNormalizer::new(u64::MAX).normalize(&asset, RasterTarget::Natural);
        assert_eq!(normalized.origin, RasterOrigin::Decoded);
        assert_eq!((normalized.raster.width(), normalized.raster.height()), (3, 2));
    }

    #[test]
    fn test_placeholder_respects_budget() {
        let asset = ImageAsset::new("huge_8000x8000.bmp", "image/bmp", Bytes::from_static(b"BM"));
        let normalized = FormatNormalizer::new(1_000_000).normalize(&asset, RasterTarget::Natural);
        assert_eq!(normalized.origin, RasterOrigin::Placeholder);
        assert!(normalized.raster.pixel_count() <= 1_000_000);
    }
}
