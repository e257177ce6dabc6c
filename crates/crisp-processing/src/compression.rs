use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use crisp_core::models::{CompressionOptions, OutputFormat, TemplateCategory};
use crisp_core::EngineError;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::raster::Raster;

/// Quality search steps when a size target is set
const TARGET_SEARCH_STEPS: usize = 6;

/// Lowest quality the size search will try
const MIN_SEARCH_QUALITY: f32 = 0.05;

/// Encoded output of one raster in one format
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Quality in `[0, 1]` the bytes were produced with; 1.0 for lossless output
    pub quality_used: f32,
    pub optimized: bool,
}

/// Output format choices that depend on image properties
pub struct FormatSelector;

impl FormatSelector {
    /// Format of the second artifact emitted per template
    pub fn template_secondary(category: TemplateCategory, has_transparency: bool) -> OutputFormat {
        if category.preserves_transparency() && has_transparency {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }
}

/// Main compression service
pub struct ImageCompressor;

impl ImageCompressor {
    /// Encode `raster` into `format`.
    ///
    /// PNG ignores quality. Lossy formats honour `targetSizeKB` by searching
    /// for the largest quality whose output fits.
    pub fn encode(
        raster: &Raster,
        format: OutputFormat,
        options: &CompressionOptions,
        has_transparency: bool,
    ) -> Result<EncodedImage, EngineError> {
        let base_quality = options.quality.clamp(0.0, 1.0);
        let finish = |bytes: Bytes, quality_used: f32, optimized: bool| EncodedImage {
            bytes,
            format,
            width: raster.width(),
            height: raster.height(),
            quality_used,
            optimized,
        };

        if format.is_lossless() {
            let bytes = Self::compress_png(raster, has_transparency)?;
            return Ok(finish(bytes, 1.0, false));
        }

        let first = Self::encode_at(raster, format, base_quality, has_transparency)?;
        let Some(target_kb) = options.target_size_kb.filter(|kb| *kb > 0) else {
            return Ok(finish(first, base_quality, base_quality < 1.0));
        };

        let target_bytes = target_kb as usize * 1024;
        if first.len() <= target_bytes {
            return Ok(finish(first, base_quality, true));
        }

        let (mut lo, mut hi) = (MIN_SEARCH_QUALITY, base_quality);
        let mut best: Option<(Bytes, f32)> = None;
        let mut smallest = (first, base_quality);

        for _ in 0..TARGET_SEARCH_STEPS {
            let quality = (lo + hi) / 2.0;
            let bytes = Self::encode_at(raster, format, quality, has_transparency)?;
            tracing::debug!(
                format = format.extension(),
                quality,
                size = bytes.len(),
                target = target_bytes,
                "Quality search step"
            );
            if bytes.len() <= target_bytes {
                lo = quality;
                best = Some((bytes, quality));
            } else {
                hi = quality;
                if bytes.len() < smallest.0.len() {
                    smallest = (bytes, quality);
                }
            }
        }

        match best {
            Some((bytes, quality)) => Ok(finish(bytes, quality, true)),
            None => {
                tracing::warn!(
                    format = format.extension(),
                    target_kb,
                    size = smallest.0.len(),
                    "Size target not reached"
                );
                Ok(finish(smallest.0, smallest.1, false))
            }
        }
    }

    /// Encode a 1x1 raster in every format so a missing encoder fails up front
    pub fn probe(formats: &[OutputFormat]) -> Result<(), EngineError> {
        let pixel = Raster::filled(1, 1, [255, 255, 255, 255]);
        for &format in formats {
            Self::encode_at(&pixel, format, 0.8, false).map_err(|e| {
                EngineError::EncoderUnavailable(format!(
                    "{} encoder unusable: {}",
                    format.extension(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn encode_at(
        raster: &Raster,
        format: OutputFormat,
        quality: f32,
        has_transparency: bool,
    ) -> Result<Bytes, EngineError> {
        match format {
            OutputFormat::Jpeg => Self::compress_jpeg(raster, quality, has_transparency),
            OutputFormat::Png => Self::compress_png(raster, has_transparency),
            OutputFormat::WebP => Self::compress_webp(raster, quality),
            OutputFormat::Avif => Self::compress_avif(raster, quality),
        }
    }

    /// Drop alpha, compositing over white where pixels are not opaque
    pub fn flatten_onto_white(raster: &Raster) -> RgbImage {
        let mut rgb = Vec::with_capacity(raster.pixel_count() as usize * 3);
        for px in raster.as_bytes().chunks_exact(4) {
            let alpha = px[3] as u32;
            for &channel in &px[..3] {
                let blended = (channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
                rgb.push(blended as u8);
            }
        }
        // Length is always width * height * 3
        RgbImage::from_raw(raster.width(), raster.height(), rgb)
            .unwrap_or_else(|| RgbImage::new(raster.width(), raster.height()))
    }

    /// Compress to JPEG using mozjpeg
    fn compress_jpeg(
        raster: &Raster,
        quality: f32,
        has_transparency: bool,
    ) -> Result<Bytes, EngineError> {
        let rgb_img = if has_transparency {
            Self::flatten_onto_white(raster)
        } else {
            raster.to_dynamic().to_rgb8()
        };
        let (width, height) = rgb_img.dimensions();
        let jpeg_quality = (quality * 100.0).clamp(1.0, 100.0);

        // mozjpeg reports codec errors by unwinding
        let result = panic::catch_unwind(AssertUnwindSafe(|| -> std::io::Result<Vec<u8>> {
            let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
            comp.set_size(width as usize, height as usize);
            comp.set_quality(jpeg_quality);
            comp.set_progressive_mode();
            comp.set_optimize_coding(true);

            let mut comp = comp.start_compress(Vec::new())?;
            comp.write_scanlines(&rgb_img)?;
            comp.finish()
        }));

        match result {
            Ok(Ok(jpeg_data)) => Ok(Bytes::from(jpeg_data)),
            Ok(Err(e)) => Err(EngineError::EncodeFailure(format!("JPEG encode: {}", e))),
            Err(_) => Err(EngineError::EncodeFailure(
                "JPEG encoder aborted".to_string(),
            )),
        }
    }

    /// Compress to PNG; opaque rasters are written without an alpha channel
    fn compress_png(raster: &Raster, has_transparency: bool) -> Result<Bytes, EngineError> {
        let img = if has_transparency {
            raster.to_dynamic()
        } else {
            DynamicImage::ImageRgb8(raster.to_dynamic().to_rgb8())
        };

        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        img.write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| EngineError::EncodeFailure(format!("PNG encode: {}", e)))?;

        Ok(Bytes::from(buffer))
    }

    /// Compress to WebP
    fn compress_webp(raster: &Raster, quality: f32) -> Result<Bytes, EngineError> {
        let encoder = webp::Encoder::from_rgba(raster.as_bytes(), raster.width(), raster.height());
        let webp_data = encoder.encode((quality * 100.0).clamp(0.0, 100.0));
        if webp_data.is_empty() {
            return Err(EngineError::EncodeFailure(
                "WebP encoder produced no data".to_string(),
            ));
        }

        Ok(Bytes::copy_from_slice(&webp_data))
    }

    /// Compress to AVIF
    fn compress_avif(raster: &Raster, quality: f32) -> Result<Bytes, EngineError> {
        let rgba_data: Vec<rgb::RGBA8> = raster
            .as_bytes()
            .chunks_exact(4)
            .map(|c| rgb::RGBA8::new(c[0], c[1], c[2], c[3]))
            .collect();

        let img_buf = ravif::Img::new(
            rgba_data.as_slice(),
            raster.width() as usize,
            raster.height() as usize,
        );

        let encoder = ravif::Encoder::new()
            .with_quality((quality * 100.0).clamp(1.0, 100.0))
            .with_speed(6);

        let avif_data = encoder
            .encode_rgba(img_buf)
            .map_err(|e| EngineError::EncodeFailure(format!("AVIF encode: {}", e)))?;

        Ok(Bytes::copy_from_slice(&avif_data.avif_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn options(quality: f32, target_size_kb: Option<u32>) -> CompressionOptions {
        CompressionOptions {
            quality,
            target_size_kb,
        }
    }

    fn noisy(width: u32, height: u32) -> Raster {
        let mut img = RgbaImage::new(width, height);
        let mut seed: u32 = 0x9E37_79B9;
        for px in img.pixels_mut() {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let b = seed.to_le_bytes();
            *px = Rgba([b[0], b[1], b[2], 255]);
        }
        Raster::from_rgba(img)
    }

    #[test]
    fn test_template_secondary_format() {
        assert_eq!(
            FormatSelector::template_secondary(TemplateCategory::Logo, true),
            OutputFormat::Png
        );
        assert_eq!(
            FormatSelector::template_secondary(TemplateCategory::Web, false),
            OutputFormat::Jpeg
        );
        assert_eq!(
            FormatSelector::template_secondary(TemplateCategory::Social, true),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn test_flatten_onto_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = ImageCompressor::flatten_onto_white(&Raster::from_rgba(img));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_jpeg_of_transparent_source_is_white() {
        let raster = Raster::filled(16, 16, [10, 200, 10, 0]);
        let encoded =
            ImageCompressor::encode(&raster, OutputFormat::Jpeg, &options(0.9, None), true)
                .unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgb8();
        let px = decoded.get_pixel(8, 8).0;
        assert!(px.iter().all(|c| *c > 245), "pixel {:?}", px);
        assert!(encoded.optimized);
    }

    #[test]
    fn test_png_ignores_quality() {
        let raster = Raster::filled(8, 8, [1, 2, 3, 128]);
        let encoded =
            ImageCompressor::encode(&raster, OutputFormat::Png, &options(0.1, Some(1)), true)
                .unwrap();
        assert_eq!(encoded.quality_used, 1.0);
        assert!(!encoded.optimized);
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0, [1, 2, 3, 128]);
    }

    #[test]
    fn test_webp_encodes() {
        let raster = Raster::filled(32, 16, [200, 100, 50, 255]);
        let encoded =
            ImageCompressor::encode(&raster, OutputFormat::WebP, &options(0.85, None), false)
                .unwrap();
        assert_eq!(&encoded.bytes[0..4], b"RIFF");
        assert_eq!(&encoded.bytes[8..12], b"WEBP");
        assert_eq!((encoded.width, encoded.height), (32, 16));
    }

    #[test]
    fn test_target_size_search_lowers_quality() {
        let raster = noisy(128, 128);
        let unbounded =
            ImageCompressor::encode(&raster, OutputFormat::Jpeg, &options(0.95, None), false)
                .unwrap();
        let target_kb = (unbounded.bytes.len() / 1024 / 2).max(1) as u32;
        let bounded = ImageCompressor::encode(
            &raster,
            OutputFormat::Jpeg,
            &options(0.95, Some(target_kb)),
            false,
        )
        .unwrap();
        assert!(bounded.quality_used < 0.95);
        assert!(bounded.bytes.len() < unbounded.bytes.len());
        if bounded.optimized {
            assert!(bounded.bytes.len() <= target_kb as usize * 1024);
        }
    }

    #[test]
    fn test_probe_accepts_compiled_encoders() {
        assert!(ImageCompressor::probe(&[OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP]).is_ok());
    }
}
