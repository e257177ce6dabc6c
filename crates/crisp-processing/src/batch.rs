//! Batch processor: one config applied to a list of images, sequentially.

use std::time::Duration;

use bytes::Bytes;
use crisp_core::models::{
    CompressionOptions, CropMode, Dimensions, ImageAsset, OutputFormat, ProcessedResult,
    ProcessingConfig, ResultError, ResultFlags,
};
use crisp_core::{EngineConfig, EngineError, ErrorMetadata};

use crate::compression::ImageCompressor;
use crate::engine::ProcessingEngine;
use crate::format::placeholder::{self, PlaceholderKind};
use crate::format::{FormatNormalizer, RasterOrigin, RasterTarget};
use crate::image::{
    focal_crop, standard_crop, CropPath, ImageResize, SharpenKernel, SmartCropper,
    TransparencyProbe,
};
use crate::naming::batch_output_name;
use crate::raster::Raster;
use crate::runtime::bounded_blocking;

/// Decoded, transformed surface of one source image
pub(crate) struct Prepared {
    pub raster: Raster,
    pub has_transparency: bool,
    pub ai_cropped: bool,
    /// Set when the source was replaced by a placeholder
    pub decode_error: Option<EngineError>,
}

/// Raster target for decoding, so vector sources rasterize at the size they are used at
fn raster_target(config: &ProcessingConfig) -> RasterTarget {
    if let Some(d) = config.resize_dimension() {
        RasterTarget::LongestSide(d)
    } else if let Some((w, h)) = config.crop.target() {
        RasterTarget::Cover(w, h)
    } else {
        RasterTarget::Natural
    }
}

/// Decode `image` and measure its transparency; never fails on bad bytes
pub(crate) async fn decode(
    engine: &ProcessingEngine,
    image: &ImageAsset,
    target: RasterTarget,
) -> Result<Prepared, EngineError> {
    let normalizer = FormatNormalizer::new(engine.config().max_total_pixels);
    let owned = image.clone();

    bounded_blocking("normalize", engine.config().decode_timeout, move || {
        let normalized = normalizer.normalize(&owned, target);
        let decode_error = match normalized.origin {
            RasterOrigin::Decoded => None,
            RasterOrigin::Placeholder => Some(EngineError::DecodeFailure(format!(
                "{} is not a decodable {:?} image",
                owned.name, normalized.format.format
            ))),
        };
        let has_transparency = decode_error.is_none()
            && TransparencyProbe::has_transparency(
                normalized.format.format,
                &owned.bytes,
                &normalized.raster,
            );
        tracing::debug!(
            name = %owned.name,
            rung = normalized.rung,
            width = normalized.raster.width(),
            height = normalized.raster.height(),
            has_transparency,
            "Source normalized"
        );
        Ok(Prepared {
            raster: normalized.raster,
            has_transparency,
            ai_cropped: false,
            decode_error,
        })
    })
    .await
}

async fn prepare(
    engine: &ProcessingEngine,
    image: &ImageAsset,
    config: &ProcessingConfig,
    ai_available: bool,
) -> Result<Prepared, EngineError> {
    if let Some((width, height)) = config.crop.target() {
        engine.config().check_output_surface(width, height)?;
    }

    let mut prepared = decode(engine, image, raster_target(config)).await?;
    let limit = engine.config().timeout_for(image.size);
    let kernel = SharpenKernel::from(engine.config());

    if let Some(requested) = config.resize_dimension() {
        let d = requested.min(engine.config().max_resize_dimension);
        if d < requested {
            tracing::warn!(requested, clamped = d, "Resize dimension clamped");
        }
        let (width, height) =
            ImageResize::dimensions_for(prepared.raster.width(), prepared.raster.height(), d);
        engine.config().check_output_surface(width, height)?;
        let source = prepared.raster.clone();
        prepared.raster = bounded_blocking("resize", limit, move || {
            Ok(ImageResize::resize_to_dimension(&source, d, kernel))
        })
        .await?;
        engine.record_transform();
    }

    if let Some((width, height)) = config.crop.target() {
        let smart = config.crop.mode == CropMode::Smart;
        if smart && ai_available && prepared.decode_error.is_none() {
            let detector = engine.detector().await;
            let cropper = SmartCropper::new(engine.config(), engine.pool(), detector);
            let outcome = cropper.crop_raster(&prepared.raster, width, height).await;
            if outcome.path == CropPath::Placeholder {
                return Err(outcome
                    .failure
                    .unwrap_or_else(|| EngineError::Internal("smart crop failed".to_string())));
            }
            prepared.raster = outcome.raster;
            prepared.ai_cropped = outcome.ai_cropped;
        } else {
            let source = prepared.raster.clone();
            let engine_config = engine.config().clone();
            let position = config.crop.position;
            prepared.raster = bounded_blocking("crop", limit, move || {
                if smart {
                    focal_crop(&source, width, height, &engine_config)
                } else {
                    standard_crop(&source, width, height, position, &engine_config)
                }
            })
            .await?;
        }
        engine.record_transform();
    }

    Ok(prepared)
}

/// Encode `raster` into one result; encode failures land on the result
pub(crate) async fn encode_result(
    image: &ImageAsset,
    raster: &Raster,
    format: OutputFormat,
    compression: &CompressionOptions,
    has_transparency: bool,
    limit: Duration,
    name: String,
) -> ProcessedResult {
    let surface = raster.clone();
    let options = compression.clone();
    let encoded = bounded_blocking("encode", limit, move || {
        ImageCompressor::encode(&surface, format, &options, has_transparency)
    })
    .await;

    match encoded {
        Ok(encoded) => ProcessedResult {
            source_image_id: image.id,
            bytes: encoded.bytes,
            name,
            format,
            dimensions: Dimensions::new(encoded.width, encoded.height),
            flags: ResultFlags {
                optimized: encoded.optimized,
                ai_cropped: false,
            },
            error: None,
            template_id: None,
        },
        Err(e) => {
            tracing::warn!(name = %name, format = ?format, error = %e, "Encode failed");
            ProcessedResult {
                source_image_id: image.id,
                bytes: Bytes::new(),
                name,
                format,
                dimensions: raster.dimensions(),
                flags: ResultFlags::default(),
                error: Some(ResultError::from(&e)),
                template_id: None,
            }
        }
    }
}

/// One error-flagged result per format, carrying an encoded error placeholder
pub(crate) async fn failure_results<F>(
    image: &ImageAsset,
    formats: &[OutputFormat],
    size: (u32, u32),
    error: &EngineError,
    limit: Duration,
    mut name_for: F,
) -> Vec<ProcessedResult>
where
    F: FnMut(OutputFormat) -> String,
{
    let surface = placeholder::render(size.0, size.1, PlaceholderKind::Error);
    let mut results = Vec::with_capacity(formats.len());
    for &format in formats {
        let mut result = encode_result(
            image,
            &surface,
            format,
            &CompressionOptions::default(),
            false,
            limit,
            name_for(format),
        )
        .await;
        result.flags = ResultFlags::default();
        result.error = Some(ResultError::from(error));
        results.push(result);
    }
    results
}

/// Size of the surface a failed image would have produced, kept within the output budget
fn failure_size(config: &ProcessingConfig, limits: &EngineConfig) -> (u32, u32) {
    let (width, height) = if let Some(target) = config.crop.target() {
        target
    } else if let Some(d) = config.resize_dimension() {
        ImageResize::dimensions_for(
            placeholder::DEFAULT_PLACEHOLDER_WIDTH,
            placeholder::DEFAULT_PLACEHOLDER_HEIGHT,
            d,
        )
    } else {
        (
            placeholder::DEFAULT_PLACEHOLDER_WIDTH,
            placeholder::DEFAULT_PLACEHOLDER_HEIGHT,
        )
    };
    limits.fit_output_surface(width, height)
}

async fn process_image(
    engine: &ProcessingEngine,
    image: &ImageAsset,
    index: usize,
    config: &ProcessingConfig,
    ai_available: bool,
) -> Vec<ProcessedResult> {
    let limit = engine.config().timeout_for(image.size);
    let formats = &config.output.formats;
    let name_for = |format| batch_output_name(&image.name, index, format, &config.output);

    let prepared = match prepare(engine, image, config, ai_available).await {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!(
                name = %image.name,
                error = %e,
                error_code = e.error_code(),
                "Image failed, emitting error results"
            );
            let size = failure_size(config, engine.config());
            return failure_results(image, formats, size, &e, limit, name_for).await;
        }
    };

    let mut results = Vec::with_capacity(formats.len());
    for &format in formats {
        let mut result = encode_result(
            image,
            &prepared.raster,
            format,
            &config.compression,
            prepared.has_transparency,
            limit,
            name_for(format),
        )
        .await;
        if result.is_success() {
            result.flags.ai_cropped = prepared.ai_cropped;
            result.error = prepared.decode_error.as_ref().map(ResultError::from);
        }
        results.push(result);
    }
    results
}

/// Apply `config` to every image in order.
///
/// Per-image failures become error-flagged results. Only a missing encoder
/// fails the whole batch.
pub(crate) async fn process_batch(
    engine: &ProcessingEngine,
    images: &[ImageAsset],
    config: &ProcessingConfig,
    ai_available: bool,
) -> Result<Vec<ProcessedResult>, EngineError> {
    config.validate()?;
    let config = config.with_safe_defaults();
    ImageCompressor::probe(&config.output.formats)?;

    tracing::info!(
        images = images.len(),
        formats = ?config.output.formats,
        ai_available,
        "Starting batch"
    );

    let total = images.len().max(1);
    let mut results = Vec::with_capacity(images.len() * config.output.formats.len());
    for (index, image) in images.iter().enumerate() {
        engine.report("processing", (index * 100 / total) as u8);

        let produced = process_image(engine, image, index, &config, ai_available).await;
        engine.record_image();
        engine.record_results(&produced);
        results.extend(produced);

        if index + 1 < images.len() {
            tokio::time::sleep(engine.config().inter_image_pause).await;
            let released = engine.pool().soft_cleanup();
            if released > 0 {
                tracing::debug!(released, "Released idle upscalers between images");
            }
        }
    }

    engine.report("done", 100);
    tracing::info!(
        results = results.len(),
        failed = results.iter().filter(|r| !r.is_success()).count(),
        "Batch complete"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisp_core::models::{CropOptions, CropPosition, OutputOptions, ResizeOptions};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    fn png_asset(name: &str, width: u32, height: u32) -> ImageAsset {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([90, 120, 30, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        ImageAsset::new(name, "image/png", Bytes::from(buf))
    }

    fn config(formats: Vec<OutputFormat>) -> ProcessingConfig {
        ProcessingConfig {
            output: OutputOptions {
                formats,
                rename: false,
                pattern: None,
            },
            ..ProcessingConfig::default()
        }
    }

    #[test]
    fn test_raster_target_prefers_resize() {
        let mut cfg = config(vec![OutputFormat::Png]);
        assert_eq!(raster_target(&cfg), RasterTarget::Natural);
        cfg.crop = CropOptions {
            enabled: true,
            width: Some(100),
            height: Some(50),
            ..CropOptions::default()
        };
        assert_eq!(raster_target(&cfg), RasterTarget::Cover(100, 50));
        cfg.resize = ResizeOptions {
            enabled: true,
            dimension: Some(640),
        };
        assert_eq!(raster_target(&cfg), RasterTarget::LongestSide(640));
    }

    #[test]
    fn test_failure_size() {
        let limits = EngineConfig::default();
        let mut cfg = config(vec![OutputFormat::Png]);
        assert_eq!(failure_size(&cfg, &limits), (800, 600));
        cfg.resize = ResizeOptions {
            enabled: true,
            dimension: Some(400),
        };
        assert_eq!(failure_size(&cfg, &limits), (400, 300));
        cfg.crop = CropOptions {
            enabled: true,
            width: Some(60_000),
            height: Some(60_000),
            ..CropOptions::default()
        };
        let (w, h) = failure_size(&cfg, &limits);
        assert!(w as u64 * h as u64 <= limits.max_total_pixels);
    }

    #[tokio::test]
    async fn test_formats_in_requested_order() {
        let engine = ProcessingEngine::default();
        let images = vec![png_asset("a.png", 64, 48)];
        let results = engine
            .process_batch(&images, &config(vec![OutputFormat::Png, OutputFormat::Jpeg]), false)
            .await
            .unwrap();
        let formats: Vec<_> = results.iter().map(|r| r.format).collect();
        assert_eq!(formats, vec![OutputFormat::Png, OutputFormat::Jpeg]);
        assert_eq!(results[0].name, "a.png");
        assert_eq!(results[1].name, "a.jpg");
        assert!(results.iter().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn test_empty_formats_default_to_jpeg() {
        let engine = ProcessingEngine::default();
        let images = vec![png_asset("b.png", 20, 20)];
        let results = engine
            .process_batch(&images, &config(Vec::new()), false)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].format, OutputFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_undecodable_image_yields_flagged_results() {
        let engine = ProcessingEngine::default();
        let images = vec![
            ImageAsset::new("broken.png", "image/png", Bytes::from_static(b"not an image")),
            png_asset("ok.png", 30, 30),
        ];
        let results = engine
            .process_batch(&images, &config(vec![OutputFormat::Png]), false)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let broken = &results[0];
        assert!(!broken.is_success());
        assert_eq!(broken.error.as_ref().unwrap().code, "DECODE_FAILURE");
        assert!(!broken.bytes.is_empty());
        assert_eq!(broken.dimensions, Dimensions::new(800, 600));
        assert!(results[1].is_success());
        assert_eq!(engine.stats().failed_results, 1);
    }

    #[tokio::test]
    async fn test_standard_crop_position() {
        let engine = ProcessingEngine::default();
        let mut cfg = config(vec![OutputFormat::Png]);
        cfg.crop = CropOptions {
            enabled: true,
            width: Some(40),
            height: Some(40),
            mode: CropMode::Standard,
            position: CropPosition::TopLeft,
        };
        let results = engine
            .process_batch(&[png_asset("c.png", 120, 60)], &cfg, false)
            .await
            .unwrap();
        assert_eq!(results[0].dimensions, Dimensions::new(40, 40));
        assert!(!results[0].flags.ai_cropped);
    }

    fn limited_engine() -> ProcessingEngine {
        ProcessingEngine::builder()
            .config(EngineConfig {
                max_surface_edge: 100,
                max_total_pixels: 10_000,
                ..EngineConfig::default()
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_crop_over_pixel_budget_becomes_error_result() {
        let engine = limited_engine();
        let mut cfg = config(vec![OutputFormat::Png]);
        cfg.crop = CropOptions {
            enabled: true,
            width: Some(400),
            height: Some(400),
            mode: CropMode::Standard,
            position: CropPosition::Center,
        };
        let results = engine
            .process_batch(&[png_asset("big.png", 80, 80)], &cfg, false)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let error = results[0].error.as_ref().unwrap();
        assert_eq!(error.code, "RESOURCE_LIMIT_EXCEEDED");
        let dims = results[0].dimensions;
        assert!(dims.width as u64 * dims.height as u64 <= 10_000);
    }

    #[tokio::test]
    async fn test_resize_over_pixel_budget_becomes_error_result() {
        let engine = limited_engine();
        let mut cfg = config(vec![OutputFormat::Png]);
        cfg.resize = ResizeOptions {
            enabled: true,
            dimension: Some(400),
        };
        let results = engine
            .process_batch(&[png_asset("wide.png", 80, 80)], &cfg, false)
            .await
            .unwrap();
        assert_eq!(
            results[0].error.as_ref().unwrap().code,
            "RESOURCE_LIMIT_EXCEEDED"
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let engine = ProcessingEngine::default();
        let mut cfg = config(vec![OutputFormat::Png]);
        cfg.compression.quality = 2.0;
        let err = engine
            .process_batch(&[png_asset("d.png", 4, 4)], &cfg, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
