//! Template engine: one source rendered to many platform targets.

use std::time::Duration;

use crisp_core::models::{
    CompressionOptions, CropPosition, ImageAsset, OutputFormat, ProcessedResult, ResultError,
    TemplateHeight, TemplateSpec,
};
use crisp_core::{EngineError, ErrorMetadata};

use crate::batch::{decode, encode_result, failure_results};
use crate::compression::{FormatSelector, ImageCompressor};
use crate::engine::ProcessingEngine;
use crate::format::placeholder::{DEFAULT_PLACEHOLDER_HEIGHT, DEFAULT_PLACEHOLDER_WIDTH};
use crate::format::RasterTarget;
use crate::image::{standard_crop, CropPath, ImageResize, SharpenKernel, SmartCropper};
use crate::naming::template_output_name;
use crate::raster::Raster;
use crate::runtime::bounded_blocking;

/// Specs sharing one transform
struct TemplateGroup<'a> {
    key: String,
    specs: Vec<&'a TemplateSpec>,
}

/// Group `specs` by target key, preserving first appearance order
fn group_specs(specs: &[TemplateSpec]) -> Vec<TemplateGroup<'_>> {
    let mut groups: Vec<TemplateGroup<'_>> = Vec::new();
    for spec in specs {
        let key = spec.group_key();
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.specs.push(spec),
            None => groups.push(TemplateGroup {
                key,
                specs: vec![spec],
            }),
        }
    }
    groups
}

/// Formats emitted for `spec`: WebP plus a category-dependent secondary
fn formats_for(spec: &TemplateSpec, has_transparency: bool) -> [OutputFormat; 2] {
    [
        OutputFormat::WebP,
        FormatSelector::template_secondary(spec.category, has_transparency),
    ]
}

/// Size `spec` renders at for a source of `source` dimensions
fn target_size(spec: &TemplateSpec, source: (u32, u32)) -> (u32, u32) {
    match spec.height {
        TemplateHeight::Fixed(h) => (spec.width, h),
        TemplateHeight::Auto => {
            RasterTarget::Width(spec.width).resolve(source.0 as f32, source.1 as f32)
        }
    }
}

/// Compute the shared surface for one group; returns it with the AI flag
async fn render_group(
    engine: &ProcessingEngine,
    source: &Raster,
    spec: &TemplateSpec,
    ai_available: bool,
    limit: Duration,
) -> Result<(Raster, bool), EngineError> {
    spec.validate()?;
    let (width, height) = target_size(spec, (source.width(), source.height()));
    engine.config().check_output_surface(width, height)?;
    let kernel = SharpenKernel::from(engine.config());

    if spec.is_resize_only() {
        let owned = source.clone();
        let raster = bounded_blocking("resize", limit, move || {
            Ok(ImageResize::resize_sharpened(&owned, width, height, kernel))
        })
        .await?;
        return Ok((raster, false));
    }

    if ai_available {
        let detector = engine.detector().await;
        let outcome = SmartCropper::new(engine.config(), engine.pool(), detector)
            .crop_raster(source, width, height)
            .await;
        if outcome.path != CropPath::Placeholder {
            return Ok((outcome.raster, outcome.ai_cropped));
        }
        tracing::warn!(
            width,
            height,
            "Smart crop exhausted its fallbacks, using centered crop"
        );
    }

    let owned = source.clone();
    let config = engine.config().clone();
    let raster = bounded_blocking("crop", limit, move || {
        standard_crop(&owned, width, height, CropPosition::Center, &config)
    })
    .await?;
    Ok((raster, false))
}

/// Render every template in `specs` from `image`.
///
/// Specs with the same target size share one computed transform but get
/// their own output files.
pub(crate) async fn expand_templates(
    engine: &ProcessingEngine,
    image: &ImageAsset,
    specs: &[TemplateSpec],
    ai_available: bool,
) -> Result<Vec<ProcessedResult>, EngineError> {
    ImageCompressor::probe(&[OutputFormat::WebP, OutputFormat::Jpeg, OutputFormat::Png])?;

    let limit = engine.config().timeout_for(image.size);
    let groups = group_specs(specs);
    tracing::info!(
        name = %image.name,
        templates = specs.len(),
        groups = groups.len(),
        ai_available,
        "Expanding templates"
    );

    let widest = specs.iter().map(|s| s.width).max().unwrap_or(1);
    let decoded = decode(engine, image, RasterTarget::Width(widest)).await;

    let mut results = Vec::with_capacity(specs.len() * 2);
    let total = groups.len().max(1);
    for (done, group) in groups.iter().enumerate() {
        engine.report("templates", (done * 100 / total) as u8);

        let source = match &decoded {
            Ok(prepared) => prepared,
            Err(e) => {
                for spec in &group.specs {
                    let size = target_size(
                        spec,
                        (DEFAULT_PLACEHOLDER_WIDTH, DEFAULT_PLACEHOLDER_HEIGHT),
                    );
                    results.extend(spec_failure(engine, image, spec, size, e, limit).await);
                }
                continue;
            }
        };

        let lead = group.specs[0];
        let rendered = render_group(engine, &source.raster, lead, ai_available, limit).await;
        engine.record_transform();
        tracing::debug!(key = %group.key, specs = group.specs.len(), "Template group rendered");

        let (raster, ai_cropped) = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!(
                    key = %group.key,
                    error = %e,
                    error_code = e.error_code(),
                    "Template group failed"
                );
                let size = target_size(lead, (source.raster.width(), source.raster.height()));
                for spec in &group.specs {
                    results.extend(spec_failure(engine, image, spec, size, &e, limit).await);
                }
                continue;
            }
        };

        for spec in &group.specs {
            if let Err(e) = spec.validate() {
                let size = (raster.width(), raster.height());
                results.extend(spec_failure(engine, image, spec, size, &e, limit).await);
                continue;
            }
            for format in formats_for(spec, source.has_transparency) {
                let mut result = encode_result(
                    image,
                    &raster,
                    format,
                    &CompressionOptions::default(),
                    source.has_transparency,
                    limit,
                    template_output_name(spec, &image.name, format),
                )
                .await;
                result.template_id = Some(spec.id.clone());
                if result.is_success() {
                    result.flags.ai_cropped = ai_cropped;
                    result.error = source.decode_error.as_ref().map(ResultError::from);
                }
                results.push(result);
            }
        }
    }

    engine.record_image();
    engine.record_results(&results);
    engine.report("done", 100);
    Ok(results)
}

async fn spec_failure(
    engine: &ProcessingEngine,
    image: &ImageAsset,
    spec: &TemplateSpec,
    size: (u32, u32),
    error: &EngineError,
    limit: Duration,
) -> Vec<ProcessedResult> {
    let size = engine.config().fit_output_surface(size.0, size.1);
    let formats = formats_for(spec, false);
    let mut results = failure_results(image, &formats, size, error, limit, |format| {
        template_output_name(spec, &image.name, format)
    })
    .await;
    for result in &mut results {
        result.template_id = Some(spec.id.clone());
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisp_core::models::TemplateCategory;

    fn spec(id: &str, width: u32, height: TemplateHeight) -> TemplateSpec {
        TemplateSpec::new(id, id, "Test", TemplateCategory::Social, width, height)
    }

    #[test]
    fn test_group_specs_keeps_order() {
        let specs = vec![
            spec("a", 1080, TemplateHeight::Fixed(1080)),
            spec("b", 1200, TemplateHeight::Auto),
            spec("c", 1080, TemplateHeight::Fixed(1080)),
        ];
        let groups = group_specs(&specs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "1080x1080");
        assert_eq!(groups[0].specs.len(), 2);
        assert_eq!(groups[1].key, "auto_1200");
    }

    #[test]
    fn test_target_size_auto_keeps_aspect() {
        let s = spec("w", 1200, TemplateHeight::Auto);
        assert_eq!(target_size(&s, (400, 300)), (1200, 900));
        let s = spec("f", 500, TemplateHeight::Fixed(200));
        assert_eq!(target_size(&s, (400, 300)), (500, 200));
    }

    #[tokio::test]
    async fn test_template_over_pixel_budget_becomes_error_result() {
        let engine = ProcessingEngine::builder()
            .config(crisp_core::EngineConfig {
                max_total_pixels: 10_000,
                ..crisp_core::EngineConfig::default()
            })
            .build()
            .unwrap();
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            60,
            40,
            image::Rgba([10, 200, 10, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let asset = ImageAsset::new("banner.png", "image/png", bytes::Bytes::from(buf));
        let specs = vec![
            spec("huge", 1000, TemplateHeight::Fixed(1000)),
            spec("small", 50, TemplateHeight::Fixed(50)),
        ];

        let results = engine.expand_templates(&asset, &specs, false).await.unwrap();
        assert_eq!(results.len(), 4);
        for result in &results[..2] {
            assert_eq!(result.template_id.as_deref(), Some("huge"));
            assert_eq!(
                result.error.as_ref().unwrap().code,
                "RESOURCE_LIMIT_EXCEEDED"
            );
            let dims = result.dimensions;
            assert!(dims.width as u64 * dims.height as u64 <= 10_000);
        }
        assert!(results[2..].iter().all(|r| r.is_success()));
    }

    #[test]
    fn test_secondary_format_by_category() {
        let mut s = spec("l", 100, TemplateHeight::Auto);
        assert_eq!(formats_for(&s, true), [OutputFormat::WebP, OutputFormat::Jpeg]);
        s.category = TemplateCategory::Logo;
        assert_eq!(formats_for(&s, true), [OutputFormat::WebP, OutputFormat::Png]);
        assert_eq!(formats_for(&s, false), [OutputFormat::WebP, OutputFormat::Jpeg]);
    }
}
