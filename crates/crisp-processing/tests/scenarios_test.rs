mod helpers;

use bytes::Bytes;
use crisp_core::models::{
    CropMode, CropOptions, CropPosition, Dimensions, ImageAsset, OutputFormat, OutputOptions,
    ResizeOptions, TemplateCategory, TemplateHeight, TemplateSpec,
};
use crisp_core::EngineConfig;
use crisp_processing::{FormatNormalizer, ProcessingEngine, RasterOrigin, RasterTarget};
use helpers::{
    config_with_formats, decode_result, jpeg_asset, png_asset, solid_png, svg_asset,
    truncated_tiff,
};
use image::{Rgba, RgbaImage};

#[tokio::test]
async fn test_resize_jpeg_to_webp() {
    let engine = ProcessingEngine::default();
    let mut config = config_with_formats(vec![OutputFormat::WebP]);
    config.resize = ResizeOptions {
        enabled: true,
        dimension: Some(800),
    };

    let results = engine
        .process_batch(&[jpeg_asset("photo.jpg", 400, 300)], &config, false)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.is_success());
    assert_eq!(result.format, OutputFormat::WebP);
    assert_eq!(result.dimensions, Dimensions::new(800, 600));
    assert_eq!(result.name, "photo.webp");
}

#[tokio::test]
async fn test_standard_crop_top_left_of_wide_strip() {
    let engine = ProcessingEngine::default();
    let strip = RgbaImage::from_fn(2000, 100, |x, _| {
        if x < 100 {
            Rgba([220, 20, 20, 255])
        } else {
            Rgba([20, 20, 220, 255])
        }
    });
    let mut config = config_with_formats(vec![OutputFormat::Png]);
    config.crop = CropOptions {
        enabled: true,
        width: Some(500),
        height: Some(500),
        mode: CropMode::Standard,
        position: CropPosition::TopLeft,
    };

    let results = engine
        .process_batch(&[png_asset("strip.png", strip)], &config, false)
        .await
        .unwrap();

    let result = &results[0];
    assert!(result.is_success());
    assert_eq!(result.dimensions, Dimensions::new(500, 500));
    let out = decode_result(&result.bytes);
    assert_eq!(out.dimensions(), (500, 500));
    let center = out.get_pixel(250, 250);
    assert!(center[0] > 150 && center[2] < 100, "expected red, got {:?}", center);
}

#[tokio::test]
async fn test_svg_view_box_keeps_aspect() {
    let engine = ProcessingEngine::default();
    let svg = svg_asset(
        "badge.svg",
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 300 200"><rect width="300" height="200" fill="#3366cc"/></svg>"##,
    );
    let mut config = config_with_formats(vec![OutputFormat::Png]);
    config.resize = ResizeOptions {
        enabled: true,
        dimension: Some(600),
    };

    let results = engine.process_batch(&[svg], &config, false).await.unwrap();

    assert!(results[0].is_success());
    assert_eq!(results[0].dimensions, Dimensions::new(600, 400));
}

#[tokio::test]
async fn test_resize_only_template() {
    let engine = ProcessingEngine::default();
    let spec = TemplateSpec::new(
        "web-hero",
        "Hero",
        "Website",
        TemplateCategory::Web,
        1200,
        TemplateHeight::Auto,
    );

    let opaque = engine
        .expand_templates(&solid_png("hero.png", 400, 300, [10, 80, 160, 255]), &[spec.clone()], false)
        .await
        .unwrap();
    let formats: Vec<_> = opaque.iter().map(|r| r.format).collect();
    assert_eq!(formats, vec![OutputFormat::WebP, OutputFormat::Jpeg]);
    assert!(opaque
        .iter()
        .all(|r| r.dimensions == Dimensions::new(1200, 900)));
    assert_eq!(opaque[0].name, "website-hero-hero.webp");
    assert_eq!(opaque[1].template_id.as_deref(), Some("web-hero"));

    let transparent = engine
        .expand_templates(&solid_png("logo.png", 400, 300, [10, 80, 160, 0]), &[spec], false)
        .await
        .unwrap();
    let formats: Vec<_> = transparent.iter().map(|r| r.format).collect();
    assert_eq!(formats, vec![OutputFormat::WebP, OutputFormat::Png]);
}

#[tokio::test]
async fn test_smart_crop_without_ai_uses_focal_point() {
    let engine = ProcessingEngine::default();
    // Flat gray on the left, checkerboard on the right third
    let source = RgbaImage::from_fn(600, 200, |x, y| {
        if x < 400 {
            Rgba([128, 128, 128, 255])
        } else if ((x / 8) + (y / 8)) % 2 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let mut config = config_with_formats(vec![OutputFormat::Png]);
    config.crop = CropOptions {
        enabled: true,
        width: Some(200),
        height: Some(200),
        mode: CropMode::Smart,
        position: CropPosition::Center,
    };

    let results = engine
        .process_batch(&[png_asset("busy.png", source)], &config, false)
        .await
        .unwrap();

    let result = &results[0];
    assert!(result.is_success());
    assert!(!result.flags.ai_cropped);
    assert_eq!(result.dimensions, Dimensions::new(200, 200));
    let out = decode_result(&result.bytes);
    let dark = out.pixels().filter(|p| p[0] < 50).count();
    let light = out.pixels().filter(|p| p[0] > 200).count();
    assert!(dark > 1000 && light > 1000, "crop missed the detailed region");
}

#[tokio::test]
async fn test_template_groups_share_transform() {
    let engine = ProcessingEngine::default();
    let specs = vec![
        TemplateSpec::new("ig-post", "Post", "Instagram", TemplateCategory::Social, 300, TemplateHeight::Fixed(300)),
        TemplateSpec::new("fb-post", "Post", "Facebook", TemplateCategory::Social, 300, TemplateHeight::Fixed(300)),
        TemplateSpec::new("x-header", "Header", "X", TemplateCategory::Social, 600, TemplateHeight::Fixed(200)),
    ];

    let results = engine
        .expand_templates(&solid_png("team.png", 640, 480, [200, 40, 40, 255]), &specs, false)
        .await
        .unwrap();

    assert_eq!(engine.stats().transforms_computed, 2);
    assert_eq!(results.len(), 6);
    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "instagram-post-team.webp",
            "instagram-post-team.jpg",
            "facebook-post-team.webp",
            "facebook-post-team.jpg",
            "x-header-team.webp",
            "x-header-team.jpg",
        ]
    );
    assert!(results[..4]
        .iter()
        .all(|r| r.dimensions == Dimensions::new(300, 300)));
    assert_eq!(results[4].dimensions, Dimensions::new(600, 200));
}

#[test]
fn test_truncated_tiff_uses_parsed_dimensions() {
    let asset = ImageAsset::new("scan.tif", "image/tiff", Bytes::from(truncated_tiff(640, 480)));
    let normalized = FormatNormalizer::new(EngineConfig::default().max_total_pixels)
        .normalize(&asset, RasterTarget::Natural);
    assert_eq!((normalized.raster.width(), normalized.raster.height()), (640, 480));
}

#[test]
fn test_garbage_tiff_uses_default_dimensions() {
    let mut bytes = b"II*\0".to_vec();
    bytes.extend_from_slice(&[0xFF; 12]);
    let asset = ImageAsset::new("scan.tif", "image/tiff", Bytes::from(bytes));
    let normalized = FormatNormalizer::new(EngineConfig::default().max_total_pixels)
        .normalize(&asset, RasterTarget::Natural);
    assert_eq!(normalized.origin, RasterOrigin::Placeholder);
    assert_eq!((normalized.raster.width(), normalized.raster.height()), (800, 600));
}

#[tokio::test]
async fn test_rename_pattern_numbers_outputs() {
    let engine = ProcessingEngine::default();
    let mut config = config_with_formats(vec![OutputFormat::Jpeg]);
    config.output = OutputOptions {
        formats: vec![OutputFormat::Jpeg],
        rename: true,
        pattern: Some("trip".to_string()),
    };
    let images = vec![
        solid_png("a.png", 16, 16, [1, 2, 3, 255]),
        solid_png("b.png", 16, 16, [4, 5, 6, 255]),
    ];

    let results = engine.process_batch(&images, &config, false).await.unwrap();

    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["trip-01.jpg", "trip-02.jpg"]);
    assert_eq!(engine.stats().images_processed, 2);
}
