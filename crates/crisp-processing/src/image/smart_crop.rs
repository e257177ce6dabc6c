//! Crop decision per image: subject-aware when possible, focal-point or
//! anchored otherwise, placeholder as the last resort.

use crisp_core::models::{CropPosition, ImageAsset};
use crisp_core::{EngineConfig, EngineError};

use super::crop::{CropWindow, ImageCrop};
use super::focal::FocalPointEstimator;
use super::resize::ImageResize;
use super::SharpenKernel;
use crate::detect::SubjectDetector;
use crate::format::placeholder::{self, PlaceholderKind};
use crate::format::{FormatNormalizer, RasterOrigin, RasterTarget};
use crate::raster::Raster;
use crate::runtime::{bounded, bounded_blocking};
use crate::upscale::{enlarge_to_cover, UpscalerPool};

/// Steps of the crop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropState {
    Start,
    Normalize,
    SizeCheck,
    Upscale,
    Detect,
    Crop,
    /// Cropped surface handed to the encoder
    Encode,
    Done,
    ErrorFallback,
}

/// Which strategy produced the final raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPath {
    /// Window placed around a detected subject
    Subject,
    /// Anchor moved toward the edge-density focal point
    Focal,
    /// Oversized input cropped in source space, detection skipped
    Oversized,
    /// Every strategy failed
    Placeholder,
}

#[derive(Debug)]
pub struct CropOutcome {
    pub raster: Raster,
    pub ai_cropped: bool,
    pub path: CropPath,
    /// States visited, in order
    pub trace: Vec<CropState>,
    /// Error that sent the run to the fallback, if any
    pub failure: Option<EngineError>,
}

/// Smart crop orchestrator
pub struct SmartCropper<'a> {
    config: &'a EngineConfig,
    pool: &'a UpscalerPool,
    detector: &'a SubjectDetector,
}

impl<'a> SmartCropper<'a> {
    pub fn new(config: &'a EngineConfig, pool: &'a UpscalerPool, detector: &'a SubjectDetector) -> Self {
        Self {
            config,
            pool,
            detector,
        }
    }

    /// Normalize `asset` and crop it to `width` x `height`; never fails
    pub async fn crop_asset(&self, asset: &ImageAsset, width: u32, height: u32) -> CropOutcome {
        let mut trace = vec![CropState::Start, CropState::Normalize];
        let normalizer = FormatNormalizer::new(self.config.max_total_pixels);
        let owned = asset.clone();
        let limit = self.config.timeout_for(asset.size);

        let normalized = bounded_blocking("normalize", limit, move || {
            Ok(normalizer.normalize(&owned, RasterTarget::Cover(width, height)))
        })
        .await;

        match normalized {
            Ok(n) if n.origin == RasterOrigin::Decoded => {
                self.crop_from(&n.raster, width, height, trace).await
            }
            Ok(n) => {
                // Undecodable source: crop the informative placeholder without AI
                trace.push(CropState::ErrorFallback);
                self.fallback(&n.raster, width, height, trace, None).await
            }
            Err(e) => {
                trace.push(CropState::ErrorFallback);
                self.placeholder(width, height, trace, Some(e))
            }
        }
    }

    /// Crop an already decoded raster; never fails
    pub async fn crop_raster(&self, source: &Raster, width: u32, height: u32) -> CropOutcome {
        self.crop_from(source, width, height, vec![CropState::Start]).await
    }

    async fn crop_from(
        &self,
        source: &Raster,
        width: u32,
        height: u32,
        mut trace: Vec<CropState>,
    ) -> CropOutcome {
        tracing::debug!(
            source_width = source.width(),
            source_height = source.height(),
            width,
            height,
            "Applying smart crop"
        );
        match self.smart_path(source, width, height, &mut trace).await {
            Ok((raster, path)) => {
                trace.push(CropState::Encode);
                trace.push(CropState::Done);
                CropOutcome {
                    raster,
                    ai_cropped: path == CropPath::Subject,
                    path,
                    trace,
                    failure: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Smart crop failed, using fallback crop");
                trace.push(CropState::ErrorFallback);
                self.fallback(source, width, height, trace, Some(e)).await
            }
        }
    }

    async fn smart_path(
        &self,
        source: &Raster,
        width: u32,
        height: u32,
        trace: &mut Vec<CropState>,
    ) -> Result<(Raster, CropPath), EngineError> {
        let config = self.config;
        let limit = config.operation_timeout;

        trace.push(CropState::SizeCheck);
        config.check_output_surface(width, height)?;
        let oversized = source.pixel_count() > config.ai_pixel_ceiling
            || source.width().max(source.height()) > config.ai_max_edge;
        if oversized {
            tracing::info!(
                width = source.width(),
                height = source.height(),
                "Input above detection ceiling, cropping in source space"
            );
            trace.push(CropState::Crop);
            let owned = source.clone();
            let raster = bounded_blocking("oversized_crop", limit, move || {
                ImageCrop::region_crop(&owned, width, height, CropPosition::Center)
            })
            .await?;
            return Ok((raster, CropPath::Oversized));
        }

        let cover = ImageResize::cover_dimensions(source.width(), source.height(), width, height);
        let working = if width > source.width() || height > source.height() {
            trace.push(CropState::Upscale);
            bounded("upscale", limit, enlarge_to_cover(self.pool, source, cover, config))
                .await?
                .raster
        } else {
            let owned = source.clone();
            bounded_blocking("cover_resize", limit, move || {
                Ok(ImageResize::resize_exact(&owned, cover.0, cover.1))
            })
            .await?
        };

        trace.push(CropState::Detect);
        let subject = bounded("detect", limit, self.detector.main_subject_box(&working)).await?;

        trace.push(CropState::Crop);
        let margin = config.subject_margin;
        let edge_threshold = config.focal_edge_threshold;
        let deviation = config.focal_deviation_threshold;
        let (raster, path) = bounded_blocking("crop", limit, move || match subject {
            Some(bbox) => {
                let (x, y) = ImageCrop::subject_offset(
                    working.width(),
                    working.height(),
                    width,
                    height,
                    &bbox,
                    margin,
                );
                tracing::debug!(x, y, "Cropping around detected subject");
                let window = CropWindow {
                    x,
                    y,
                    width,
                    height,
                };
                Ok((ImageCrop::crop(&working, window)?, CropPath::Subject))
            }
            None => {
                let anchor = focal_anchor(&working, CropPosition::Center, edge_threshold, deviation);
                Ok((
                    ImageCrop::crop_anchored(&working, width, height, anchor)?,
                    CropPath::Focal,
                ))
            }
        })
        .await?;

        Ok((raster, path))
    }

    async fn fallback(
        &self,
        source: &Raster,
        width: u32,
        height: u32,
        trace: Vec<CropState>,
        failure: Option<EngineError>,
    ) -> CropOutcome {
        let config = self.config.clone();
        let owned = source.clone();
        let result = bounded_blocking("fallback_crop", self.config.operation_timeout, move || {
            focal_crop(&owned, width, height, &config)
        })
        .await;

        match result {
            Ok(raster) => {
                let mut trace = trace;
                trace.push(CropState::Encode);
                trace.push(CropState::Done);
                CropOutcome {
                    raster,
                    ai_cropped: false,
                    path: CropPath::Focal,
                    trace,
                    failure,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Fallback crop failed, emitting placeholder");
                self.placeholder(width, height, trace, Some(failure.unwrap_or(e)))
            }
        }
    }

    fn placeholder(
        &self,
        width: u32,
        height: u32,
        mut trace: Vec<CropState>,
        failure: Option<EngineError>,
    ) -> CropOutcome {
        trace.push(CropState::Done);
        let (width, height) = self.config.fit_output_surface(width, height);
        CropOutcome {
            raster: placeholder::render(width, height, PlaceholderKind::Error),
            ai_cropped: false,
            path: CropPath::Placeholder,
            trace,
            failure,
        }
    }
}

/// `baseline` moved toward the focal point of `raster` when it is far enough off center
pub fn focal_anchor(
    raster: &Raster,
    baseline: CropPosition,
    edge_threshold: f32,
    deviation_threshold: f32,
) -> CropPosition {
    let point = FocalPointEstimator::new(edge_threshold).estimate(raster);
    let anchor = FocalPointEstimator::adjust_anchor(
        baseline,
        point,
        raster.width(),
        raster.height(),
        deviation_threshold,
    );
    tracing::debug!(x = point.x, y = point.y, anchor = ?anchor, "Focal point anchor");
    anchor
}

fn exceeds_surface_limits(width: u32, height: u32, config: &EngineConfig) -> bool {
    width > config.max_surface_edge
        || height > config.max_surface_edge
        || width as u64 * height as u64 > config.max_total_pixels
}

/// Cover-scale then crop at `position`.
///
/// Targets over the output budget fail with `ResourceLimitExceeded`. When the cover surface would exceed the surface limits the region is cut
/// in source space first and only that region is resized.
pub fn standard_crop(
    source: &Raster,
    width: u32,
    height: u32,
    position: CropPosition,
    config: &EngineConfig,
) -> Result<Raster, EngineError> {
    config.check_output_surface(width, height)?;
    let (cw, ch) = ImageResize::cover_dimensions(source.width(), source.height(), width, height);
    let kernel = SharpenKernel::from(config);
    if exceeds_surface_limits(cw, ch, config) {
        tracing::debug!(cw, ch, "Cover surface over limits, cropping in source space");
        let window = ImageCrop::source_region(source.width(), source.height(), width, height, position);
        let region = ImageCrop::crop(source, window)?;
        return Ok(ImageResize::resize_sharpened(&region, width, height, kernel));
    }
    let covered = ImageResize::resize_sharpened(source, cw, ch, kernel);
    ImageCrop::crop_anchored(&covered, width, height, position)
}

/// Non-AI crop with the anchor adjusted toward the focal point
pub fn focal_crop(
    source: &Raster,
    width: u32,
    height: u32,
    config: &EngineConfig,
) -> Result<Raster, EngineError> {
    let anchor = focal_anchor(
        source,
        CropPosition::Center,
        config.focal_edge_threshold,
        config.focal_deviation_threshold,
    );
    standard_crop(source, width, height, anchor, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use crisp_core::models::{BoundingBox, SubjectDetection};
    use image::{Rgba, RgbaImage};

    use crate::traits::{ObjectDetector, OfflineModelProvider};

    struct BoxDetector(BoundingBox);

    #[async_trait]
    impl ObjectDetector for BoxDetector {
        fn name(&self) -> &str {
            "box"
        }

        async fn detect(&self, _raster: &Raster) -> Result<Vec<SubjectDetection>, EngineError> {
            Ok(vec![SubjectDetection {
                bbox: self.0,
                label: "person".to_string(),
                confidence: 0.9,
            }])
        }
    }

    struct FailingDetector;

    #[async_trait]
    impl ObjectDetector for FailingDetector {
        fn name(&self) -> &str {
            "failing"
        }

        async fn detect(&self, _raster: &Raster) -> Result<Vec<SubjectDetection>, EngineError> {
            Err(EngineError::ModelUnavailable("session lost".to_string()))
        }
    }

    struct StalledDetector;

    #[async_trait]
    impl ObjectDetector for StalledDetector {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn detect(&self, _raster: &Raster) -> Result<Vec<SubjectDetection>, EngineError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn pool(config: &EngineConfig) -> UpscalerPool {
        UpscalerPool::new(Arc::new(OfflineModelProvider), config)
    }

    fn bright_right_edge(width: u32, height: u32) -> Raster {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        for y in 0..height {
            for x in (width * 9 / 10)..width {
                if (x + y) % 2 == 0 {
                    img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
                }
            }
        }
        Raster::from_rgba(img)
    }

    #[tokio::test]
    async fn test_subject_crop_sets_ai_flag() {
        let config = EngineConfig::default();
        let pool = pool(&config);
        let detector = SubjectDetector::new(Some(Arc::new(BoxDetector(BoundingBox::new(
            700.0, 0.0, 100.0, 100.0,
        )))));
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&Raster::filled(1000, 500, [5, 5, 5, 255]), 400, 400).await;
        assert!(outcome.ai_cropped);
        assert_eq!(outcome.path, CropPath::Subject);
        assert_eq!((outcome.raster.width(), outcome.raster.height()), (400, 400));
        assert!(!outcome.trace.contains(&CropState::Upscale));
        assert_eq!(outcome.trace.last(), Some(&CropState::Done));
    }

    #[tokio::test]
    async fn test_no_model_uses_focal_path() {
        let config = EngineConfig::default();
        let pool = pool(&config);
        let detector = SubjectDetector::heuristic_only();
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&bright_right_edge(600, 300), 300, 300).await;
        assert!(!outcome.ai_cropped);
        assert_eq!(outcome.path, CropPath::Focal);
        assert_eq!((outcome.raster.width(), outcome.raster.height()), (300, 300));
    }

    #[tokio::test]
    async fn test_upscale_entered_when_target_exceeds_source() {
        let config = EngineConfig::default();
        let pool = pool(&config);
        let detector = SubjectDetector::heuristic_only();
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&Raster::filled(300, 200, [5, 5, 5, 255]), 500, 500).await;
        assert!(outcome.trace.contains(&CropState::Upscale));
        assert_eq!((outcome.raster.width(), outcome.raster.height()), (500, 500));
    }

    #[tokio::test]
    async fn test_oversized_skips_detection() {
        let config = EngineConfig {
            ai_pixel_ceiling: 10_000,
            ..EngineConfig::default()
        };
        let pool = pool(&config);
        let detector = SubjectDetector::new(Some(Arc::new(BoxDetector(BoundingBox::new(
            0.0, 0.0, 10.0, 10.0,
        )))));
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&Raster::filled(200, 100, [5, 5, 5, 255]), 50, 50).await;
        assert_eq!(outcome.path, CropPath::Oversized);
        assert!(!outcome.trace.contains(&CropState::Detect));
        assert_eq!((outcome.raster.width(), outcome.raster.height()), (50, 50));
    }

    #[test]
    fn test_focal_crop_moves_toward_detail() {
        let config = EngineConfig::default();
        let source = bright_right_edge(600, 300);
        let anchor = focal_anchor(&source, CropPosition::Center, 30.0, 0.15);
        assert_eq!(anchor, CropPosition::Right);
        let cropped = focal_crop(&source, 300, 300, &config).unwrap();
        // Right-anchored window includes the detailed band
        let bright = (0..300).filter(|x| cropped.pixel(*x, 10)[0] > 128).count();
        assert!(bright > 0);
    }

    #[test]
    fn test_standard_crop_over_limits_uses_region() {
        let config = EngineConfig {
            max_surface_edge: 1000,
            ..EngineConfig::default()
        };
        // Cover of 2000x100 for 500x500 is 10000x500
        let cropped = standard_crop(
            &Raster::filled(2000, 100, [1, 1, 1, 255]),
            500,
            500,
            CropPosition::Center,
            &config,
        )
        .unwrap();
        assert_eq!((cropped.width(), cropped.height()), (500, 500));
    }

    #[tokio::test]
    async fn test_detector_error_degrades_to_focal_crop() {
        let config = EngineConfig::default();
        let pool = pool(&config);
        let detector = SubjectDetector::new(Some(Arc::new(FailingDetector)));
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&bright_right_edge(400, 200), 200, 200).await;
        assert_eq!(outcome.path, CropPath::Focal);
        assert!(!outcome.ai_cropped);
        assert!(outcome.failure.is_none());
        assert!(outcome.trace.contains(&CropState::Detect));
        assert!(!outcome.trace.contains(&CropState::ErrorFallback));
        assert_eq!((outcome.raster.width(), outcome.raster.height()), (200, 200));
    }

    #[tokio::test]
    async fn test_detector_timeout_enters_error_fallback() {
        let config = EngineConfig {
            operation_timeout: std::time::Duration::from_secs(1),
            ..EngineConfig::default()
        };
        let pool = pool(&config);
        let detector = SubjectDetector::new(Some(Arc::new(StalledDetector)));
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&bright_right_edge(200, 100), 100, 100).await;
        assert_eq!(outcome.path, CropPath::Focal);
        assert!(!outcome.ai_cropped);
        assert!(outcome.trace.contains(&CropState::ErrorFallback));
        assert!(matches!(outcome.failure, Some(EngineError::Timeout { .. })));
        assert_eq!((outcome.raster.width(), outcome.raster.height()), (100, 100));
        assert_eq!(outcome.trace.last(), Some(&CropState::Done));
    }

    #[tokio::test]
    async fn test_failed_fallback_yields_error_placeholder() {
        let config = EngineConfig {
            max_total_pixels: 10_000,
            ..EngineConfig::default()
        };
        let pool = pool(&config);
        let detector = SubjectDetector::heuristic_only();
        let cropper = SmartCropper::new(&config, &pool, &detector);

        let outcome = cropper.crop_raster(&Raster::filled(80, 80, [5, 5, 5, 255]), 400, 400).await;
        assert_eq!(outcome.path, CropPath::Placeholder);
        assert!(!outcome.ai_cropped);
        assert_eq!(
            outcome.trace,
            vec![
                CropState::Start,
                CropState::SizeCheck,
                CropState::ErrorFallback,
                CropState::Done
            ]
        );
        assert!(matches!(
            outcome.failure,
            Some(EngineError::ResourceLimitExceeded { .. })
        ));
        assert!(outcome.raster.pixel_count() <= 10_000);
    }

    #[test]
    fn test_standard_crop_rejects_target_over_budget() {
        let config = EngineConfig {
            max_total_pixels: 10_000,
            ..EngineConfig::default()
        };
        let err = standard_crop(
            &Raster::filled(80, 80, [1, 1, 1, 255]),
            400,
            400,
            CropPosition::Center,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ResourceLimitExceeded { .. }));
    }
}
