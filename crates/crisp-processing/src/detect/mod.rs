//! Subject detection and main-subject ranking.

mod heuristic;

pub use heuristic::HeuristicDetector;

use std::sync::Arc;

use crisp_core::models::{BoundingBox, SubjectDetection};
use crisp_core::EngineError;

use crate::raster::Raster;
use crate::traits::ObjectDetector;

/// Detections below this confidence never become the main subject
pub const MIN_CONFIDENCE: f32 = 0.3;

/// Classes that are rarely the intended subject of a photo
pub const INCIDENTAL_CLASSES: &[&str] = &[
    "book",
    "cell phone",
    "keyboard",
    "mouse",
    "remote",
    "laptop",
    "tv",
];

const SIZE_WEIGHT: f32 = 0.4;
const CONFIDENCE_WEIGHT: f32 = 0.4;
const CENTRALITY_WEIGHT: f32 = 0.2;

/// Where a set of detections came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct Detections {
    pub items: Vec<SubjectDetection>,
    pub source: DetectionSource,
}

impl Detections {
    /// True when a model reported at least one box
    pub fn has_model_subject(&self) -> bool {
        self.source == DetectionSource::Model && !self.items.is_empty()
    }
}

fn class_boost(label: &str) -> f32 {
    match label.to_ascii_lowercase().as_str() {
        "person" | "man" | "woman" | "child" | "people" => 1.5,
        "face" => 1.3,
        "cat" | "dog" | "bird" => 1.2,
        _ => 1.0,
    }
}

/// Ranking score of one detection on a `width` x `height` raster
pub fn subject_score(detection: &SubjectDetection, width: u32, height: u32) -> f32 {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let size = (detection.bbox.area() / (w * h)).clamp(0.0, 1.0);

    let (cx, cy) = detection.bbox.center();
    let dx = (cx - w / 2.0) / (w / 2.0);
    let dy = (cy - h / 2.0) / (h / 2.0);
    let centrality = (1.0 - (dx * dx + dy * dy).sqrt() / std::f32::consts::SQRT_2).clamp(0.0, 1.0);

    let base = size * SIZE_WEIGHT
        + detection.confidence.clamp(0.0, 1.0) * CONFIDENCE_WEIGHT
        + centrality * CENTRALITY_WEIGHT;
    base * class_boost(&detection.label)
}

/// Highest-scoring eligible detection
pub fn main_subject<'a>(
    detections: &'a [SubjectDetection],
    width: u32,
    height: u32,
) -> Option<&'a SubjectDetection> {
    detections
        .iter()
        .filter(|d| d.confidence >= MIN_CONFIDENCE)
        .filter(|d| {
            let label = d.label.to_ascii_lowercase();
            !INCIDENTAL_CLASSES.contains(&label.as_str())
        })
        .map(|d| (d, subject_score(d, width, height)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(d, _)| d)
}

/// Wraps an optional detection capability and substitutes a heuristic box
/// when it is missing or fails.
#[derive(Clone)]
pub struct SubjectDetector {
    model: Option<Arc<dyn ObjectDetector>>,
}

impl SubjectDetector {
    pub fn new(model: Option<Arc<dyn ObjectDetector>>) -> Self {
        Self { model }
    }

    pub fn heuristic_only() -> Self {
        Self { model: None }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Detections sorted by descending subject score
    pub async fn detect(&self, raster: &Raster) -> Detections {
        if let Some(model) = &self.model {
            match model.detect(raster).await {
                Ok(mut items) => {
                    let (w, h) = (raster.width(), raster.height());
                    items.retain(|d| d.bbox.width > 0.0 && d.bbox.height > 0.0);
                    items.sort_by(|a, b| {
                        subject_score(b, w, h).total_cmp(&subject_score(a, w, h))
                    });
                    tracing::debug!(
                        detector = model.name(),
                        count = items.len(),
                        "Subject detection finished"
                    );
                    return Detections {
                        items,
                        source: DetectionSource::Model,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        detector = model.name(),
                        error = %e,
                        "Detector failed, using heuristic box"
                    );
                }
            }
        }

        Detections {
            items: HeuristicDetector::boxes(raster.width(), raster.height()),
            source: DetectionSource::Heuristic,
        }
    }

    /// Main subject box from a model detection, if any qualifies
    pub async fn main_subject_box(&self, raster: &Raster) -> Result<Option<BoundingBox>, EngineError> {
        let detections = self.detect(raster).await;
        if detections.source != DetectionSource::Model {
            return Ok(None);
        }
        Ok(main_subject(&detections.items, raster.width(), raster.height()).map(|d| d.bbox))
    }
}
