use async_trait::async_trait;
use crisp_core::models::{BoundingBox, SubjectDetection};
use crisp_core::EngineError;

use crate::raster::Raster;
use crate::traits::ObjectDetector;

pub const HEURISTIC_LABEL: &str = "heuristic";

/// Stand-in detector returning one centered box covering half of each axis
pub struct HeuristicDetector;

impl HeuristicDetector {
    pub fn boxes(width: u32, height: u32) -> Vec<SubjectDetection> {
        let (w, h) = (width as f32, height as f32);
        vec![SubjectDetection {
            bbox: BoundingBox::new(w * 0.25, h * 0.25, w * 0.5, h * 0.5),
            label: HEURISTIC_LABEL.to_string(),
            confidence: 0.5,
        }]
    }
}

#[async_trait]
impl ObjectDetector for HeuristicDetector {
    fn name(&self) -> &str {
        HEURISTIC_LABEL
    }

    async fn detect(&self, raster: &Raster) -> Result<Vec<SubjectDetection>, EngineError> {
        Ok(Self::boxes(raster.width(), raster.height()))
    }
}
