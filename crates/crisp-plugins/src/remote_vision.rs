//! HTTP object detector
//!
//! Sends the raster as a base64 PNG and reads back boxes in pixel
//! coordinates of the submitted image.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Cursor;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use crisp_core::models::{BoundingBox, SubjectDetection};
use crisp_core::EngineError;
use crisp_processing::{ObjectDetector, Raster};
use serde::Deserialize;
use serde_json::json;

/// Longest edge sent to the service; larger rasters are downscaled first
pub const MAX_UPLOAD_EDGE: u32 = 1024;

pub struct RemoteVisionDetector {
    http_client: reqwest::Client,
    endpoint: String,
    model_id: String,
}

impl Debug for RemoteVisionDetector {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RemoteVisionDetector")
            .field("endpoint", &self.endpoint)
            .field("model_id", &self.model_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    #[serde(default)]
    detections: Vec<DetectionEntry>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectionEntry {
    label: String,
    #[serde(alias = "score")]
    confidence: f32,
    #[serde(rename = "box")]
    bbox: WireBox,
}

#[derive(Debug, Deserialize)]
struct WireBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Encode `raster` as base64 PNG, downscaled to at most `max_edge`.
///
/// Returns the encoded image and the factor that maps its coordinates back
/// to `raster`.
pub(crate) fn encode_png_base64(raster: &Raster, max_edge: u32) -> Result<(String, f32)> {
    let (width, height) = (raster.width(), raster.height());
    let longest = width.max(height);
    let (image, factor) = if longest > max_edge {
        let scale = max_edge as f32 / longest as f32;
        let w = ((width as f32 * scale).round() as u32).max(1);
        let h = ((height as f32 * scale).round() as u32).max(1);
        let resized = image::imageops::thumbnail(raster.as_rgba(), w, h);
        (image::DynamicImage::ImageRgba8(resized), longest as f32 / max_edge as f32)
    } else {
        (raster.to_dynamic(), 1.0)
    };

    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("Failed to encode raster as PNG")?;
    Ok((base64::engine::general_purpose::STANDARD.encode(&buf), factor))
}

impl RemoteVisionDetector {
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            model_id: model_id.into(),
        }
    }

    async fn request(&self, raster: &Raster) -> Result<Vec<SubjectDetection>> {
        let (image_base64, factor) = encode_png_base64(raster, MAX_UPLOAD_EDGE)?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&json!({
                "model": self.model_id,
                "image": image_base64,
            }))
            .send()
            .await
            .context("Failed to send detection request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Detection request failed: {} - {}",
                status,
                error_text
            ));
        }

        let body: DetectionResponse = response
            .json()
            .await
            .context("Failed to parse detection response")?;
        if let Some(error) = body.error {
            return Err(anyhow::anyhow!("Detection service error: {}", error));
        }

        Ok(body
            .detections
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.bbox.width > 0.0 && d.bbox.height > 0.0)
            .map(|d| SubjectDetection {
                bbox: BoundingBox::new(
                    d.bbox.x * factor,
                    d.bbox.y * factor,
                    d.bbox.width * factor,
                    d.bbox.height * factor,
                ),
                label: d.label.to_lowercase(),
                confidence: d.confidence.clamp(0.0, 1.0),
            })
            .collect())
    }
}

#[async_trait]
impl ObjectDetector for RemoteVisionDetector {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn detect(&self, raster: &Raster) -> Result<Vec<SubjectDetection>, EngineError> {
        let detections = self.request(raster).await.map_err(|e| {
            tracing::warn!(model = %self.model_id, error = %e, "Remote detection failed");
            EngineError::ModelUnavailable(format!("{:#}", e))
        })?;
        tracing::debug!(model = %self.model_id, count = detections.len(), "Remote detection complete");
        Ok(detections)
    }
}
