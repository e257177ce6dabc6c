//! HTTP enlarger for a single scale factor

use std::fmt::{Debug, Formatter, Result as FmtResult};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use crisp_core::EngineError;
use crisp_processing::{Enlarger, Raster};
use serde::Deserialize;
use serde_json::json;

use crate::remote_vision::encode_png_base64;

pub struct RemoteEnlarger {
    http_client: reqwest::Client,
    endpoint: String,
    model_id: String,
    scale: u32,
}

impl Debug for RemoteEnlarger {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RemoteEnlarger")
            .field("endpoint", &self.endpoint)
            .field("model_id", &self.model_id)
            .field("scale", &self.scale)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct EnlargeResponse {
    image: Option<String>,
    error: Option<String>,
}

impl RemoteEnlarger {
    pub fn new(
        http_client: reqwest::Client,
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
        scale: u32,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            model_id: model_id.into(),
            scale,
        }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    async fn request(&self, raster: &Raster) -> Result<Raster> {
        let (image_base64, _) = encode_png_base64(raster, u32::MAX)?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&json!({
                "model": self.model_id,
                "scale": self.scale,
                "image": image_base64,
            }))
            .send()
            .await
            .context("Failed to send enlarge request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Enlarge request failed: {} - {}",
                status,
                error_text
            ));
        }

        let body: EnlargeResponse = response
            .json()
            .await
            .context("Failed to parse enlarge response")?;
        if let Some(error) = body.error {
            return Err(anyhow::anyhow!("Enlarge service error: {}", error));
        }
        let encoded = body
            .image
            .ok_or_else(|| anyhow::anyhow!("Enlarge response has no image"))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .context("Enlarged image is not valid base64")?;
        let decoded = image::load_from_memory(&bytes).context("Failed to decode enlarged image")?;

        let expected = (raster.width() * self.scale, raster.height() * self.scale);
        if (decoded.width(), decoded.height()) != expected {
            return Err(anyhow::anyhow!(
                "Enlarged image is {}x{}, expected {}x{}",
                decoded.width(),
                decoded.height(),
                expected.0,
                expected.1
            ));
        }
        Ok(Raster::from_dynamic(decoded))
    }
}

#[async_trait]
impl Enlarger for RemoteEnlarger {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn enlarge(&self, raster: &Raster, scale: u32) -> Result<Raster, EngineError> {
        if scale != self.scale {
            return Err(EngineError::InvalidInput(format!(
                "{} enlarges by {}, asked for {}",
                self.model_id, self.scale, scale
            )));
        }
        self.request(raster).await.map_err(|e| {
            tracing::warn!(model = %self.model_id, scale, error = %e, "Remote enlarge failed");
            EngineError::ModelUnavailable(format!("{:#}", e))
        })
    }

    fn dispose(&self) {
        tracing::debug!(model = %self.model_id, scale = self.scale, "Remote enlarger released");
    }
}
