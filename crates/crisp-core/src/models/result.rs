use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Dimensions, OutputFormat};
use crate::error::{EngineError, ErrorMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFlags {
    pub optimized: bool,
    pub ai_cropped: bool,
}

/// Error recorded on a failed unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    pub code: String,
    pub message: String,
}

impl From<&EngineError> for ResultError {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.client_message(),
        }
    }
}

/// One output artifact
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    pub source_image_id: Uuid,
    pub bytes: Bytes,
    pub name: String,
    pub format: OutputFormat,
    pub dimensions: Dimensions,
    pub flags: ResultFlags,
    pub error: Option<ResultError>,
    /// Set for template artifacts
    pub template_id: Option<String>,
}

impl ProcessedResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}
