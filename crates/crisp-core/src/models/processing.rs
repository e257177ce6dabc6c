use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Output format for encoded artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    #[serde(rename = "webp")]
    WebP,
    Avif,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "avif" => Ok(OutputFormat::Avif),
            _ => Err(EngineError::InvalidInput(format!("Invalid format: {}", s))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    pub fn is_lossless(self) -> bool {
        matches!(self, OutputFormat::Png)
    }

    pub fn supports_alpha(self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }
}

/// Named crop anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropPosition {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl CropPosition {
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "center" | "centre" => Ok(CropPosition::Center),
            "top" => Ok(CropPosition::Top),
            "bottom" => Ok(CropPosition::Bottom),
            "left" => Ok(CropPosition::Left),
            "right" => Ok(CropPosition::Right),
            "top-left" => Ok(CropPosition::TopLeft),
            "top-right" => Ok(CropPosition::TopRight),
            "bottom-left" => Ok(CropPosition::BottomLeft),
            "bottom-right" => Ok(CropPosition::BottomRight),
            _ => Err(EngineError::InvalidInput(format!(
                "Invalid crop position: {}",
                s
            ))),
        }
    }

    /// Horizontal placement: -1 left, 0 center, 1 right
    pub fn horizontal(self) -> i8 {
        match self {
            CropPosition::Left | CropPosition::TopLeft | CropPosition::BottomLeft => -1,
            CropPosition::Right | CropPosition::TopRight | CropPosition::BottomRight => 1,
            _ => 0,
        }
    }

    /// Vertical placement: -1 top, 0 center, 1 bottom
    pub fn vertical(self) -> i8 {
        match self {
            CropPosition::Top | CropPosition::TopLeft | CropPosition::TopRight => -1,
            CropPosition::Bottom | CropPosition::BottomLeft | CropPosition::BottomRight => 1,
            _ => 0,
        }
    }

    /// Anchor from horizontal and vertical placements (each -1, 0 or 1)
    pub fn from_placement(horizontal: i8, vertical: i8) -> Self {
        match (horizontal.signum(), vertical.signum()) {
            (-1, -1) => CropPosition::TopLeft,
            (0, -1) => CropPosition::Top,
            (1, -1) => CropPosition::TopRight,
            (-1, 0) => CropPosition::Left,
            (1, 0) => CropPosition::Right,
            (-1, 1) => CropPosition::BottomLeft,
            (0, 1) => CropPosition::Bottom,
            (1, 1) => CropPosition::BottomRight,
            _ => CropPosition::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    #[default]
    Standard,
    Smart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionOptions {
    pub quality: f32,
    #[serde(default, rename = "targetSizeKB")]
    pub target_size_kb: Option<u32>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            quality: 0.85,
            target_size_kb: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    pub formats: Vec<OutputFormat>,
    #[serde(default)]
    pub rename: bool,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            formats: vec![OutputFormat::WebP],
            rename: false,
            pattern: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeOptions {
    pub enabled: bool,
    #[serde(default)]
    pub dimension: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropOptions {
    pub enabled: bool,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub mode: CropMode,
    #[serde(default)]
    pub position: CropPosition,
}

impl CropOptions {
    /// Target size when cropping is enabled and fully specified
    pub fn target(&self) -> Option<(u32, u32)> {
        if !self.enabled {
            return None;
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

/// User-chosen processing options for one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingConfig {
    #[serde(default)]
    pub compression: CompressionOptions,
    #[serde(default)]
    pub output: OutputOptions,
    #[serde(default)]
    pub resize: ResizeOptions,
    #[serde(default)]
    pub crop: CropOptions,
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.compression.quality) {
            return Err(EngineError::InvalidInput(format!(
                "quality must be within [0, 1], got {}",
                self.compression.quality
            )));
        }
        if self.crop.width.is_some() != self.crop.height.is_some() {
            return Err(EngineError::InvalidInput(
                "crop width and height must be given together".to_string(),
            ));
        }
        if self.resize.enabled && self.resize.dimension == Some(0) {
            return Err(EngineError::InvalidInput(
                "resize dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with an empty format list replaced by JPEG
    pub fn with_safe_defaults(&self) -> Self {
        let mut config = self.clone();
        if config.output.formats.is_empty() {
            tracing::warn!("No output formats requested, defaulting to jpeg");
            config.output.formats = vec![OutputFormat::Jpeg];
        }
        config
    }

    /// Resize dimension when resizing is enabled
    pub fn resize_dimension(&self) -> Option<u32> {
        if self.resize.enabled {
            self.resize.dimension.filter(|d| *d > 0)
        } else {
            None
        }
    }
}
