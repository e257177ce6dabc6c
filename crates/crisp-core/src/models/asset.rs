use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pixel dimensions of a surface or artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn longest_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn is_landscape_or_square(&self) -> bool {
        self.width >= self.height
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Source formats the engine recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Ico,
    Tiff,
    Svg,
    Avif,
    Unknown,
}

impl SourceFormat {
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => SourceFormat::Jpeg,
            "image/png" | "image/apng" => SourceFormat::Png,
            "image/gif" => SourceFormat::Gif,
            "image/webp" => SourceFormat::WebP,
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => SourceFormat::Bmp,
            "image/x-icon" | "image/vnd.microsoft.icon" | "image/ico" => SourceFormat::Ico,
            "image/tiff" | "image/tif" | "image/x-tiff" => SourceFormat::Tiff,
            "image/svg+xml" | "image/svg" => SourceFormat::Svg,
            "image/avif" => SourceFormat::Avif,
            _ => SourceFormat::Unknown,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => SourceFormat::Jpeg,
            "png" | "apng" => SourceFormat::Png,
            "gif" => SourceFormat::Gif,
            "webp" => SourceFormat::WebP,
            "bmp" | "dib" => SourceFormat::Bmp,
            "ico" | "cur" => SourceFormat::Ico,
            "tif" | "tiff" => SourceFormat::Tiff,
            "svg" | "svgz" => SourceFormat::Svg,
            "avif" => SourceFormat::Avif,
            _ => SourceFormat::Unknown,
        }
    }

    /// Formats that can never carry an alpha channel
    pub fn is_always_opaque(self) -> bool {
        matches!(self, SourceFormat::Jpeg)
    }
}

/// Detected format of an ingested asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format: SourceFormat,
    pub is_legacy_tiff: bool,
    pub is_vector: bool,
}

impl FormatInfo {
    pub fn of(format: SourceFormat) -> Self {
        Self {
            format,
            is_legacy_tiff: format == SourceFormat::Tiff,
            is_vector: format == SourceFormat::Svg,
        }
    }
}

/// One user-supplied source image
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub id: Uuid,
    pub bytes: Bytes,
    pub name: String,
    pub declared_type: String,
    pub size: u64,
    /// Filled in by inspection; `None` until then
    pub format: Option<FormatInfo>,
    pub dimensions: Option<Dimensions>,
    /// Encoded PNG thumbnail
    pub preview: Option<Bytes>,
    pub created_at: DateTime<Utc>,
}

impl ImageAsset {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            size: bytes.len() as u64,
            bytes,
            name: name.into(),
            declared_type: declared_type.into(),
            format: None,
            dimensions: None,
            preview: None,
            created_at: Utc::now(),
        }
    }

    /// Filename without its final extension
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }

    /// Final filename extension, lowercase, without the dot
    pub fn extension(&self) -> Option<String> {
        let idx = self.name.rfind('.')?;
        if idx == 0 || idx + 1 == self.name.len() {
            return None;
        }
        Some(self.name[idx + 1..].to_lowercase())
    }

    pub fn is_inspected(&self) -> bool {
        self.format.is_some() && self.dimensions.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_and_extension() {
        let asset = ImageAsset::new("holiday.photo.JPG", "image/jpeg", Bytes::new());
        assert_eq!(asset.base_name(), "holiday.photo");
        assert_eq!(asset.extension().as_deref(), Some("jpg"));

        let hidden = ImageAsset::new(".hidden", "", Bytes::new());
        assert_eq!(hidden.base_name(), ".hidden");
        assert_eq!(hidden.extension(), None);
    }

    #[test]
    fn test_source_format_lookup() {
        assert_eq!(SourceFormat::from_mime("image/tiff"), SourceFormat::Tiff);
        assert_eq!(SourceFormat::from_extension(".TIF"), SourceFormat::Tiff);
        assert_eq!(SourceFormat::from_extension("svg"), SourceFormat::Svg);
        assert_eq!(SourceFormat::from_mime("application/pdf"), SourceFormat::Unknown);
        assert!(FormatInfo::of(SourceFormat::Svg).is_vector);
    }
}
