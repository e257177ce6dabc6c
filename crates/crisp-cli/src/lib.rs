use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use crisp_core::models::{ImageAsset, ProcessedResult, SourceFormat};

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Parse a `WxH` crop size
pub fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = w.trim().parse().with_context(|| format!("invalid width '{}'", w))?;
    let height: u32 = h.trim().parse().with_context(|| format!("invalid height '{}'", h))?;
    if width == 0 || height == 0 {
        anyhow::bail!("crop size must be positive, got '{}'", value);
    }
    Ok((width, height))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match SourceFormat::from_extension(ext) {
        SourceFormat::Jpeg => "image/jpeg",
        SourceFormat::Png => "image/png",
        SourceFormat::Gif => "image/gif",
        SourceFormat::WebP => "image/webp",
        SourceFormat::Bmp => "image/bmp",
        SourceFormat::Tiff => "image/tiff",
        SourceFormat::Svg => "image/svg+xml",
        SourceFormat::Ico => "image/x-icon",
        SourceFormat::Avif => "image/avif",
        SourceFormat::Unknown => "application/octet-stream",
    }
}

/// Read a file into an `ImageAsset`
pub async fn load_asset(path: &Path) -> Result<ImageAsset> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    Ok(ImageAsset::new(name, mime_for(path), Bytes::from(data)))
}

/// `name` made unique within `taken` by suffixing `-2`, `-3`, ...
pub fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Write successful results into `dir`; returns the written paths
pub async fn write_results(dir: &Path, results: &[ProcessedResult]) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut taken = HashSet::new();
    let mut written = Vec::new();
    for result in results.iter().filter(|r| r.is_success() && !r.bytes.is_empty()) {
        let path = dir.join(unique_name(&result.name, &mut taken));
        tokio::fs::write(&path, &result.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// One JSON line per result
pub fn result_summary(result: &ProcessedResult) -> serde_json::Value {
    serde_json::json!({
        "name": result.name,
        "format": result.format,
        "width": result.dimensions.width,
        "height": result.dimensions.height,
        "bytes": result.bytes.len(),
        "flags": result.flags,
        "templateId": result.template_id,
        "error": result.error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisp_core::models::{Dimensions, OutputFormat, ResultError, ResultFlags};
    use uuid::Uuid;

    fn result(name: &str, error: Option<ResultError>) -> ProcessedResult {
        ProcessedResult {
            source_image_id: Uuid::new_v4(),
            bytes: Bytes::from_static(b"data"),
            name: name.to_string(),
            format: OutputFormat::Png,
            dimensions: Dimensions::new(1, 1),
            flags: ResultFlags::default(),
            error,
            template_id: None,
        }
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("500x300").unwrap(), (500, 300));
        assert_eq!(parse_size("64X64").unwrap(), (64, 64));
        assert!(parse_size("500").is_err());
        assert!(parse_size("0x10").is_err());
    }

    #[test]
    fn test_unique_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("a.png", &mut taken), "a.png");
        assert_eq!(unique_name("a.png", &mut taken), "a-2.png");
        assert_eq!(unique_name("a.png", &mut taken), "a-3.png");
        assert_eq!(unique_name("noext", &mut taken), "noext");
        assert_eq!(unique_name("noext", &mut taken), "noext-2");
    }

    #[tokio::test]
    async fn test_write_results_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            result("x.png", None),
            result("x.png", None),
            result(
                "bad.png",
                Some(ResultError {
                    code: "DECODE_FAILURE".to_string(),
                    message: "no".to_string(),
                }),
            ),
        ];
        let written = write_results(dir.path(), &results).await.unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("x.png").exists());
        assert!(dir.path().join("x-2.png").exists());
        assert!(!dir.path().join("bad.png").exists());
    }

    #[tokio::test]
    async fn test_load_asset_sets_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.JPG");
        tokio::fs::write(&path, b"\xFF\xD8\xFF").await.unwrap();
        let asset = load_asset(&path).await.unwrap();
        assert_eq!(asset.name, "pic.JPG");
        assert_eq!(asset.declared_type, "image/jpeg");
        assert_eq!(asset.size, 3);
    }
}
