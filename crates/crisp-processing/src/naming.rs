//! Output file naming.

use crisp_core::models::{OutputFormat, OutputOptions, TemplateSpec};

const MAX_FILENAME_LENGTH: usize = 255;

/// Strip directories and replace characters unsafe in filenames
pub fn sanitize_filename(filename: &str) -> String {
    let path = std::path::Path::new(filename);
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "image".to_string();
    }
    let s: String = base
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.trim_matches(|c| c == '_' || c == '.').is_empty() {
        "image".to_string()
    } else {
        s
    }
}

/// Lowercase, alphanumerics only, single dashes between words
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Name for the output of image `index` (zero-based) in a batch.
///
/// With renaming on, `{pattern}-{nn}.{ext}` numbered from 01; otherwise the
/// source stem with the new extension.
pub fn batch_output_name(
    source_name: &str,
    index: usize,
    format: OutputFormat,
    output: &OutputOptions,
) -> String {
    let pattern = output
        .pattern
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    match pattern {
        Some(pattern) if output.rename => {
            let pattern = sanitize_filename(pattern);
            format!("{}-{:02}.{}", pattern, index + 1, format.extension())
        }
        _ => {
            let clean = sanitize_filename(source_name);
            format!("{}.{}", stem(&clean), format.extension())
        }
    }
}

/// `{platform}-{templateName}-{baseName}.{ext}`, slugged
pub fn template_output_name(spec: &TemplateSpec, source_name: &str, format: OutputFormat) -> String {
    let base = slug(stem(&sanitize_filename(source_name)));
    let base = if base.is_empty() { "image".to_string() } else { base };
    format!(
        "{}-{}-{}.{}",
        slug(&spec.platform),
        slug(&spec.name),
        base,
        format.extension()
    )
}
