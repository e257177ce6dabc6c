//! SVG sizing and rasterization.

use regex::Regex;

use crisp_core::EngineError;

use crate::raster::Raster;

/// Size used when the markup declares neither attributes nor a viewBox
pub const DEFAULT_SVG_SIZE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSource {
    Attributes,
    ViewBox,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgSize {
    pub width: f32,
    pub height: f32,
    pub source: SizeSource,
}

fn root_tag(markup: &str) -> Option<&str> {
    let start = markup.find("<svg")?;
    let rest = &markup[start..];
    let end = rest.find('>')?;
    Some(&rest[..end])
}

/// Length attribute in px; percentages and unparseable values yield `None`
fn length_attribute(tag: &str, name: &str) -> Option<f32> {
    let pattern = Regex::new(&format!(
        r#"(?:^|\s){}\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(px|pt|pc|mm|cm|in|em)?\s*["']"#,
        name
    ))
    .ok()?;
    let caps = pattern.captures(tag)?;
    let value = caps.get(1)?.as_str().parse::<f32>().ok()?;
    let px = match caps.get(2).map(|m| m.as_str()) {
        Some("pt") => value * 4.0 / 3.0,
        Some("pc") => value * 16.0,
        Some("mm") => value * 96.0 / 25.4,
        Some("cm") => value * 96.0 / 2.54,
        Some("in") => value * 96.0,
        Some("em") => value * 16.0,
        _ => value,
    };
    (px > 0.0 && px.is_finite()).then_some(px)
}

fn view_box(tag: &str) -> Option<(f32, f32)> {
    let pattern = Regex::new(
        r#"(?:^|\s)viewBox\s*=\s*["']\s*(-?[0-9.eE+-]+)[\s,]+(-?[0-9.eE+-]+)[\s,]+([0-9.eE+-]+)[\s,]+([0-9.eE+-]+)\s*["']"#,
    )
    .ok()?;
    let caps = pattern.captures(tag)?;
    let width = caps.get(3)?.as_str().parse::<f32>().ok()?;
    let height = caps.get(4)?.as_str().parse::<f32>().ok()?;
    (width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite())
        .then_some((width, height))
}

/// Intrinsic size: explicit width/height, then viewBox, then 100x100
pub fn intrinsic_size(markup: &str) -> SvgSize {
    let Some(tag) = root_tag(markup) else {
        return SvgSize {
            width: DEFAULT_SVG_SIZE,
            height: DEFAULT_SVG_SIZE,
            source: SizeSource::Default,
        };
    };
    let width = length_attribute(tag, "width");
    let height = length_attribute(tag, "height");
    let vb = view_box(tag);

    match (width, height, vb) {
        (Some(w), Some(h), _) => SvgSize {
            width: w,
            height: h,
            source: SizeSource::Attributes,
        },
        (Some(w), None, Some((vw, vh))) => SvgSize {
            width: w,
            height: w * vh / vw,
            source: SizeSource::Attributes,
        },
        (None, Some(h), Some((vw, vh))) => SvgSize {
            width: h * vw / vh,
            height: h,
            source: SizeSource::Attributes,
        },
        (_, _, Some((vw, vh))) => SvgSize {
            width: vw,
            height: vh,
            source: SizeSource::ViewBox,
        },
        (w, h, None) => SvgSize {
            width: w.unwrap_or(DEFAULT_SVG_SIZE),
            height: h.unwrap_or(DEFAULT_SVG_SIZE),
            source: if w.is_some() || h.is_some() {
                SizeSource::Attributes
            } else {
                SizeSource::Default
            },
        },
    }
}

/// Render `markup` into a `width` x `height` raster
#[cfg(feature = "vector")]
pub fn rasterize(markup: &[u8], width: u32, height: u32) -> Result<Raster, EngineError> {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{Options, Tree};

    let tree = Tree::from_data(markup, &Options::default())
        .map_err(|e| EngineError::DecodeFailure(format!("SVG parse error: {}", e)))?;
    let mut pixmap = Pixmap::new(width.max(1), height.max(1)).ok_or_else(|| {
        EngineError::ResourceLimitExceeded {
            width,
            height,
            limit: "vector surface allocation".to_string(),
        }
    })?;

    let size = tree.size();
    let scale_x = pixmap.width() as f32 / size.width();
    let scale_y = pixmap.height() as f32 / size.height();
    resvg::render(&tree, Transform::from_scale(scale_x, scale_y), &mut pixmap.as_mut());

    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Raster::from_raw(pixmap.width(), pixmap.height(), rgba)
}

#[cfg(not(feature = "vector"))]
pub fn rasterize(_markup: &[u8], _width: u32, _height: u32) -> Result<Raster, EngineError> {
    Err(EngineError::DecodeFailure(
        "SVG support not compiled in".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_from_attributes() {
        let size = intrinsic_size(r#"<svg xmlns="http://www.w3.org/2000/svg" width="640px" height="480">"#);
        assert_eq!((size.width, size.height), (640.0, 480.0));
        assert_eq!(size.source, SizeSource::Attributes);
    }

    #[test]
    fn test_size_from_view_box() {
        let size = intrinsic_size(r#"<svg viewBox="0 0 300 200" stroke-width="2"><rect/></svg>"#);
        assert_eq!((size.width, size.height), (300.0, 200.0));
        assert_eq!(size.source, SizeSource::ViewBox);
    }

    #[test]
    fn test_percent_attributes_fall_back_to_view_box() {
        let size = intrinsic_size(r#"<svg width="100%" height="100%" viewBox="0,0,40,20">"#);
        assert_eq!((size.width, size.height), (40.0, 20.0));
    }

    #[test]
    fn test_single_attribute_uses_view_box_aspect() {
        let size = intrinsic_size(r#"<svg width="150" viewBox="0 0 300 200">"#);
        assert_eq!((size.width, size.height), (150.0, 100.0));
    }

    #[test]
    fn test_default_size() {
        let size = intrinsic_size("<svg><circle r='4'/></svg>");
        assert_eq!((size.width, size.height), (100.0, 100.0));
        assert_eq!(size.source, SizeSource::Default);
        assert_eq!(intrinsic_size("not svg").source, SizeSource::Default);
    }

    #[cfg(feature = "vector")]
    #[test]
    fn test_rasterize_scales_to_target() {
        let markup = br##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 30 20"><rect width="30" height="20" fill="#ff0000"/></svg>"##;
        let raster = rasterize(markup, 60, 40).unwrap();
        assert_eq!((raster.width(), raster.height()), (60, 40));
        assert_eq!(raster.pixel(30, 20), [255, 0, 0, 255]);
    }
}
