#![allow(dead_code)]

use std::io::Cursor;

use bytes::Bytes;
use crisp_core::models::{ImageAsset, OutputFormat, OutputOptions, ProcessingConfig};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

pub fn encode(img: DynamicImage, format: ImageFormat) -> Bytes {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    Bytes::from(buf)
}

pub fn jpeg_asset(name: &str, width: u32, height: u32) -> ImageAsset {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    ImageAsset::new(name, "image/jpeg", encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg))
}

pub fn png_asset(name: &str, img: RgbaImage) -> ImageAsset {
    ImageAsset::new(name, "image/png", encode(DynamicImage::ImageRgba8(img), ImageFormat::Png))
}

pub fn solid_png(name: &str, width: u32, height: u32, rgba: [u8; 4]) -> ImageAsset {
    png_asset(name, RgbaImage::from_pixel(width, height, Rgba(rgba)))
}

pub fn svg_asset(name: &str, markup: &str) -> ImageAsset {
    ImageAsset::new(name, "image/svg+xml", Bytes::copy_from_slice(markup.as_bytes()))
}

/// Little-endian TIFF whose single strip points past the end of the file
pub fn truncated_tiff(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());

    let entries: [(u16, u16, u32); 8] = [
        (256, 4, width),
        (257, 4, height),
        (258, 3, 8),
        (259, 3, 1),
        (262, 3, 1),
        (273, 4, 1_000_000),
        (277, 3, 1),
        (279, 4, width * height),
    ];
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, field_type, value) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&field_type.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

pub fn config_with_formats(formats: Vec<OutputFormat>) -> ProcessingConfig {
    ProcessingConfig {
        output: OutputOptions {
            formats,
            rename: false,
            pattern: None,
        },
        ..ProcessingConfig::default()
    }
}

pub fn decode_result(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes)
        .expect("decode result")
        .to_rgba8()
}
