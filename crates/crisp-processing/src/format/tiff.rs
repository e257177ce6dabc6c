//! Minimal TIFF directory reader.
//!
//! Used when the codec cannot decode a file. Walks the whole directory chain
//! (and SubIFDs) to find dimensions, and decodes 8-bit uncompressed or
//! PackBits strips. The pixel buffer is padded or truncated to exactly
//! `width * height * 4` bytes so damaged files still yield a raster.

use std::collections::HashSet;

use crisp_core::EngineError;

use crate::raster::{Raster, CHANNELS};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_SUB_IFDS: u16 = 330;

const COMPRESSION_NONE: u32 = 1;
const COMPRESSION_PACKBITS: u32 = 32773;

const MAX_DIRECTORIES: usize = 64;
const MAX_ENTRIES: u16 = 4096;
const MAX_VALUES: usize = 1 << 20;

/// Fill for pixels the file does not provide
const PAD_PIXEL: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, thiserror::Error)]
pub enum TiffError {
    #[error("not a TIFF stream")]
    BadHeader,

    #[error("directory at offset {0} is out of bounds")]
    OutOfBounds(usize),

    #[error("missing required tag: {0}")]
    MissingTag(&'static str),

    #[error("unsupported TIFF feature: {0}")]
    Unsupported(String),

    #[error("{width}x{height} exceeds pixel budget of {budget}")]
    TooLarge { width: u32, height: u32, budget: u64 },
}

impl From<TiffError> for EngineError {
    fn from(err: TiffError) -> Self {
        match err {
            TiffError::TooLarge {
                width,
                height,
                budget,
            } => EngineError::ResourceLimitExceeded {
                width,
                height,
                limit: format!("pixel budget of {}", budget),
            },
            other => EngineError::DecodeFailure(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

struct Reader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Result<(Self, usize), TiffError> {
        let order = match data.get(0..2) {
            Some(b"II") => ByteOrder::Little,
            Some(b"MM") => ByteOrder::Big,
            _ => return Err(TiffError::BadHeader),
        };
        let reader = Self { data, order };
        if reader.u16(2) != Some(42) {
            return Err(TiffError::BadHeader);
        }
        let first = reader.u32(4).ok_or(TiffError::BadHeader)? as usize;
        Ok((reader, first))
    }

    fn u16(&self, at: usize) -> Option<u16> {
        let b = self.data.get(at..at + 2)?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32(&self, at: usize) -> Option<u32> {
        let b = self.data.get(at..at + 4)?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    /// Position of the 4-byte value/offset field
    value_pos: usize,
}

#[derive(Debug, Default)]
struct Directory {
    entries: Vec<Entry>,
}

impl Directory {
    fn entry(&self, tag: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    fn values(&self, reader: &Reader<'_>, tag: u16) -> Option<Vec<u32>> {
        self.values_up_to(reader, tag, MAX_VALUES)
    }

    /// At most `limit` leading values of `tag`
    fn values_up_to(&self, reader: &Reader<'_>, tag: u16, limit: usize) -> Option<Vec<u32>> {
        let entry = self.entry(tag)?;
        let size = match entry.field_type {
            1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
            3 | 8 => 2,         // SHORT, SSHORT
            4 | 9 | 13 => 4,    // LONG, SLONG, IFD
            _ => return None,
        };
        let count = entry.count as usize;
        if count == 0 || count > MAX_VALUES {
            return None;
        }
        let start = if count * size <= 4 {
            entry.value_pos
        } else {
            reader.u32(entry.value_pos)? as usize
        };
        (0..count.min(limit))
            .map(|i| {
                let at = start + i * size;
                match size {
                    1 => reader.data.get(at).map(|b| *b as u32),
                    2 => reader.u16(at).map(u32::from),
                    _ => reader.u32(at),
                }
            })
            .collect()
    }

    fn value(&self, reader: &Reader<'_>, tag: u16) -> Option<u32> {
        self.values(reader, tag).and_then(|v| v.first().copied())
    }

    fn dimensions(&self, reader: &Reader<'_>) -> Option<(u32, u32)> {
        let width = self.value(reader, TAG_IMAGE_WIDTH)?;
        let height = self.value(reader, TAG_IMAGE_LENGTH)?;
        (width > 0 && height > 0).then_some((width, height))
    }
}

fn read_directory(reader: &Reader<'_>, offset: usize) -> Result<(Directory, usize), TiffError> {
    let count = reader.u16(offset).ok_or(TiffError::OutOfBounds(offset))?;
    if count > MAX_ENTRIES {
        return Err(TiffError::Unsupported(format!("{} directory entries", count)));
    }
    let mut directory = Directory::default();
    for i in 0..count as usize {
        let at = offset + 2 + i * 12;
        let (Some(tag), Some(field_type), Some(entry_count)) =
            (reader.u16(at), reader.u16(at + 2), reader.u32(at + 4))
        else {
            break;
        };
        directory.entries.push(Entry {
            tag,
            field_type,
            count: entry_count,
            value_pos: at + 8,
        });
    }
    let next = reader
        .u32(offset + 2 + count as usize * 12)
        .unwrap_or(0) as usize;
    Ok((directory, next))
}

struct Walk {
    found: Vec<Directory>,
    /// Directory offsets ever queued, the first one included
    queued: usize,
}

/// Every directory in the main chain, followed by SubIFDs
fn directories(reader: &Reader<'_>, first: usize) -> Vec<Directory> {
    walk_directories(reader, first).found
}

/// Queued SubIFD offsets count against the directory budget
fn walk_directories(reader: &Reader<'_>, first: usize) -> Walk {
    let mut visited = HashSet::new();
    let mut pending = vec![first];
    let mut found = Vec::new();
    let mut queued = 1;

    while let Some(offset) = pending.pop() {
        if found.len() >= MAX_DIRECTORIES {
            break;
        }
        let mut next = offset;
        while next != 0 && found.len() < MAX_DIRECTORIES && visited.insert(next) {
            match read_directory(reader, next) {
                Ok((directory, following)) => {
                    let budget = MAX_DIRECTORIES.saturating_sub(found.len() + 1 + pending.len());
                    if budget > 0 {
                        if let Some(sub) = directory.values_up_to(reader, TAG_SUB_IFDS, budget) {
                            queued += sub.len();
                            pending.extend(sub.into_iter().rev().map(|o| o as usize));
                        }
                    }
                    found.push(directory);
                    next = following;
                }
                Err(e) => {
                    tracing::debug!(offset = next, error = %e, "Stopping TIFF directory walk");
                    break;
                }
            }
        }
    }
    Walk { found, queued }
}

/// Width and height from the first directory that has both
pub fn probe_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let (reader, first) = Reader::new(data).ok()?;
    directories(&reader, first)
        .iter()
        .find_map(|d| d.dimensions(&reader))
}

/// Decode the first directory with usable dimensions into a raster
pub fn decode(data: &[u8], max_pixels: u64) -> Result<Raster, TiffError> {
    let (reader, first) = Reader::new(data)?;
    let dirs = directories(&reader, first);
    let directory = dirs
        .iter()
        .find(|d| d.dimensions(&reader).is_some())
        .ok_or(TiffError::MissingTag("ImageWidth/ImageLength"))?;
    let (width, height) = directory
        .dimensions(&reader)
        .ok_or(TiffError::MissingTag("ImageWidth/ImageLength"))?;

    if width as u64 * height as u64 > max_pixels {
        return Err(TiffError::TooLarge {
            width,
            height,
            budget: max_pixels,
        });
    }

    let samples = directory.value(&reader, TAG_SAMPLES_PER_PIXEL).unwrap_or(1);
    if !(1..=4).contains(&samples) {
        return Err(TiffError::Unsupported(format!("{} samples per pixel", samples)));
    }
    let bits = directory
        .values(&reader, TAG_BITS_PER_SAMPLE)
        .unwrap_or_else(|| vec![1]);
    if bits.iter().any(|b| *b != 8) {
        return Err(TiffError::Unsupported(format!("bit depth {:?}", bits)));
    }
    if directory.value(&reader, TAG_PLANAR_CONFIG).unwrap_or(1) != 1 {
        return Err(TiffError::Unsupported("planar configuration".to_string()));
    }
    let photometric = directory.value(&reader, TAG_PHOTOMETRIC).unwrap_or(1);
    if photometric > 2 {
        return Err(TiffError::Unsupported(format!(
            "photometric interpretation {}",
            photometric
        )));
    }
    let compression = directory.value(&reader, TAG_COMPRESSION).unwrap_or(COMPRESSION_NONE);
    if compression != COMPRESSION_NONE && compression != COMPRESSION_PACKBITS {
        return Err(TiffError::Unsupported(format!("compression {}", compression)));
    }

    let offsets = directory
        .values(&reader, TAG_STRIP_OFFSETS)
        .ok_or(TiffError::MissingTag("StripOffsets"))?;
    let counts = directory.values(&reader, TAG_STRIP_BYTE_COUNTS);

    let mut samples_data = Vec::new();
    for (i, offset) in offsets.iter().enumerate() {
        let start = *offset as usize;
        if start >= data.len() {
            continue;
        }
        let end = match counts.as_ref().and_then(|c| c.get(i)) {
            Some(count) => start.saturating_add(*count as usize).min(data.len()),
            None => data.len(),
        };
        let strip = &data[start..end];
        if compression == COMPRESSION_PACKBITS {
            unpack_bits(strip, &mut samples_data);
        } else {
            samples_data.extend_from_slice(strip);
        }
    }

    let rgba = to_rgba(&samples_data, width, height, samples as usize, photometric == 0);
    Raster::from_raw(width, height, rgba)
        .map_err(|e| TiffError::Unsupported(format!("pixel buffer: {}", e)))
}

/// Expand samples to RGBA, padding or truncating to exactly `width * height` pixels
fn to_rgba(samples: &[u8], width: u32, height: u32, spp: usize, white_is_zero: bool) -> Vec<u8> {
    let pixel_total = width as usize * height as usize;
    let mut out = Vec::with_capacity(pixel_total * CHANNELS);
    let gray = |v: u8| if white_is_zero { 255 - v } else { v };

    for px in samples.chunks_exact(spp).take(pixel_total) {
        let rgba = match spp {
            1 => [gray(px[0]), gray(px[0]), gray(px[0]), 255],
            2 => [gray(px[0]), gray(px[0]), gray(px[0]), px[1]],
            3 => [px[0], px[1], px[2], 255],
            _ => [px[0], px[1], px[2], px[3]],
        };
        out.extend_from_slice(&rgba);
    }

    let provided = out.len() / CHANNELS;
    if provided < pixel_total {
        tracing::debug!(provided, expected = pixel_total, "Padding short TIFF pixel data");
        for _ in provided..pixel_total {
            out.extend_from_slice(&PAD_PIXEL);
        }
    }
    out
}

/// PackBits run-length decoding
fn unpack_bits(input: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < input.len() {
        let header = input[i] as i8;
        i += 1;
        match header {
            0..=127 => {
                let len = header as usize + 1;
                let end = (i + len).min(input.len());
                out.extend_from_slice(&input[i..end]);
                i = end;
            }
            -127..=-1 => {
                if let Some(byte) = input.get(i) {
                    let run = (1 - header as isize) as usize;
                    out.extend(std::iter::repeat(*byte).take(run));
                }
                i += 1;
            }
            -128 => {}
        }
    }
}
