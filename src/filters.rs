//! Stream filters needed by the reader and writer.
//!
//! Only FlateDecode is handled here: the writer compresses new content,
//! object streams and cross-reference streams with it, and the reader needs
//! it to open object streams and cross-reference streams of source files.
//! Stream data that is merely copied between documents is never decoded.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Compress data with zlib at the default level.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress zlib data, falling back to raw deflate and partial output.
pub fn flate_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    match ZlibDecoder::new(input).read_to_end(&mut output) {
        Ok(_) => Ok(output),
        Err(e) if !output.is_empty() => {
            log::warn!(
                "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                output.len(),
                e
            );
            Ok(output)
        },
        Err(e) => {
            log::info!("Zlib decode failed ({}), trying raw deflate", e);
            output.clear();
            match DeflateDecoder::new(input).read_to_end(&mut output) {
                Ok(_) => Ok(output),
                Err(_) if !output.is_empty() => Ok(output),
                Err(e) => Err(Error::Decode(format!("FlateDecode failed: {}", e))),
            }
        },
    }
}

/// Predictor parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` dictionary, keeping defaults
    /// for missing entries.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let get = |key: &str, default: i64| dict.get(key).and_then(Object::as_integer).unwrap_or(default);
        Self {
            predictor: get("Predictor", 1),
            columns: get("Columns", 1).max(1) as usize,
            colors: get("Colors", 1).max(1) as usize,
            bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
        }
    }

    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reverse a TIFF or PNG predictor.
pub fn undo_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => {
            let mut out = data.to_vec();
            for row in out.chunks_mut(row_len) {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            Ok(out)
        },
        10..=15 => {
            let stride = row_len + 1;
            let mut out = Vec::with_capacity(data.len() / stride * row_len);
            let mut prior = vec![0u8; row_len];
            for chunk in data.chunks(stride) {
                if chunk.len() < 2 {
                    break;
                }
                let tag = chunk[0];
                let mut row = chunk[1..].to_vec();
                row.resize(row_len, 0);
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up = prior[i];
                    let up_left = if i >= bpp { prior[i - bpp] } else { 0 };
                    row[i] = match tag {
                        0 => row[i],
                        1 => row[i].wrapping_add(left),
                        2 => row[i].wrapping_add(up),
                        3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                        4 => row[i].wrapping_add(paeth(left, up, up_left)),
                        _ => return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", tag))),
                    };
                }
                out.extend_from_slice(&row);
                prior = row;
            }
            Ok(out)
        },
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// Decode the payload of a stream whose filter chain is empty or
/// FlateDecode, applying any predictor.
pub fn decode_stream(obj: &Object) -> Result<Vec<u8>> {
    let (dict, data) = match obj {
        Object::Stream { dict, data } => (dict, data),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    let filters: Vec<&str> = match dict.get("Filter") {
        None => Vec::new(),
        Some(Object::Name(n)) => vec![n.as_str()],
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_name).collect(),
        Some(other) => return Err(Error::Decode(format!("Bad /Filter: {}", other.type_name()))),
    };
    let parms: Vec<Option<&Dictionary>> = match dict.get("DecodeParms") {
        Some(Object::Dictionary(d)) => vec![Some(d)],
        Some(Object::Array(items)) => items.iter().map(Object::as_dict).collect(),
        _ => Vec::new(),
    };

    let mut out = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        match *filter {
            "FlateDecode" | "Fl" => {
                out = flate_decode(&out)?;
                if let Some(Some(p)) = parms.get(i) {
                    out = undo_predictor(&out, &DecodeParams::from_dict(p))?;
                }
            },
            other => return Err(Error::Decode(format!("Unsupported filter: {}", other))),
        }
    }
    Ok(out)
}
