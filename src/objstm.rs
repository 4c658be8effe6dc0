//! Object streams (PDF 1.5+).
//!
//! Object streams (/Type /ObjStm) hold several non-stream objects in one
//! compressed stream. The reader unpacks them to resolve type-2
//! cross-reference entries; the writer packs configured object categories
//! into them.
//!
//! # Format
//!
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28     % pairs: object number, offset relative to /First
//! <dict> <dict> <dict>
//! endstream
//! endobj
//! ```

use crate::error::{Error, Result};
use crate::filters::{decode_stream, flate_encode};
use crate::object::{Dictionary, Object};
use crate::parser::parse_object;
use crate::writer::ObjectSerializer;
use std::collections::HashMap;

/// Parse an (already decrypted) object stream into its member objects.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        _ => return Err(Error::structural("object stream is not a Stream object")),
    };
    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "ObjStm" {
            return Err(Error::structural(format!("expected /Type /ObjStm, got /Type /{}", type_name)));
        }
    }

    let n = dict
        .get("N")
        .and_then(Object::as_integer)
        .filter(|n| (0..=1_000_000).contains(n))
        .ok_or_else(|| Error::structural("object stream has a missing or invalid /N"))? as usize;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .filter(|f| *f >= 0)
        .ok_or_else(|| Error::structural("object stream has a missing or invalid /First"))? as usize;

    let data = decode_stream(stream_obj)?;
    if data.len() < first {
        return Err(Error::structural(format!(
            "object stream data too short: {} bytes, /First is {}",
            data.len(),
            first
        )));
    }

    let header = String::from_utf8_lossy(&data[..first]);
    let numbers: Vec<usize> = header.split_whitespace().filter_map(|t| t.parse().ok()).collect();
    if numbers.len() < n * 2 {
        return Err(Error::structural(format!(
            "object stream header has {} integers, expected {}",
            numbers.len(),
            n * 2
        )));
    }

    let mut objects = HashMap::with_capacity(n);
    for pair in numbers[..n * 2].chunks(2) {
        let (obj_num, offset) = (pair[0] as u32, first + pair[1]);
        if offset >= data.len() {
            log::warn!("Object {} offset {} beyond object stream end", obj_num, offset);
            continue;
        }
        match parse_object(&data[offset..]) {
            Ok((_, obj)) => {
                objects.insert(obj_num, obj);
            },
            Err(e) => log::warn!("Failed to parse object {} in object stream: {:?}", obj_num, e),
        }
    }
    Ok(objects)
}

/// Accumulates serialized objects for one output object stream.
#[derive(Debug, Default)]
pub struct ObjectStreamBuilder {
    header: Vec<u8>,
    body: Vec<u8>,
    count: usize,
}

impl ObjectStreamBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object under its final number, returning its index.
    pub fn add(&mut self, number: u32, object: &Object) -> Result<u32> {
        if object.is_stream() {
            return Err(Error::structural(format!(
                "object {} is a stream and cannot be placed in an object stream",
                number
            )));
        }
        let index = self.count as u32;
        if !self.header.is_empty() {
            self.header.push(b' ');
        }
        self.header
            .extend_from_slice(format!("{} {}", number, self.body.len()).as_bytes());
        self.body.extend_from_slice(&ObjectSerializer::compact().serialize(object));
        self.body.push(b'\n');
        self.count += 1;
        Ok(index)
    }

    /// Number of objects added so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finish into a `/Type /ObjStm` stream object.
    pub fn build(self, compress: bool) -> Result<Object> {
        let mut data = self.header;
        data.push(b'\n');
        let first = data.len();
        data.extend_from_slice(&self.body);

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(self.count as i64));
        dict.insert("First".to_string(), Object::Integer(first as i64));
        let data = if compress {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            flate_encode(&data)?
        } else {
            data
        };
        Ok(Object::stream(dict, data))
    }
}
