//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! ISO 32000-1:2008, section 7.3. Stream `/Length` entries are always
//! recomputed from the bytes actually written.

use crate::encryption::ObjectCipher;
use crate::error::Result;
use crate::object::{Dictionary, Object};
use bytes::Bytes;
use std::io::Write;

/// Serializer for PDF objects.
///
/// Converts PDF Object types to their byte representation following
/// PDF syntax rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize an indirect object definition, encrypting its strings and
    /// stream data when a cipher is given.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(
        &self,
        id: u32,
        gen: u16,
        obj: &Object,
        cipher: Option<&ObjectCipher>,
    ) -> Result<Vec<u8>> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        match cipher {
            Some(cipher) => {
                let encrypted = encrypt_object(obj, cipher, id, gen)?;
                self.write_object(&mut buf, &encrypted);
            },
            None => self.write_object(&mut buf, obj),
        }
        buf.extend_from_slice(b"\nendobj\n");
        Ok(buf)
    }

    /// Write an object to a buffer.
    fn write_object(&self, w: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { &b"true"[..] } else { &b"false"[..] }),
            Object::Integer(i) => w.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => {
                let _ = write!(w, "{} {} R", r.id, r.gen);
            },
        }
    }

    /// Write a real number with appropriate precision.
    fn write_real(&self, w: &mut Vec<u8>, value: f64) {
        if !value.is_finite() {
            w.push(b'0');
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            w.extend_from_slice((value as i64).to_string().as_bytes());
        } else {
            // Five decimals, trailing zeros trimmed
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            w.extend_from_slice(trimmed.as_bytes());
        }
    }

    /// Write a PDF string.
    ///
    /// Uses literal string syntax `(...)` with proper escaping,
    /// or hex string syntax `<...>` for binary data.
    fn write_string(&self, w: &mut Vec<u8>, data: &[u8]) {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            w.push(b'(');
            for &byte in data {
                match byte {
                    b'(' => w.extend_from_slice(b"\\("),
                    b')' => w.extend_from_slice(b"\\)"),
                    b'\\' => w.extend_from_slice(b"\\\\"),
                    b'\n' => w.extend_from_slice(b"\\n"),
                    b'\r' => w.extend_from_slice(b"\\r"),
                    b'\t' => w.extend_from_slice(b"\\t"),
                    _ => w.push(byte),
                }
            }
            w.push(b')');
        } else {
            w.push(b'<');
            for byte in data {
                let _ = write!(w, "{:02X}", byte);
            }
            w.push(b'>');
        }
    }

    /// Write a PDF name.
    ///
    /// Names start with `/` and escape special characters with `#xx`.
    fn write_name(&self, w: &mut Vec<u8>, name: &str) {
        w.push(b'/');
        for byte in name.bytes() {
            match byte {
                b'!'
                | b'"'
                | b'$'
                | b'&'
                | b'\''
                | b'*'..=b'.'
                | b'0'..=b'9'
                | b';'
                | b'='
                | b'?'
                | b'@'
                | b'A'..=b'Z'
                | b'^'..=b'z'
                | b'|'
                | b'~' => w.push(byte),
                _ => {
                    let _ = write!(w, "#{:02X}", byte);
                },
            }
        }
    }

    /// Write a PDF array.
    fn write_array(&self, w: &mut Vec<u8>, arr: &[Object]) {
        w.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                w.push(b' ');
            }
            self.write_object(w, obj);
        }
        w.push(b']');
    }

    /// Write a PDF dictionary.
    fn write_dictionary(&self, w: &mut Vec<u8>, dict: &Dictionary) {
        w.extend_from_slice(b"<<");

        // Sort keys for deterministic output
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(value) = dict.get(key) {
                if !self.compact {
                    w.extend_from_slice(b"\n  ");
                }
                self.write_name(w, key);
                w.push(b' ');
                self.write_object(w, value);
            }
        }

        if !self.compact && !dict.is_empty() {
            w.push(b'\n');
        }
        w.extend_from_slice(b">>");
    }

    /// Write a PDF stream with a `/Length` matching `data`.
    fn write_stream(&self, w: &mut Vec<u8>, dict: &Dictionary, data: &[u8]) {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length);
        w.extend_from_slice(b"\nstream\n");
        w.extend_from_slice(data);
        w.extend_from_slice(b"\nendstream");
    }
}

/// Copy of `obj` with its strings and stream data encrypted for object
/// `id gen`. Metadata streams stay plain when the cipher leaves metadata
/// unencrypted.
fn encrypt_object(obj: &Object, cipher: &ObjectCipher, id: u32, gen: u16) -> Result<Object> {
    Ok(match obj {
        Object::String(s) => Object::String(cipher.encrypt_string(s, id, gen)?),
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| encrypt_object(item, cipher, id, gen))
                .collect::<Result<_>>()?,
        ),
        Object::Dictionary(dict) => Object::Dictionary(encrypt_dict(dict, cipher, id, gen)?),
        Object::Stream { dict, data } => {
            let is_metadata = dict.get("Type").and_then(Object::as_name) == Some("Metadata");
            let data = if is_metadata && !cipher.encrypts_metadata() {
                data.clone()
            } else {
                Bytes::from(cipher.encrypt_stream(data, id, gen)?)
            };
            Object::Stream {
                dict: encrypt_dict(dict, cipher, id, gen)?,
                data,
            }
        },
        other => other.clone(),
    })
}

fn encrypt_dict(dict: &Dictionary, cipher: &ObjectCipher, id: u32, gen: u16) -> Result<Dictionary> {
    dict.iter()
        .map(|(k, v)| Ok((k.clone(), encrypt_object(v, cipher, id, gen)?)))
        .collect()
}
