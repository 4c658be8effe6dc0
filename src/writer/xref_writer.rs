//! Cross-reference emitters.
//!
//! Both forms describe the same dense entry list: a classic table for
//! PDF 1.4 and earlier, a compressed cross-reference stream from PDF 1.5.

use crate::error::Result;
use crate::filters::flate_encode;
use crate::object::{Dictionary, Object};
use crate::xref::XrefEntry;
use byteorder::{BigEndian, WriteBytesExt};

/// Smallest of 1, 2, 4 and 8 bytes that can hold `max`.
pub fn field_width(max: u64) -> u8 {
    match max {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFFFF_FFFF => 4,
        _ => 8,
    }
}

/// `xref` keyword, subsection header and one 20-byte record per entry.
pub fn classic_table(entries: &[XrefEntry]) -> Vec<u8> {
    let mut out = format!("xref\n0 {}\n", entries.len()).into_bytes();
    out.reserve(entries.len() * 20);
    for entry in entries {
        let record = match *entry {
            XrefEntry::Free { next, gen } => format!("{:010} {:05} f \n", next, gen),
            XrefEntry::InFile { offset, gen } => format!("{:010} {:05} n \n", offset, gen),
            // Classic tables cannot point into object streams.
            XrefEntry::InStream { .. } => format!("{:010} {:05} f \n", 0, 0),
        };
        out.extend_from_slice(record.as_bytes());
    }
    out
}

/// Build the cross-reference stream object from the trailer entries.
///
/// Rows are `[type, field2, field3]` with widths `[1, w, 2]`, where `w` is
/// chosen from the largest second field. Returns the stream and `w`.
pub fn xref_stream(entries: &[XrefEntry], trailer: &Dictionary) -> Result<(Object, u8)> {
    let max = entries.iter().map(|e| e.stream_fields().1).max().unwrap_or(0);
    let width = field_width(max);
    log::debug!("Cross-reference stream: {} rows, field width {}", entries.len(), width);

    let mut rows = Vec::with_capacity(entries.len() * (3 + width as usize));
    for entry in entries {
        let (kind, field2, field3) = entry.stream_fields();
        rows.write_u8(kind)?;
        rows.write_uint::<BigEndian>(field2, width as usize)?;
        rows.write_u16::<BigEndian>(field3.min(u16::MAX as u64) as u16)?;
    }

    let mut dict = trailer.clone();
    dict.insert("Type".to_string(), Object::name("XRef"));
    dict.insert(
        "W".to_string(),
        Object::Array(vec![
            Object::Integer(1),
            Object::Integer(width as i64),
            Object::Integer(2),
        ]),
    );
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    Ok((Object::stream(dict, flate_encode(&rows)?), width))
}
