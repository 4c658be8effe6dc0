//! Cross-reference data.
//!
//! [`XrefEntry`] is shared by both directions: the reader fills a
//! [`CrossRefTable`] from a source file, and the writer builds a dense list
//! of entries for the file it emits.
//!
//! Supports both traditional xref tables (PDF 1.0-1.4) and cross-reference
//! streams (PDF 1.5+), including `/Prev` chains and hybrid `/XRefStm` files.
//! When the chain is unusable the table is rebuilt by scanning the file for
//! `N G obj` markers.

use crate::error::{Error, Result};
use crate::filters::decode_stream;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::{parse_indirect_object, parse_object, skip_ws};
use byteorder::{BigEndian, ByteOrder};
use std::collections::{BTreeMap, HashSet};

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Free entry (type 0), linking to the next free object number
    Free {
        /// Next free object number
        next: u32,
        /// Generation to use if the number is reused
        gen: u16,
    },
    /// Object stored at a byte offset (type 1)
    InFile {
        /// Byte offset of `N G obj`
        offset: u64,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream (type 2)
    InStream {
        /// Object number of the containing object stream
        stream: u32,
        /// Index within the object stream
        index: u32,
    },
}

impl XrefEntry {
    /// The free-list head entry for object 0.
    pub fn free_head() -> Self {
        XrefEntry::Free { next: 0, gen: 65535 }
    }

    /// Whether this entry describes a live object.
    pub fn in_use(&self) -> bool {
        !matches!(self, XrefEntry::Free { .. })
    }

    /// The (type, field 2, field 3) triple used by cross-reference streams.
    pub fn stream_fields(&self) -> (u8, u64, u64) {
        match *self {
            XrefEntry::Free { next, gen } => (0, next as u64, gen as u64),
            XrefEntry::InFile { offset, gen } => (1, offset, gen as u64),
            XrefEntry::InStream { stream, index } => (2, stream as u64, index as u64),
        }
    }
}

/// Parsed cross-reference information of a source file.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XrefEntry>,
    trailer: Dictionary,
    reconstructed: bool,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry unless a newer section already defined this number.
    pub fn add_entry(&mut self, number: u32, entry: XrefEntry) {
        self.entries.entry(number).or_insert(entry);
    }

    /// Look up an entry.
    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    /// Whether the number has an entry.
    pub fn contains(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    /// The merged trailer dictionary (newest section wins).
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Numbers of all live objects.
    pub fn live_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().filter(|(_, e)| e.in_use()).map(|(n, _)| *n)
    }

    /// Largest object number present.
    pub fn max_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the table was rebuilt by scanning.
    pub fn is_reconstructed(&self) -> bool {
        self.reconstructed
    }

    fn merge_trailer(&mut self, trailer: &Dictionary) {
        for (k, v) in trailer {
            if k != "Prev" && k != "XRefStm" {
                self.trailer.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
}

fn parse_err(offset: usize, reason: impl Into<String>) -> Error {
    Error::ParseError {
        offset,
        reason: reason.into(),
    }
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let window_start = data.len().saturating_sub(2048);
    let tail = &data[window_start..];
    let pos = tail
        .windows(9)
        .rposition(|w| w == b"startxref")
        .ok_or(Error::InvalidXref)?;
    let after = &tail[pos + 9..];
    let digits: Vec<u8> = after
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .collect();
    std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidXref)
}

/// Load the cross-reference chain starting at `start`.
pub fn load_xref(data: &[u8], start: u64) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut visited = HashSet::new();
    let mut next = Some(start);

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            log::warn!("Cross-reference /Prev loop at offset {}", offset);
            break;
        }
        let offset_usize = usize::try_from(offset).map_err(|_| Error::InvalidXref)?;
        if offset_usize >= data.len() {
            return Err(parse_err(offset_usize, "cross-reference offset beyond end of file"));
        }
        let section = &data[offset_usize..];
        let trailer = if section.starts_with(b"xref") {
            let trailer = parse_classic_section(data, offset_usize, &mut table)?;
            // Hybrid files keep compressed entries in a side stream.
            if let Some(stm) = trailer.get("XRefStm").and_then(Object::as_integer) {
                if visited.insert(stm as u64) {
                    parse_stream_section(data, stm as usize, &mut table)?;
                }
            }
            trailer
        } else {
            parse_stream_section(data, offset_usize, &mut table)?
        };
        table.merge_trailer(&trailer);
        next = trailer
            .get("Prev")
            .and_then(Object::as_integer)
            .and_then(|p| u64::try_from(p).ok());
    }

    log::debug!("Loaded cross-reference table with {} entries", table.len());
    Ok(table)
}

/// Return the line starting at `pos` (without EOL) and the position of the
/// following line.
fn line_at(data: &[u8], pos: usize) -> (usize, &[u8]) {
    let mut end = pos;
    while end < data.len() && data[end] != b'\n' && data[end] != b'\r' {
        end += 1;
    }
    let mut next = end;
    while next < data.len() && (data[next] == b'\n' || data[next] == b'\r') {
        next += 1;
    }
    (next, &data[pos..end])
}

fn parse_classic_section(data: &[u8], offset: usize, table: &mut CrossRefTable) -> Result<Dictionary> {
    // Skip the remainder of the "xref" line.
    let mut pos = line_at(data, offset + 4).0;

    loop {
        let (next_pos, line) = line_at(data, pos);
        let line_str = String::from_utf8_lossy(line);
        let trimmed = line_str.trim();
        if trimmed.starts_with("trailer") {
            let after = pos + line_str.find("trailer").unwrap_or(0) + 7;
            let (_, trailer) = parse_object(&data[after..])
                .map_err(|_| parse_err(after, "unreadable trailer dictionary"))?;
            return match trailer {
                Object::Dictionary(d) => Ok(d),
                other => Err(parse_err(after, format!("trailer is {}", other.type_name()))),
            };
        }
        if trimmed.is_empty() {
            if next_pos >= data.len() {
                return Err(parse_err(pos, "missing trailer"));
            }
            pos = next_pos;
            continue;
        }

        let mut header = trimmed.split_whitespace();
        let first: u32 = header
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| parse_err(pos, format!("bad subsection header '{}'", trimmed)))?;
        let count: u32 = header
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| parse_err(pos, format!("bad subsection header '{}'", trimmed)))?;
        pos = next_pos;

        for i in 0..count {
            let (after, line) = line_at(data, pos);
            let line = String::from_utf8_lossy(line);
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return Err(parse_err(pos, format!("malformed xref entry '{}'", line.trim())));
            }
            let field1: u64 = fields[0].parse().map_err(|_| parse_err(pos, "bad xref offset"))?;
            let gen: u16 = fields[1].parse().map_err(|_| parse_err(pos, "bad xref generation"))?;
            let entry = match fields[2] {
                "n" => XrefEntry::InFile { offset: field1, gen },
                "f" => XrefEntry::Free {
                    next: field1 as u32,
                    gen,
                },
                other => return Err(parse_err(pos, format!("bad xref entry flag '{}'", other))),
            };
            table.add_entry(first + i, entry);
            pos = after;
        }
    }
}

fn parse_stream_section(data: &[u8], offset: usize, table: &mut CrossRefTable) -> Result<Dictionary> {
    let no_length = |_: ObjectRef| None::<usize>;
    let (_, (_, stream)) = parse_indirect_object(&data[offset..], &no_length)
        .map_err(|_| parse_err(offset, "unreadable cross-reference stream"))?;
    let dict = stream
        .as_dict()
        .cloned()
        .ok_or_else(|| parse_err(offset, "cross-reference stream is not a stream"))?;
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(parse_err(offset, "expected /Type /XRef"));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|v| v as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(parse_err(offset, "bad /W in cross-reference stream"));
    }
    let size = dict.get("Size").and_then(Object::as_integer).unwrap_or(0);
    let index: Vec<i64> = dict
        .get("Index")
        .and_then(Object::as_array)
        .map(|a| a.iter().filter_map(Object::as_integer).collect())
        .unwrap_or_else(|| vec![0, size]);

    let payload = decode_stream(&stream)?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(parse_err(offset, "zero-width cross-reference rows"));
    }
    let read_field = |row: &[u8], start: usize, width: usize, default: u64| -> u64 {
        if width == 0 {
            default
        } else {
            BigEndian::read_uint(&row[start..start + width], width)
        }
    };

    let mut trailer = dict.clone();
    for key in ["Type", "W", "Index", "Filter", "DecodeParms", "Length"] {
        trailer.remove(key);
    }

    let mut rows = payload.chunks_exact(row_len);
    for pair in index.chunks(2) {
        let [first, count] = [pair[0], *pair.get(1).unwrap_or(&0)];
        for n in 0..count {
            let Some(row) = rows.next() else {
                log::warn!("Cross-reference stream shorter than its /Index");
                return Ok(trailer);
            };
            let kind = read_field(row, 0, widths[0], 1);
            let f2 = read_field(row, widths[0], widths[1], 0);
            let f3 = read_field(row, widths[0] + widths[1], widths[2], 0);
            let entry = match kind {
                0 => XrefEntry::Free {
                    next: f2 as u32,
                    gen: f3 as u16,
                },
                1 => XrefEntry::InFile {
                    offset: f2,
                    gen: f3 as u16,
                },
                2 => XrefEntry::InStream {
                    stream: f2 as u32,
                    index: f3 as u32,
                },
                _ => continue,
            };
            table.add_entry((first + n) as u32, entry);
        }
    }
    Ok(trailer)
}

/// Rebuild a cross-reference table by scanning for `N G obj` markers.
///
/// The last definition of a number wins. The trailer is taken from the last
/// `trailer` dictionary in the file, or synthesised from the first catalog
/// found.
pub fn reconstruct(data: &[u8]) -> Result<CrossRefTable> {
    log::warn!("Reconstructing cross-reference table by scanning {} bytes", data.len());
    let mut found: BTreeMap<u32, XrefEntry> = BTreeMap::new();
    let mut catalog = None;
    let mut i = 0;
    while i < data.len() {
        let at_line_start = i == 0 || matches!(data[i - 1], b'\n' | b'\r' | b' ');
        if at_line_start && data[i].is_ascii_digit() {
            if let Some((id, gen, end)) = object_header_at(data, i) {
                found.insert(id, XrefEntry::InFile { offset: i as u64, gen });
                if catalog.is_none() {
                    let window = &data[end..data.len().min(end + 256)];
                    if window.windows(8).any(|w| w == b"/Catalog") {
                        catalog = Some((id, gen));
                    }
                }
                i = end;
                continue;
            }
        }
        i += 1;
    }

    let mut trailer = Dictionary::new();
    if let Some(pos) = data.windows(7).rposition(|w| w == b"trailer") {
        if let Ok((_, Object::Dictionary(d))) = parse_object(&data[pos + 7..]) {
            trailer = d;
        }
    }
    if !trailer.contains_key("Root") {
        let (id, gen) = catalog.ok_or(Error::InvalidXref)?;
        trailer.insert("Root".to_string(), Object::Reference(ObjectRef::new(id, gen)));
    }
    trailer.remove("Prev");

    let mut table = CrossRefTable::new();
    table.add_entry(0, XrefEntry::free_head());
    for (n, e) in found {
        table.add_entry(n, e);
    }
    table.trailer = trailer;
    table.reconstructed = true;
    Ok(table)
}

fn object_header_at(data: &[u8], pos: usize) -> Option<(u32, u16, usize)> {
    let input = &data[pos..];
    let (rest, id) = nom::character::complete::digit1::<_, nom::error::Error<&[u8]>>(input).ok()?;
    let (rest, _) = skip_ws(rest).ok()?;
    let (rest, gen) = nom::character::complete::digit1::<_, nom::error::Error<&[u8]>>(rest).ok()?;
    let (rest, _) = skip_ws(rest).ok()?;
    let rest = rest.strip_prefix(b"obj")?;
    let id = std::str::from_utf8(id).ok()?.parse().ok()?;
    let gen = std::str::from_utf8(gen).ok()?.parse().ok()?;
    Some((id, gen, data.len() - rest.len()))
}
