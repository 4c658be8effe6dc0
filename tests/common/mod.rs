//! Helpers shared by the integration tests.
#![allow(dead_code)]

use pdf_binder::{Object, ObjectRef, PdfReader, ReadOptions, Reader};
use std::collections::BTreeSet;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a classic-xref file with correct offsets from `(number, body)` pairs.
pub fn build_pdf(objects: &[(u32, &str)], trailer: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (n, body) in objects {
        offsets.push((*n, out.len()));
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", n, body).as_bytes());
    }
    let start = out.len();
    let size = objects.iter().map(|(n, _)| *n).max().unwrap_or(0) + 1;
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
    for n in 1..size {
        match offsets.iter().find(|(m, _)| *m == n) {
            Some((_, off)) => out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes()),
            None => out.extend_from_slice(b"0000000000 00000 f \n"),
        }
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n", size, trailer, start).as_bytes(),
    );
    out
}

fn stream(content: &str) -> String {
    stream_with("", content)
}

/// A stream object whose dictionary carries `entries` besides `/Length`.
fn stream_with(entries: &str, content: &str) -> String {
    format!("<< {} /Length {} >>\nstream\n{}\nendstream", entries, content.len(), content)
}

/// Three pages sharing one `/Resources` dictionary with a Courier font.
pub fn three_page_source() -> Vec<u8> {
    let contents: Vec<String> = ["one", "two", "three"]
        .iter()
        .map(|word| stream(&format!("BT /F1 12 Tf ({}) Tj ET", word)))
        .collect();
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R 4 0 R 5 0 R] /Count 3 /MediaBox [0 0 612 792] >>"),
            (3, "<< /Type /Page /Parent 2 0 R /Resources 6 0 R /Contents 7 0 R >>"),
            (4, "<< /Type /Page /Parent 2 0 R /Resources 6 0 R /Contents 8 0 R >>"),
            (5, "<< /Type /Page /Parent 2 0 R /Resources 6 0 R /Contents 9 0 R >>"),
            (6, "<< /Font << /F1 10 0 R >> >>"),
            (7, &contents[0]),
            (8, &contents[1]),
            (9, &contents[2]),
            (10, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>"),
            (11, "<< /Title (Source) /Author (Tests) >>"),
        ],
        "/Root 1 0 R /Info 11 0 R",
    )
}

/// A one-page source whose page carries a text-field widget named `name`.
pub fn form_source(name: &str) -> Vec<u8> {
    let field = format!(
        "<< /FT /Tx /T ({}) /Kids [5 0 R] /V (value) >>",
        name
    );
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [4 0 R] /NeedAppearances true >> >>"),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>"),
            (3, "<< /Type /Page /Parent 2 0 R /Annots [5 0 R] >>"),
            (4, &field),
            (5, "<< /Type /Annot /Subtype /Widget /Parent 4 0 R /P 3 0 R /Rect [10 10 200 40] >>"),
        ],
        "/Root 1 0 R",
    )
}

/// Two pages; the first draws a form XObject whose `/Resources` is the
/// page's own, and links to the second page.
pub fn cyclic_source() -> Vec<u8> {
    let form = stream_with(
        "/Type /XObject /Subtype /Form /BBox [0 0 10 10] /Resources 5 0 R",
        "0 0 10 10 re f",
    );
    let contents = stream("/X1 Do");
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] >>"),
            (3, "<< /Type /Page /Parent 2 0 R /Resources 5 0 R /Contents 6 0 R /Annots [8 0 R] >>"),
            (4, "<< /Type /Page /Parent 2 0 R >>"),
            (5, "<< /XObject << /X1 7 0 R >> >>"),
            (6, &contents),
            (7, &form),
            (8, "<< /Type /Annot /Subtype /Link /Rect [0 0 50 50] /Dest [4 0 R /Fit] >>"),
        ],
        "/Root 1 0 R",
    )
}

/// One page whose font points at an object the file does not have.
pub fn dangling_font_source() -> Vec<u8> {
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>"),
            (3, "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 40 0 R >> >> >>"),
        ],
        "/Root 1 0 R",
    )
}

/// First and second component of the `/ID` carried by [`identified_source`].
pub const SOURCE_ID: ([u8; 16], [u8; 16]) = (
    [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
    [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00],
);

/// A one-page source whose trailer carries [`SOURCE_ID`].
pub fn identified_source() -> Vec<u8> {
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>"),
            (3, "<< /Type /Page /Parent 2 0 R >>"),
        ],
        "/Root 1 0 R /ID [<00112233445566778899AABBCCDDEEFF> <FFEEDDCCBBAA99887766554433221100>]",
    )
}

/// A source of `count` blank pages.
pub fn blank_source(count: usize) -> Vec<u8> {
    let mut bodies: Vec<(u32, String)> = vec![(1, "<< /Type /Catalog /Pages 2 0 R >>".to_string())];
    let kids: Vec<String> = (0..count).map(|i| format!("{} 0 R", i + 3)).collect();
    bodies.push((
        2,
        format!("<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 300 300] >>", kids.join(" "), count),
    ));
    for i in 0..count {
        bodies.push((i as u32 + 3, "<< /Type /Page /Parent 2 0 R >>".to_string()));
    }
    let refs: Vec<(u32, &str)> = bodies.iter().map(|(n, b)| (*n, b.as_str())).collect();
    build_pdf(&refs, "/Root 1 0 R")
}

pub fn open(bytes: Vec<u8>) -> PdfReader {
    PdfReader::from_bytes(bytes, &ReadOptions::default()).unwrap()
}

/// Every live object of a parsed file.
pub fn live_objects(reader: &PdfReader) -> Vec<(u32, Object)> {
    let numbers: Vec<u32> = reader.xref().live_numbers().collect();
    numbers
        .into_iter()
        .map(|n| (n, reader.derefer_object(n).unwrap()))
        .collect()
}

/// Every reference found in the live objects and the trailer.
pub fn all_references(reader: &PdfReader) -> BTreeSet<ObjectRef> {
    let mut refs: BTreeSet<ObjectRef> = live_objects(reader)
        .iter()
        .flat_map(|(_, obj)| obj.references())
        .collect();
    for value in reader.xref().trailer().values() {
        refs.extend(value.references());
    }
    refs
}

/// Whether the bytes end with a classic `xref` table.
pub fn has_classic_table(bytes: &[u8]) -> bool {
    bytes.windows(6).any(|w| w == b"\nxref\n") && bytes.windows(7).any(|w| w == b"trailer")
}

/// Whether the file carries a cross-reference stream.
pub fn has_xref_stream(bytes: &[u8]) -> bool {
    bytes.windows(10).any(|w| w == b"/Type/XRef") || bytes.windows(11).any(|w| w == b"/Type /XRef")
}

/// `/W` of the cross-reference stream object, read from the object itself.
pub fn xref_stream_widths(reader: &PdfReader) -> Object {
    live_objects(reader)
        .into_iter()
        .find(|(_, obj)| obj.dict_type() == Some("XRef"))
        .and_then(|(_, obj)| obj.get("W").cloned())
        .unwrap()
}
