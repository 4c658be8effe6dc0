//! Byte sink for one written document.

use super::object_serializer::ObjectSerializer;
use super::xref_writer;
use crate::config::PdfVersion;
use crate::encryption::ObjectCipher;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::xref::XrefEntry;
use std::io::Write;

/// Destination of a write session.
///
/// Counts every byte it passes on so the pipeline can record object
/// offsets, and holds the cipher while the document being written is
/// encrypted. An output is attached to at most one document at a time.
pub struct PdfOutput<W: Write> {
    inner: W,
    written: u64,
    owner: Option<u64>,
    cipher: Option<ObjectCipher>,
    serializer: ObjectSerializer,
}

impl<W: Write> std::fmt::Debug for PdfOutput<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfOutput")
            .field("written", &self.written)
            .field("owner", &self.owner)
            .field("encrypting", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

impl<W: Write> PdfOutput<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            owner: None,
            cipher: None,
            serializer: ObjectSerializer::new(),
        }
    }

    /// Claim the output for a document.
    pub fn attach(&mut self, document: u64) -> Result<()> {
        match self.owner {
            Some(owner) if owner != document => Err(Error::usage(format!(
                "output is already attached to document {}",
                owner
            ))),
            _ => {
                self.owner = Some(document);
                Ok(())
            },
        }
    }

    /// Release the output and drop any cipher.
    pub fn detach(&mut self) {
        self.owner = None;
        self.cipher = None;
    }

    /// Document currently attached.
    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    /// Install or remove the cipher used for subsequent objects.
    pub fn set_cipher(&mut self, cipher: Option<ObjectCipher>) {
        self.cipher = cipher;
    }

    /// Whether objects are currently encrypted.
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    /// Bytes passed to the writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<u64> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(bytes.len() as u64)
    }

    /// Write `%PDF-x.y` and a binary comment line.
    pub fn write_header(&mut self, version: PdfVersion) -> Result<u64> {
        let mut header = format!("%PDF-{}\n", version).into_bytes();
        header.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        self.emit(&header)
    }

    /// Write `number 0 obj ... endobj`, encrypted unless `plain` is set or
    /// no cipher is installed. Returns the number of bytes written.
    pub fn write_indirect_object(&mut self, number: u32, obj: &Object, plain: bool) -> Result<u64> {
        let cipher = if plain { None } else { self.cipher.as_ref() };
        let bytes = self.serializer.serialize_indirect(number, 0, obj, cipher)?;
        self.emit(&bytes)
    }

    /// Write a classic cross-reference table, the trailer and the file end.
    pub fn write_xref_table(
        &mut self,
        entries: &[XrefEntry],
        trailer: &Dictionary,
        start_offset: u64,
    ) -> Result<u64> {
        let mut bytes = xref_writer::classic_table(entries);
        bytes.extend_from_slice(b"trailer\n");
        bytes.extend_from_slice(&self.serializer.serialize(&Object::Dictionary(trailer.clone())));
        bytes.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", start_offset).as_bytes());
        let n = self.emit(&bytes)?;
        self.inner.flush()?;
        Ok(n)
    }

    /// Write a cross-reference stream object and the file end. The stream
    /// is never encrypted.
    pub fn write_cross_ref_stream(&mut self, number: u32, stream: &Object, start_offset: u64) -> Result<u64> {
        let mut n = self.write_indirect_object(number, stream, true)?;
        n += self.emit(format!("startxref\n{}\n%%EOF\n", start_offset).as_bytes())?;
        self.inner.flush()?;
        Ok(n)
    }

    /// Borrow the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_bytes() {
        let mut out = PdfOutput::new(Vec::new());
        let header = out.write_header(PdfVersion::V1_7).unwrap();
        assert_eq!(header, 15);
        out.write_indirect_object(1, &Object::Integer(7), false).unwrap();
        assert_eq!(out.bytes_written() as usize, out.get_ref().len());
        assert!(out.get_ref().starts_with(b"%PDF-1.7\n%"));
    }

    #[test]
    fn test_attach_rejects_second_owner() {
        let mut out = PdfOutput::new(Vec::new());
        out.attach(1).unwrap();
        out.attach(1).unwrap();
        assert!(out.attach(2).unwrap_err().is_usage());
        out.detach();
        out.attach(2).unwrap();
        assert_eq!(out.owner(), Some(2));
    }

    #[test]
    fn test_xref_table_trailer() {
        let mut out = PdfOutput::new(Vec::new());
        let entries = [XrefEntry::free_head(), XrefEntry::InFile { offset: 15, gen: 0 }];
        let trailer: Dictionary = [("Size".to_string(), Object::Integer(2))].into_iter().collect();
        out.write_xref_table(&entries, &trailer, 40).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.starts_with("xref\n0 2\n0000000000 65535 f \n0000000015 00000 n \n"));
        assert!(text.contains("trailer\n<<"));
        assert!(text.ends_with("startxref\n40\n%%EOF\n"));
    }
}
