//! Source documents.
//!
//! [`Reader`] is the contract the assembly and write layers use to pull
//! objects out of a source document by its own numbering. [`PdfReader`] is
//! the file-backed implementation: it parses the header and cross-reference
//! data up front and loads objects on demand, caching what it has parsed.

use crate::config::{PageHook, PdfVersion, ReadOptions};
use crate::encryption::{ObjectCipher, SecurityHandler, StandardSecurityHandler};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::xref::{find_startxref, load_xref, reconstruct, CrossRefTable, XrefEntry};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Page attributes that leaf pages inherit from their ancestors.
const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Maximum depth of a page tree.
const MAX_PAGE_TREE_DEPTH: usize = 256;

/// A leaf page read from a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    /// Object number of the page in its source
    pub number: u32,
    /// Page dictionary with inherited attributes resolved and `/Parent` removed
    pub dict: Dictionary,
}

/// Read access to a source document by its own object numbers.
pub trait Reader {
    /// Header version of the source.
    fn version(&self) -> PdfVersion;

    /// Load an object by reference.
    fn get_object(&self, obj_ref: ObjectRef) -> Result<Object>;

    /// Load an object by number, bypassing any in-memory edits.
    fn derefer_object(&self, number: u32) -> Result<Object>;

    /// The document catalog.
    fn catalog(&self) -> Result<Dictionary>;

    /// The document information dictionary, if present and well formed.
    fn info(&self) -> Option<Dictionary>;

    /// The `/Encrypt` dictionary of an encrypted source.
    fn encrypt_dict(&self) -> Option<&Dictionary>;

    /// The two `/ID` components.
    fn file_id(&self) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Parsed cross-reference data.
    fn xref(&self) -> &CrossRefTable;

    /// Resolve one hop: references are loaded, direct values are cloned.
    fn deref(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.get_object(*r),
            other => Ok(other.clone()),
        }
    }

    /// References of the leaf pages, in document order.
    fn page_refs(&self) -> Result<Vec<ObjectRef>> {
        Ok(self.pages(None)?.into_iter().map(|p| ObjectRef::new(p.number, 0)).collect())
    }

    /// Flatten the page tree into leaf pages, in document order.
    fn pages(&self, hook: Option<&PageHook>) -> Result<Vec<SourcePage>> {
        let catalog = self.catalog()?;
        let root = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::structural("catalog has no /Pages reference"))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, Dictionary::new(), 0usize)];
        while let Some((node_ref, inherited, depth)) = stack.pop() {
            if !visited.insert(node_ref.id) {
                log::warn!("Page tree revisits object {}, skipping", node_ref);
                continue;
            }
            if depth > MAX_PAGE_TREE_DEPTH {
                return Err(Error::structural("page tree is nested too deeply"));
            }
            let node = self.get_object(node_ref)?;
            let found = node.type_name();
            let Object::Dictionary(mut dict) = node else {
                return Err(Error::structural(format!(
                    "page tree node {} is a {}, not a dictionary",
                    node_ref, found
                )));
            };

            let mut attrs = inherited;
            for key in INHERITABLE {
                if let Some(value) = dict.get(key) {
                    attrs.insert(key.to_string(), value.clone());
                }
            }

            let is_leaf = match dict.get("Type").and_then(Object::as_name) {
                Some("Page") => true,
                Some("Pages") => false,
                _ => !dict.contains_key("Kids"),
            };
            if is_leaf {
                for (key, value) in attrs {
                    dict.entry(key).or_insert(value);
                }
                dict.remove("Parent");
                dict.insert("Type".to_string(), Object::name("Page"));
                if !dict.contains_key("MediaBox") {
                    log::warn!("Page {} has no /MediaBox, using Letter", node_ref);
                    dict.insert("MediaBox".to_string(), Object::rect(0.0, 0.0, 612.0, 792.0));
                }
                if let Some(hook) = hook {
                    hook(pages.len(), &mut dict);
                }
                pages.push(SourcePage {
                    number: node_ref.id,
                    dict,
                });
                continue;
            }

            let kids = match dict.get("Kids") {
                Some(kids) => self.deref(kids)?,
                None => Object::Array(Vec::new()),
            };
            let kids = kids.as_array().ok_or_else(|| {
                Error::structural(format!("/Kids of page tree node {} is not an array", node_ref))
            })?;
            for kid in kids.iter().rev() {
                match kid.as_reference() {
                    Some(r) => stack.push((r, attrs.clone(), depth + 1)),
                    None => log::warn!("Ignoring direct page tree kid in node {}", node_ref),
                }
            }
        }
        log::debug!("Flattened page tree: {} pages", pages.len());
        Ok(pages)
    }
}

/// File-backed source document.
pub struct PdfReader {
    data: Bytes,
    version: PdfVersion,
    xref: CrossRefTable,
    cache: RefCell<HashMap<u32, Object>>,
    encrypt_dict: Option<Dictionary>,
    encrypt_number: Option<u32>,
    cipher: Option<ObjectCipher>,
}

impl std::fmt::Debug for PdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfReader")
            .field("version", &self.version)
            .field("bytes", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("encrypted", &self.encrypt_dict.is_some())
            .finish_non_exhaustive()
    }
}

impl PdfReader {
    /// Open a file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &ReadOptions::default())
    }

    /// Open a file.
    pub fn open_with(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        log::info!("Opening {} ({} bytes)", path.as_ref().display(), data.len());
        Self::from_bytes(data, options)
    }

    /// Parse a document held in memory.
    pub fn from_bytes(data: impl Into<Bytes>, options: &ReadOptions) -> Result<Self> {
        let data: Bytes = data.into();
        let version = parse_header(&data)?;

        let xref = match find_startxref(&data).and_then(|start| load_xref(&data, start)) {
            Ok(table) if table.trailer().contains_key("Root") => table,
            Ok(_) => {
                log::warn!("Trailer has no /Root, rebuilding cross-reference table");
                reconstruct(&data)?
            },
            Err(e) => {
                log::warn!("Cross-reference data unusable ({}), rebuilding", e);
                reconstruct(&data)?
            },
        };

        let mut reader = Self {
            data,
            version,
            xref,
            cache: RefCell::new(HashMap::new()),
            encrypt_dict: None,
            encrypt_number: None,
            cipher: None,
        };
        reader.authenticate(options)?;
        log::debug!(
            "Opened PDF {} with {} cross-reference entries",
            reader.version,
            reader.xref.len()
        );
        Ok(reader)
    }

    /// Whether the source is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypt_dict.is_some()
    }

    fn authenticate(&mut self, options: &ReadOptions) -> Result<()> {
        let Some(entry) = self.xref.trailer().get("Encrypt").cloned() else {
            return Ok(());
        };
        let dict = match &entry {
            Object::Reference(r) => {
                self.encrypt_number = Some(r.id);
                self.load(r.id)?
            },
            other => other.clone(),
        };
        let dict = dict
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::structural("/Encrypt is not a dictionary"))?;

        let mut handler = StandardSecurityHandler::from_encrypt_dict(&dict)?;
        let file_id = self.file_id().map(|(first, _)| first).unwrap_or_default();

        let mut candidates: Vec<Vec<u8>> = options.password.iter().cloned().collect();
        candidates.push(Vec::new());
        let mut authenticated = false;
        for password in &candidates {
            if handler.setup_by_user_password(password, &file_id)?
                || handler.setup_by_owner_password(password, &file_id)?
            {
                authenticated = true;
                break;
            }
        }
        if let Some(prompt) = &options.password_prompt {
            while !authenticated {
                let Some(password) = prompt() else { break };
                authenticated = handler.setup_by_user_password(&password, &file_id)?
                    || handler.setup_by_owner_password(&password, &file_id)?;
            }
        }
        if !authenticated {
            return Err(Error::Encryption("incorrect password".to_string()));
        }

        self.cipher = handler.cipher();
        self.encrypt_dict = Some(dict);
        // Objects parsed while locating /Encrypt are still encrypted.
        self.cache.borrow_mut().clear();
        log::info!("Decrypting source with {:?}", handler.algorithm());
        Ok(())
    }

    fn load(&self, number: u32) -> Result<Object> {
        if let Some(obj) = self.cache.borrow().get(&number) {
            return Ok(obj.clone());
        }
        let entry = self
            .xref
            .get(number)
            .copied()
            .ok_or(Error::ObjectNotFound(number, 0))?;
        let obj = match entry {
            XrefEntry::Free { .. } => return Err(Error::ObjectNotFound(number, 0)),
            XrefEntry::InFile { offset, gen } => self.load_at(number, gen, offset)?,
            XrefEntry::InStream { stream, .. } => {
                if stream == number {
                    return Err(Error::CircularReference(ObjectRef::new(number, 0)));
                }
                let container = self.load(stream)?;
                let members = parse_object_stream(&container)?;
                let mut cache = self.cache.borrow_mut();
                for (n, member) in &members {
                    let owned = matches!(
                        self.xref.get(*n),
                        Some(XrefEntry::InStream { stream: s, .. }) if *s == stream
                    );
                    if owned {
                        cache.entry(*n).or_insert_with(|| member.clone());
                    }
                }
                members
                    .get(&number)
                    .cloned()
                    .ok_or(Error::ObjectNotFound(number, 0))?
            },
        };
        self.cache.borrow_mut().insert(number, obj.clone());
        Ok(obj)
    }

    fn load_at(&self, number: u32, gen: u16, offset: u64) -> Result<Object> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|o| *o < self.data.len())
            .ok_or_else(|| Error::ParseError {
                offset: offset as usize,
                reason: format!("object {} offset beyond end of file", number),
            })?;
        let resolve_length = |r: ObjectRef| {
            if r.id == number {
                return None;
            }
            self.load(r.id)
                .ok()
                .and_then(|o| o.as_integer())
                .and_then(|n| usize::try_from(n).ok())
        };
        let (_, (found, obj)) =
            parse_indirect_object(&self.data[start..], &resolve_length).map_err(|e| Error::ParseError {
                offset: start,
                reason: format!("object {}: {:?}", number, e),
            })?;
        if found.id != number {
            log::warn!("Expected object {} at offset {}, found {}", number, start, found);
        }
        match &self.cipher {
            Some(cipher) if self.encrypt_number != Some(number) => decrypt_object(obj, cipher, number, gen),
            _ => Ok(obj),
        }
    }
}

/// Decrypt the strings and stream data of one object.
fn decrypt_object(obj: Object, cipher: &ObjectCipher, number: u32, gen: u16) -> Result<Object> {
    Ok(match obj {
        Object::String(s) => Object::String(cipher.decrypt_string(&s, number, gen)?),
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|item| decrypt_object(item, cipher, number, gen))
                .collect::<Result<_>>()?,
        ),
        Object::Dictionary(dict) => Object::Dictionary(decrypt_dict(dict, cipher, number, gen)?),
        Object::Stream { dict, data } => {
            let kind = dict.get("Type").and_then(Object::as_name);
            if kind == Some("XRef") {
                return Ok(Object::Stream { dict, data });
            }
            let plain = kind == Some("Metadata") && !cipher.encrypts_metadata();
            let data = if plain {
                data
            } else {
                Bytes::from(cipher.decrypt_stream(&data, number, gen)?)
            };
            Object::Stream {
                dict: decrypt_dict(dict, cipher, number, gen)?,
                data,
            }
        },
        other => other,
    })
}

fn decrypt_dict(dict: Dictionary, cipher: &ObjectCipher, number: u32, gen: u16) -> Result<Dictionary> {
    dict.into_iter()
        .map(|(k, v)| Ok((k, decrypt_object(v, cipher, number, gen)?)))
        .collect()
}

fn parse_header(data: &[u8]) -> Result<PdfVersion> {
    let window = &data[..data.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned()))?;
    let digits: String = window[pos + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();
    match digits.parse::<PdfVersion>() {
        Ok(version) => Ok(version),
        Err(_) => {
            log::warn!("Unreadable header version '{}', assuming 1.4", digits);
            Ok(PdfVersion::V1_4)
        },
    }
}

impl Reader for PdfReader {
    fn version(&self) -> PdfVersion {
        self.version
    }

    fn get_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        self.load(obj_ref.id)
    }

    fn derefer_object(&self, number: u32) -> Result<Object> {
        self.load(number)
    }

    fn catalog(&self) -> Result<Dictionary> {
        let root = self
            .xref
            .trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::structural("trailer has no /Root reference"))?;
        match self.get_object(root)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::structural(format!("catalog is a {}, not a dictionary", other.type_name()))),
        }
    }

    fn info(&self) -> Option<Dictionary> {
        let entry = self.xref.trailer().get("Info")?;
        match self.deref(entry) {
            Ok(Object::Dictionary(dict)) => Some(dict),
            Ok(other) => {
                log::warn!("Ignoring /Info of type {}", other.type_name());
                None
            },
            Err(e) => {
                log::warn!("Ignoring unreadable /Info: {}", e);
                None
            },
        }
    }

    fn encrypt_dict(&self) -> Option<&Dictionary> {
        self.encrypt_dict.as_ref()
    }

    fn file_id(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let ids = self.xref.trailer().get("ID")?.as_array()?;
        let first = ids.first()?.as_string()?.to_vec();
        let second = ids.get(1).and_then(Object::as_string).map(<[u8]>::to_vec).unwrap_or_default();
        Some((first, second))
    }

    fn xref(&self) -> &CrossRefTable {
        &self.xref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a file with correct offsets from `(number, body)` pairs.
    fn build_pdf(objects: &[(u32, &str)], trailer: &str) -> Vec<u8> {
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

    fn two_level_tree() -> Vec<u8> {
        build_pdf(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] /Resources 6 0 R >>"),
                (3, "<< /Type /Page /Parent 2 0 R /Contents 5 0 R >>"),
                (4, "<< /Type /Pages /Parent 2 0 R /Kids [7 0 R] /Count 1 /Rotate 90 >>"),
                (5, "<< /Length 2 >>\nstream\nq\n\nendstream"),
                (6, "<< /Font << >> >>"),
                (7, "<< /Type /Page /Parent 4 0 R /MediaBox [0 0 100 100] >>"),
                (8, "<< /Title (Sample) >>"),
            ],
            "/Root 1 0 R /Info 8 0 R",
        )
    }

    fn int_box(width: i64, height: i64) -> Object {
        Object::Array([0, 0, width, height].into_iter().map(Object::Integer).collect())
    }

    #[test]
    fn test_pages_inherit_attributes() {
        let reader = PdfReader::from_bytes(two_level_tree(), &ReadOptions::default()).unwrap();
        let pages = reader.pages(None).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 3);
        assert_eq!(pages[1].number, 7);

        let first = &pages[0].dict;
        assert!(!first.contains_key("Parent"));
        assert_eq!(first.get("Resources"), Some(&Object::Reference(ObjectRef::new(6, 0))));
        assert_eq!(first.get("MediaBox"), Some(&int_box(612, 792)));

        let second = &pages[1].dict;
        assert_eq!(second.get("Rotate"), Some(&Object::Integer(90)));
        assert_eq!(second.get("MediaBox"), Some(&int_box(100, 100)));
    }

    #[test]
    fn test_page_hook_sees_every_page() {
        let options = ReadOptions::new().on_page_created(|index, dict| {
            dict.insert("SeenAt".to_string(), Object::Integer(index as i64));
        });
        let hook = options.page_created.clone();
        let reader = PdfReader::from_bytes(two_level_tree(), &options).unwrap();
        let pages = reader.pages(hook.as_ref()).unwrap();
        assert_eq!(pages[1].dict.get("SeenAt"), Some(&Object::Integer(1)));
    }

    #[test]
    fn test_catalog_info_and_stream() {
        let reader = PdfReader::from_bytes(two_level_tree(), &ReadOptions::default()).unwrap();
        assert_eq!(reader.version(), PdfVersion::V1_4);
        assert_eq!(reader.catalog().unwrap().get("Type"), Some(&Object::name("Catalog")));
        assert_eq!(reader.info().unwrap().get("Title"), Some(&Object::String(b"Sample".to_vec())));
        let contents = reader.derefer_object(5).unwrap();
        assert_eq!(contents.stream_data(), Some(&b"q\n"[..]));
        assert!(!reader.is_encrypted());
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let reader = PdfReader::from_bytes(two_level_tree(), &ReadOptions::default()).unwrap();
        assert!(matches!(reader.derefer_object(42), Err(Error::ObjectNotFound(42, 0))));
    }

    #[test]
    fn test_non_dictionary_catalog_is_structural() {
        let data = build_pdf(&[(1, "[1 2 3]")], "/Root 1 0 R");
        let reader = PdfReader::from_bytes(data, &ReadOptions::default()).unwrap();
        assert!(reader.catalog().unwrap_err().is_structural());
    }

    #[test]
    fn test_broken_xref_is_rebuilt() {
        let mut data = two_level_tree();
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        data.extend_from_slice(b"startxref\n999999\n%%EOF\n");
        let reader = PdfReader::from_bytes(data, &ReadOptions::default()).unwrap();
        assert!(reader.xref().is_reconstructed());
        assert_eq!(reader.pages(None).unwrap().len(), 2);
        assert_eq!(reader.page_refs().unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_non_pdf() {
        let err = PdfReader::from_bytes(b"hello world".to_vec(), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn test_page_tree_cycle_is_skipped() {
        let data = build_pdf(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 2 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /MediaBox [0 0 10 10] >>"),
            ],
            "/Root 1 0 R",
        );
        let reader = PdfReader::from_bytes(data, &ReadOptions::default()).unwrap();
        assert_eq!(reader.pages(None).unwrap().len(), 1);
    }
}
