//! The assembled document.
//!
//! A [`Document`] holds pages, resources and navigation structures that may
//! come from several independently numbered sources. Nothing in it carries
//! an output object number: objects stay addressed as `(origin, number)`
//! until a write session numbers them.
//!
//! ```ignore
//! use pdf_binder::{Document, WriteOptions};
//!
//! let mut doc = Document::open("report.pdf")?;
//! doc.merge_file("appendix.pdf", "2-4,7")?;
//! doc.save("combined.pdf", &WriteOptions::default())?;
//! ```

use crate::actions::{Action, DocumentEvent};
use crate::bookmarks::{BookmarkId, Bookmarks};
use crate::config::{PdfVersion, ReadOptions, WriteOptions};
use crate::encryption::EncryptionConfig;
use crate::error::{Error, Result};
use crate::object::{decode_text_string, text_string, Dictionary, Object, ObjectRef};
use crate::page_range::parse_page_range;
use crate::reader::{PdfReader, Reader};
use crate::remap::OriginId;
use crate::resources::{FontHandle, ImageHandle, ImageXObject, PageResources, StandardFont};
use crate::writer::{pipeline, PdfOutput, WriteSession};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// US Letter, in points.
const LETTER: (f64, f64) = (612.0, 792.0);

/// Stable handle of a page, unaffected by moves and removals of others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey(pub(crate) u64);

/// Backing store of one origin.
///
/// The self origin keeps objects created through the API in `store`;
/// source origins read theirs through a [`Reader`].
pub(crate) struct Origin {
    reader: Option<Box<dyn Reader>>,
    store: BTreeMap<u32, Object>,
    next_local: u32,
}

impl Origin {
    fn local() -> Self {
        Self {
            reader: None,
            store: BTreeMap::new(),
            next_local: 1,
        }
    }

    fn source(reader: Box<dyn Reader>) -> Self {
        Self {
            reader: Some(reader),
            store: BTreeMap::new(),
            next_local: 1,
        }
    }

    pub(crate) fn reader(&self) -> Option<&dyn Reader> {
        self.reader.as_deref()
    }

    fn allocate(&mut self, obj: Object) -> ObjectRef {
        let number = self.next_local;
        self.next_local += 1;
        self.store.insert(number, obj);
        ObjectRef::new(number, 0)
    }

    /// Load an object by its number in this origin.
    pub(crate) fn fetch(&self, number: u32) -> Result<Object> {
        if let Some(obj) = self.store.get(&number) {
            return Ok(obj.clone());
        }
        match &self.reader {
            Some(reader) => reader.derefer_object(number),
            None => Err(Error::ObjectNotFound(number, 0)),
        }
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("reader", &self.reader.is_some())
            .field("stored", &self.store.len())
            .finish()
    }
}

/// A page of the document, in the numbering of its origin.
#[derive(Debug, Clone)]
pub(crate) struct Page {
    pub(crate) key: PageKey,
    pub(crate) origin: OriginId,
    pub(crate) source_number: Option<u32>,
    pub(crate) dict: Dictionary,
}

/// An assembled PDF document.
pub struct Document {
    id: u64,
    version: PdfVersion,
    pub(crate) origins: Vec<Origin>,
    pub(crate) primary: Option<OriginId>,
    pub(crate) pages: Vec<Page>,
    next_page_key: u64,
    pub(crate) deleted: Vec<(OriginId, u32)>,
    pub(crate) fonts: Vec<(StandardFont, FontHandle)>,
    pub(crate) images: Vec<ImageHandle>,
    pub(crate) procset: ObjectRef,
    pub(crate) bookmarks: Bookmarks,
    pub(crate) open_actions: Vec<Action>,
    pub(crate) additional_actions: BTreeMap<DocumentEvent, Action>,
    pub(crate) info: Dictionary,
    pub(crate) encryption: Option<EncryptionConfig>,
    read_options: ReadOptions,
    last_session: Option<WriteSession>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("origins", &self.origins.len())
            .field("pages", &self.pages.len())
            .field("bookmarks", &self.bookmarks.len())
            .field("encrypted", &self.encryption.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty PDF 1.4 document.
    pub fn new() -> Self {
        let mut local = Origin::local();
        let procset = local.allocate(Object::Array(
            ["PDF", "Text", "ImageB", "ImageC", "ImageI"]
                .into_iter()
                .map(Object::name)
                .collect(),
        ));
        Self {
            id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
            version: PdfVersion::default(),
            origins: vec![local],
            primary: None,
            pages: Vec::new(),
            next_page_key: 1,
            deleted: Vec::new(),
            fonts: Vec::new(),
            images: Vec::new(),
            procset,
            bookmarks: Bookmarks::new(),
            open_actions: Vec::new(),
            additional_actions: BTreeMap::new(),
            info: Dictionary::new(),
            encryption: None,
            read_options: ReadOptions::default(),
            last_session: None,
        }
    }

    /// Empty document of a specific version.
    pub fn with_version(version: PdfVersion) -> Self {
        let mut doc = Self::new();
        doc.version = version;
        doc
    }

    /// Open a file for editing; its pages, info and catalog entries are kept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    /// Open a file with passwords and hooks.
    ///
    /// The options are also used for files merged later.
    pub fn open_with(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let reader = PdfReader::open_with(path, &options)?;

        let mut doc = Self::with_version(reader.version());
        doc.read_options = options;
        if let Some(info) = reader.info() {
            for (key, value) in info {
                match reader.deref(&value) {
                    Ok(value) => {
                        doc.info.insert(key, value);
                    },
                    Err(e) => log::warn!("Dropping unreadable Info entry /{}: {}", key, e),
                }
            }
        }

        let origin = doc.add_source(reader);
        doc.primary = Some(origin);
        let count = doc.import_pages(origin, "ALL")?;
        log::info!("Opened {} ({} pages, PDF {})", path.display(), count, doc.version);
        Ok(doc)
    }

    /// Process-unique identifier, used to claim outputs.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Version written when the options do not override it.
    pub fn version(&self) -> PdfVersion {
        self.version
    }

    /// Change the default output version.
    pub fn set_version(&mut self, version: PdfVersion) {
        self.version = version;
    }

    pub(crate) fn origin(&self, id: OriginId) -> Option<&Origin> {
        self.origins.get(id.index())
    }

    // ==================== Pages ====================

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Key of the page at a zero-based index.
    pub fn page_key(&self, index: usize) -> Option<PageKey> {
        self.pages.get(index).map(|p| p.key)
    }

    /// Zero-based index of a page.
    pub fn page_index(&self, key: PageKey) -> Option<usize> {
        self.pages.iter().position(|p| p.key == key)
    }

    fn next_key(&mut self) -> PageKey {
        let key = PageKey(self.next_page_key);
        self.next_page_key += 1;
        key
    }

    fn push_local_page(&mut self, width: f64, height: f64, resources: Dictionary, contents: Option<ObjectRef>) -> Result<PageKey> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(Error::usage(format!("invalid page size {}x{}", width, height)));
        }
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("Page"));
        dict.insert("MediaBox".to_string(), Object::rect(0.0, 0.0, width, height));
        dict.insert("Resources".to_string(), Object::Dictionary(resources));
        if let Some(contents) = contents {
            dict.insert("Contents".to_string(), Object::Reference(contents));
        }
        let key = self.next_key();
        self.pages.push(Page {
            key,
            origin: OriginId::SELF,
            source_number: None,
            dict,
        });
        Ok(key)
    }

    /// Append an empty page of `width` x `height` points.
    pub fn add_page(&mut self, width: f64, height: f64) -> Result<PageKey> {
        let resources = PageResources::new().to_dict(self.procset);
        self.push_local_page(width, height, resources, None)
    }

    /// Append a page drawn by `content`, a content stream using `resources`.
    ///
    /// The stream is Flate-compressed at write time when the options ask for
    /// compressed streams.
    pub fn add_page_with_content(
        &mut self,
        width: f64,
        height: f64,
        content: impl Into<Vec<u8>>,
        resources: &PageResources,
    ) -> Result<PageKey> {
        let stream = Object::stream(Dictionary::new(), content.into());
        let contents = self.origins[OriginId::SELF.index()].allocate(stream);
        let resources = resources.to_dict(self.procset);
        self.push_local_page(width, height, resources, Some(contents))
    }

    /// Remove the page at a zero-based index.
    ///
    /// References to a removed source page are written as `null`.
    pub fn remove_page(&mut self, index: usize) -> Result<PageKey> {
        if index >= self.pages.len() {
            return Err(Error::usage(format!(
                "page index {} out of range (document has {} pages)",
                index,
                self.pages.len()
            )));
        }
        let page = self.pages.remove(index);
        if let Some(number) = page.source_number {
            let still_used = self
                .pages
                .iter()
                .any(|p| p.origin == page.origin && p.source_number == Some(number));
            if !still_used {
                self.deleted.push((page.origin, number));
            }
        }
        log::debug!("Removed page {} ({} left)", index + 1, self.pages.len());
        Ok(page.key)
    }

    /// Move a page from one zero-based index to another.
    pub fn move_page(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.pages.len();
        if from >= len || to >= len {
            return Err(Error::usage(format!(
                "cannot move page {} to {} in a document of {} pages",
                from, to, len
            )));
        }
        let page = self.pages.remove(from);
        self.pages.insert(to, page);
        Ok(())
    }

    // ==================== Sources ====================

    /// Register a source document and return its origin.
    pub fn add_source<R: Reader + 'static>(&mut self, reader: R) -> OriginId {
        let id = OriginId(self.origins.len() as u32);
        self.origins.push(Origin::source(Box::new(reader)));
        log::debug!("Registered source {}", id);
        id
    }

    /// Append pages of a source selected by a page-range expression such as
    /// `"1-3,7"`, `"ODD"` or `"ALL"`. Returns the number of pages appended.
    pub fn import_pages(&mut self, origin: OriginId, range: &str) -> Result<usize> {
        let reader = self
            .origin(origin)
            .and_then(Origin::reader)
            .ok_or_else(|| Error::usage(format!("origin {} is not a source document", origin)))?;
        let source_pages = reader.pages(self.read_options.page_created.as_ref())?;
        let selected = parse_page_range(range, source_pages.len())?;

        let mut imported = Vec::with_capacity(selected.len());
        for number in &selected {
            let page = &source_pages[number - 1];
            imported.push((page.number, page.dict.clone()));
        }
        for (number, dict) in imported {
            let key = self.next_key();
            self.pages.push(Page {
                key,
                origin,
                source_number: Some(number),
                dict,
            });
        }
        log::info!("Imported {} of {} pages from {}", selected.len(), source_pages.len(), origin);
        Ok(selected.len())
    }

    /// Open a file as a new source and append the selected pages.
    pub fn merge_file(&mut self, path: impl AsRef<Path>, range: &str) -> Result<usize> {
        let path = path.as_ref();
        let reader = PdfReader::open_with(path, &self.read_options)?;
        let origin = self.add_source(reader);
        let count = self.import_pages(origin, range)?;
        log::info!("Merged {} pages of {}", count, path.display());
        Ok(count)
    }

    // ==================== Resources ====================

    /// Register one of the standard fonts; registering it again returns the
    /// same handle.
    pub fn add_standard_font(&mut self, font: StandardFont) -> FontHandle {
        if let Some((_, handle)) = self.fonts.iter().find(|(f, _)| *f == font) {
            return handle.clone();
        }
        let local = self.origins[OriginId::SELF.index()].allocate(font.font_dict());
        let handle = FontHandle {
            name: format!("F{}", self.fonts.len() + 1),
            local,
        };
        self.fonts.push((font, handle.clone()));
        handle
    }

    /// Register an image XObject.
    pub fn add_image(&mut self, image: ImageXObject) -> ImageHandle {
        let local = self.origins[OriginId::SELF.index()].allocate(image.to_stream());
        let handle = ImageHandle {
            name: format!("Im{}", self.images.len() + 1),
            local,
            width: image.width,
            height: image.height,
        };
        self.images.push(handle.clone());
        handle
    }

    // ==================== Navigation ====================

    fn check_page(&self, key: PageKey) -> Result<()> {
        if self.page_index(key).is_none() {
            return Err(Error::usage(format!("page {:?} is not part of the document", key)));
        }
        Ok(())
    }

    /// Add a bookmark pointing at `page`.
    pub fn add_bookmark(&mut self, parent: Option<BookmarkId>, title: impl Into<String>, page: PageKey) -> Result<BookmarkId> {
        self.check_page(page)?;
        self.bookmarks.add(parent, title, page)
    }

    /// The outline.
    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    /// Mutable access to the outline, for styling and folding.
    pub fn bookmarks_mut(&mut self) -> &mut Bookmarks {
        &mut self.bookmarks
    }

    fn check_action(&self, action: &Action) -> Result<()> {
        match action {
            Action::GoTo { page } => self.check_page(*page),
            _ => Ok(()),
        }
    }

    /// Append an action run when the document opens.
    pub fn add_open_action(&mut self, action: Action) -> Result<()> {
        self.check_action(&action)?;
        self.open_actions.push(action);
        Ok(())
    }

    /// Set the action run on a document event.
    pub fn set_additional_action(&mut self, event: DocumentEvent, action: Action) -> Result<()> {
        self.check_action(&action)?;
        self.additional_actions.insert(event, action);
        Ok(())
    }

    // ==================== Metadata & security ====================

    /// Document information entries.
    pub fn info(&self) -> &Dictionary {
        &self.info
    }

    /// A text entry of the information dictionary.
    pub fn info_string(&self, key: &str) -> Option<String> {
        self.info.get(key).and_then(Object::as_string).map(decode_text_string)
    }

    /// Set a text entry such as `Title` or `Author`.
    pub fn set_info(&mut self, key: &str, value: &str) {
        self.info.insert(key.to_string(), text_string(value));
    }

    /// Encrypt written output, or stop doing so with `None`.
    pub fn set_encryption(&mut self, config: Option<EncryptionConfig>) {
        self.encryption = config;
    }

    /// Current encryption settings.
    pub fn encryption(&self) -> Option<&EncryptionConfig> {
        self.encryption.as_ref()
    }

    // ==================== Writing ====================

    /// Write the document to a file.
    pub fn save(&mut self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let mut out = PdfOutput::new(BufWriter::new(file));
        self.write_to(&mut out, options)?;
        out.into_inner().flush()?;
        log::info!("Saved {}", path.display());
        Ok(())
    }

    /// Write the document into memory.
    pub fn to_bytes(&mut self, options: &WriteOptions) -> Result<Vec<u8>> {
        let mut out = PdfOutput::new(Vec::new());
        self.write_to(&mut out, options)?;
        Ok(out.into_inner())
    }

    /// Write the document to an output, claiming it for the duration.
    ///
    /// A document without pages gets one blank Letter page first; the page
    /// stays in the document.
    pub fn write_to<W: Write>(&mut self, out: &mut PdfOutput<W>, options: &WriteOptions) -> Result<()> {
        options.validate()?;
        out.attach(self.id)?;
        let result = self.write_attached(out, options);
        out.detach();
        result
    }

    fn write_attached<W: Write>(&mut self, out: &mut PdfOutput<W>, options: &WriteOptions) -> Result<()> {
        self.reset_session();
        if self.pages.is_empty() {
            log::info!("Document has no pages, inserting a blank page");
            self.add_page(LETTER.0, LETTER.1)?;
        }

        let mut session = WriteSession::new();
        pipeline::write_document(self, &mut session, out, options)?;
        log::info!(
            "Wrote {} objects ({} in object streams), {} bytes",
            session.object_count(),
            session.compressed_count(),
            session.bytes_written()
        );
        self.last_session = Some(session);
        Ok(())
    }

    /// Forget the previous write session.
    pub fn reset_session(&mut self) {
        self.last_session = None;
    }

    /// The session of the most recent successful write.
    pub fn last_session(&self) -> Option<&WriteSession> {
        self.last_session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_has_no_pages() {
        let doc = Document::new();
        assert_eq!(doc.page_count(), 0);
        assert_eq!(doc.version(), PdfVersion::V1_4);
        assert_ne!(doc.id(), Document::new().id());
    }

    #[test]
    fn test_add_move_remove_pages() {
        let mut doc = Document::new();
        let a = doc.add_page(612.0, 792.0).unwrap();
        let b = doc.add_page(595.0, 842.0).unwrap();
        doc.move_page(1, 0).unwrap();
        assert_eq!(doc.page_key(0), Some(b));
        assert_eq!(doc.remove_page(1).unwrap(), a);
        assert_eq!(doc.page_count(), 1);
        assert!(doc.remove_page(5).unwrap_err().is_usage());
        assert!(doc.move_page(0, 3).unwrap_err().is_usage());
    }

    #[test]
    fn test_invalid_page_size() {
        let mut doc = Document::new();
        assert!(doc.add_page(0.0, 792.0).unwrap_err().is_usage());
        assert!(doc.add_page(f64::NAN, 792.0).unwrap_err().is_usage());
    }

    #[test]
    fn test_fonts_are_deduplicated() {
        let mut doc = Document::new();
        let f1 = doc.add_standard_font(StandardFont::Helvetica);
        let f2 = doc.add_standard_font(StandardFont::Courier);
        assert_eq!(doc.add_standard_font(StandardFont::Helvetica), f1);
        assert_eq!(f1.name, "F1");
        assert_eq!(f2.name, "F2");
    }

    #[test]
    fn test_bookmark_needs_known_page() {
        let mut doc = Document::new();
        let page = doc.add_page(612.0, 792.0).unwrap();
        doc.remove_page(0).unwrap();
        assert!(doc.add_bookmark(None, "Gone", page).unwrap_err().is_usage());
        assert!(doc.add_open_action(Action::GoTo { page }).unwrap_err().is_usage());
    }

    #[test]
    fn test_import_from_self_is_usage_error() {
        let mut doc = Document::new();
        assert!(doc.import_pages(OriginId::SELF, "ALL").unwrap_err().is_usage());
    }

    #[test]
    fn test_info_strings() {
        let mut doc = Document::new();
        doc.set_info("Title", "Quarterly R\u{e9}sum\u{e9}");
        assert_eq!(doc.info_string("Title").as_deref(), Some("Quarterly R\u{e9}sum\u{e9}"));
    }

    #[test]
    fn test_self_origin_fetch() {
        let doc = Document::new();
        let origin = doc.origin(OriginId::SELF).unwrap();
        assert!(origin.fetch(doc.procset.id).unwrap().as_array().is_some());
        assert!(origin.fetch(999).unwrap_err().is_structural());
    }
}
