//! Options for reading and writing documents.

use crate::error::{Error, Result};
use crate::object::Dictionary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// PDF version written in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PdfVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl PdfVersion {
    /// PDF 1.4, the last version written with a classic cross-reference table.
    pub const V1_4: PdfVersion = PdfVersion::new(1, 4);
    /// PDF 1.5, the first version written with a cross-reference stream.
    pub const V1_5: PdfVersion = PdfVersion::new(1, 5);
    /// PDF 1.7
    pub const V1_7: PdfVersion = PdfVersion::new(1, 7);

    /// Create a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether this version is written with a cross-reference stream.
    pub fn uses_xref_stream(&self) -> bool {
        *self >= Self::V1_5
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        Self::V1_4
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PdfVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| Error::usage(format!("invalid PDF version '{}'", s)))?;
        let parse = |part: &str| {
            part.parse::<u8>()
                .map_err(|_| Error::usage(format!("invalid PDF version '{}'", s)))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl TryFrom<String> for PdfVersion {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PdfVersion> for String {
    fn from(v: PdfVersion) -> String {
        v.to_string()
    }
}

/// Kinds of objects that may be packed into object streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    /// Outline root and outline items
    Bookmark,
    /// Font dictionaries
    Font,
    /// The document information dictionary
    Info,
    /// Open actions and additional actions
    Action,
    /// Annotations of written pages
    Annotation,
    /// The interactive form dictionary and its root fields
    Form,
}

/// Called for every page built while reading or importing, with the page's
/// zero-based index in its source and its (flattened) dictionary.
pub type PageHook = Arc<dyn Fn(usize, &mut Dictionary) + Send + Sync>;

/// Asked for a password when the supplied one does not open a document.
/// Returning `None` gives up.
pub type PasswordPrompt = Arc<dyn Fn() -> Option<Vec<u8>> + Send + Sync>;

/// Called with the original and the proposed name before a renamed form
/// field is written. Returning `Some` overrides the proposal.
pub type FieldRenameHook = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// Options for writing a document.
#[derive(Clone)]
pub struct WriteOptions {
    /// Output version; `None` keeps the document's own version
    pub version: Option<PdfVersion>,
    /// Flate-compress content streams created through the document API
    pub compress_streams: bool,
    /// Categories packed into object streams (PDF 1.5 and later only)
    pub compressible: BTreeSet<ObjectCategory>,
    /// Upper bound of objects in one object stream
    pub max_objects_per_stream: usize,
    /// Info `/Producer`; `None` uses the crate name and version
    pub producer: Option<String>,
    /// Maximum number of kids per page-tree node
    pub page_tree_fanout: usize,
    /// Hook consulted before a renamed form field is written
    pub field_renamed: Option<FieldRenameHook>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            version: None,
            compress_streams: true,
            compressible: [ObjectCategory::Bookmark, ObjectCategory::Font].into_iter().collect(),
            max_objects_per_stream: 100,
            producer: None,
            page_tree_fanout: 32,
            field_renamed: None,
        }
    }
}

impl fmt::Debug for WriteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOptions")
            .field("version", &self.version)
            .field("compress_streams", &self.compress_streams)
            .field("compressible", &self.compressible)
            .field("max_objects_per_stream", &self.max_objects_per_stream)
            .field("producer", &self.producer)
            .field("page_tree_fanout", &self.page_tree_fanout)
            .field("field_renamed", &self.field_renamed.is_some())
            .finish()
    }
}

impl WriteOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write with a specific PDF version.
    pub fn with_version(mut self, version: PdfVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Enable or disable compression of new content streams.
    pub fn with_compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    /// Replace the set of categories packed into object streams.
    pub fn with_compressible(mut self, categories: impl IntoIterator<Item = ObjectCategory>) -> Self {
        self.compressible = categories.into_iter().collect();
        self
    }

    /// Limit the number of objects per object stream.
    pub fn with_max_objects_per_stream(mut self, max: usize) -> Self {
        self.max_objects_per_stream = max;
        self
    }

    /// Set the Info `/Producer`.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Set the page-tree fanout.
    pub fn with_page_tree_fanout(mut self, fanout: usize) -> Self {
        self.page_tree_fanout = fanout;
        self
    }

    /// Install the form-field rename hook.
    pub fn on_field_renamed(
        mut self,
        hook: impl Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.field_renamed = Some(Arc::new(hook));
        self
    }

    /// Reject settings the writer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.page_tree_fanout < 2 {
            return Err(Error::usage(format!(
                "page tree fanout must be at least 2, got {}",
                self.page_tree_fanout
            )));
        }
        if self.max_objects_per_stream == 0 {
            return Err(Error::usage("object streams must hold at least one object"));
        }
        if let Some(v) = self.version {
            if v.major != 1 && v.major != 2 {
                return Err(Error::usage(format!("unsupported output version {}", v)));
            }
        }
        Ok(())
    }

    pub(crate) fn producer_string(&self) -> String {
        self.producer
            .clone()
            .unwrap_or_else(|| format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
    }
}

/// Options for opening source documents.
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Password tried first (user, then owner)
    pub password: Option<Vec<u8>>,
    /// Consulted when neither the supplied nor the empty password works
    pub password_prompt: Option<PasswordPrompt>,
    /// Called for every page built from the source
    pub page_created: Option<PageHook>,
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("password_prompt", &self.password_prompt.is_some())
            .field("page_created", &self.page_created.is_some())
            .finish()
    }
}

impl ReadOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open with a password.
    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Install a password prompt.
    pub fn on_password(mut self, prompt: impl Fn() -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        self.password_prompt = Some(Arc::new(prompt));
        self
    }

    /// Install a page-created hook.
    pub fn on_page_created(mut self, hook: impl Fn(usize, &mut Dictionary) + Send + Sync + 'static) -> Self {
        self.page_created = Some(Arc::new(hook));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_order() {
        let v: PdfVersion = "1.7".parse().unwrap();
        assert_eq!(v, PdfVersion::V1_7);
        assert!(v.uses_xref_stream());
        assert!(!PdfVersion::V1_4.uses_xref_stream());
        assert!(PdfVersion::V1_5.uses_xref_stream());
        assert!(PdfVersion::new(2, 0) > PdfVersion::V1_7);
        assert!("17".parse::<PdfVersion>().unwrap_err().is_usage());
    }

    #[test]
    fn test_version_serde() {
        let v: PdfVersion = serde_json::from_str("\"1.5\"").unwrap();
        assert_eq!(v, PdfVersion::V1_5);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.5\"");
    }

    #[test]
    fn test_default_write_options() {
        let options = WriteOptions::default();
        assert!(options.compressible.contains(&ObjectCategory::Bookmark));
        assert!(options.compressible.contains(&ObjectCategory::Font));
        assert_eq!(options.compressible.len(), 2);
        assert_eq!(options.page_tree_fanout, 32);
        assert!(options.validate().is_ok());
        assert!(options.producer_string().starts_with("pdf_binder "));
    }

    #[test]
    fn test_fanout_below_two_is_usage_error() {
        let options = WriteOptions::new().with_page_tree_fanout(1);
        assert!(options.validate().unwrap_err().is_usage());
    }

    #[test]
    fn test_category_deserializes_lowercase() {
        let c: ObjectCategory = serde_json::from_str("\"annotation\"").unwrap();
        assert_eq!(c, ObjectCategory::Annotation);
    }
}
