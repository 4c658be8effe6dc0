// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

//! # PDF Binder
//!
//! Assembles PDF documents from pages of existing files and newly created
//! pages, and serializes the result with fresh object numbering.
//!
//! ## Core Features
//!
//! - **Merging**: import page ranges (`"1-3,7"`, `"ODD"`, `"ALL"`) from any
//!   number of source files; each source keeps its own numbering space
//! - **Lazy pull-in**: only objects reachable from written structures are
//!   copied, each exactly once per source
//! - **Cross-reference output**: classic tables up to PDF 1.4, compressed
//!   cross-reference streams and object streams from PDF 1.5
//! - **Navigation**: bookmarks, open actions and document actions
//! - **Forms**: root fields of every source merged into one `/AcroForm`,
//!   with colliding names renamed
//! - **Encryption**: RC4 40/128-bit and AES-128 standard security handler
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_binder::{Document, WriteOptions};
//!
//! # fn main() -> pdf_binder::Result<()> {
//! let mut doc = Document::new();
//! doc.merge_file("report.pdf", "1-3")?;
//! doc.merge_file("appendix.pdf", "ALL")?;
//! let first = doc.page_key(0).expect("merged pages");
//! doc.add_bookmark(None, "Report", first)?;
//! doc.save("bound.pdf", &WriteOptions::new())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF parsing
pub mod filters;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod reader;
pub mod xref;

// Security
pub mod encryption;

// Assembly
pub mod actions;
pub mod bookmarks;
pub mod config;
pub mod document;
pub(crate) mod forms;
pub mod page_range;
pub mod remap;
pub mod resources;

// Writing
pub mod writer;

pub use actions::{Action, DocumentEvent};
pub use bookmarks::{BookmarkId, Bookmarks, OutlineStyle};
pub use config::{ObjectCategory, PdfVersion, ReadOptions, WriteOptions};
pub use document::{Document, PageKey};
pub use encryption::{Algorithm, EncryptionConfig, Permissions};
pub use error::{Error, Result};
pub use object::{Dictionary, Object, ObjectRef};
pub use reader::{PdfReader, Reader};
pub use remap::OriginId;
pub use resources::{ColorSpace, FontHandle, ImageHandle, ImageXObject, PageResources, StandardFont};
pub use writer::{PdfOutput, WriteSession};
