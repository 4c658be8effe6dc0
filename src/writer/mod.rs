//! PDF writing.
//!
//! ## Architecture
//!
//! ```text
//! Document (pages, sources, outline, actions, form, resources)
//!     ↓
//! [pipeline] numbering: every explicit structure gets its output number
//!     ↓
//! [pipeline] emission: bodies rewritten through the remap table,
//!            missing references pulled in lazily
//!     ↓
//! [ObjectSerializer] + [PdfOutput] (bytes, offsets, encryption)
//!     ↓
//! cross-reference table or stream, trailer
//! ```
//!
//! All state of one write lives in a [`WriteSession`].

mod object_serializer;
mod output;
pub(crate) mod pipeline;
mod rewrite;
mod session;
mod xref_writer;

pub use object_serializer::ObjectSerializer;
pub use output::PdfOutput;
pub use rewrite::rewrite_references;
pub use session::{OffsetTable, WriteSession};
pub use xref_writer::{classic_table, field_width, xref_stream};
