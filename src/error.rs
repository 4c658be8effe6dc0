//! Error types for reading, assembling and writing PDF documents.
//!
//! Failures fall into three families. Structural errors mean a source file
//! (or the in-memory graph) is inconsistent. Usage errors mean the API was
//! called with illegal arguments or in the wrong mode. I/O errors come back
//! unchanged from the underlying reader or writer. The remaining variants are
//! produced by the parsing layer and are treated as structural when they
//! surface during a write.

use crate::object::ObjectRef;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, assembling or writing PDFs.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Malformed source data or broken internal consistency
    #[error("Structural error: {0}")]
    Structural(String),

    /// API misuse (illegal arguments, output already attached, wrong mode)
    #[error("Usage error: {0}")]
    Usage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Encryption or decryption failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),
}

impl Error {
    /// Shorthand for a [`Error::Structural`] error.
    pub fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    /// Shorthand for a [`Error::Usage`] error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// True for malformed-source and consistency failures, including parse
    /// failures of source data.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Structural(_)
                | Error::InvalidHeader(_)
                | Error::ParseError { .. }
                | Error::InvalidXref
                | Error::ObjectNotFound(..)
                | Error::InvalidObjectType { .. }
                | Error::Decode(_)
                | Error::CircularReference(_)
        )
    }

    /// True for API misuse.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }

    /// True for failures of the underlying byte source or sink.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
