//! Error types for DCM decoding
//!
//! Two layers of failure exist here. [`Error`] is for operations that cannot
//! produce data at all (I/O, container extraction, strict-mode pipelines).
//! [`Diagnostic`] covers everything the decoder can recover from: the decode
//! entry points never abort on malformed input, they degrade to a smaller
//! (possibly empty) mesh and attach diagnostics describing what went wrong.

use std::io;
use thiserror::Error;

/// Result type for DCM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when decoding DCM containers
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading the input
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive error while unpacking a wrapped container
    #[error("archive error: {0}")]
    Archive(String),

    /// XML parsing error in the document envelope
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid characters in a base64 payload
    #[error("invalid base64 payload: {0}")]
    Base64(String),

    /// Cipher initialization or block processing failure
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Decrypted vertex buffer is smaller than the declared vertex count requires
    #[error("vertex buffer too small: need {expected} bytes, have {actual}")]
    ShortBuffer {
        /// Bytes required by the declared vertex count
        expected: usize,
        /// Bytes actually available after decryption
        actual: usize,
    },

    /// Checksum verification failed in strict mode
    #[error("vertex checksum mismatch: document says {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The document's `check_value`
        expected: u32,
        /// Byte-swapped Adler-32 of the decrypted buffer
        computed: u32,
    },

    /// Mesh cannot be exported (e.g. triangle indices out of range)
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}

/// Non-fatal conditions observed while decoding
///
/// Diagnostics are attached to the decode report in the order they were
/// observed. None of them stops the decoder from returning whatever geometry
/// it recovered; callers decide whether a mesh with diagnostics is usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The document is not well-formed XML; an empty mesh is returned
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// A required attribute is absent and was treated as zero
    #[error("missing metadata: {0}")]
    MissingMetadata(String),

    /// A payload contained non-base64, non-whitespace characters
    #[error("base64 decode failed: {0}")]
    Base64Error(String),

    /// The decrypted vertex buffer cannot hold the declared vertex count
    #[error("vertex buffer too small: need {expected} bytes, have {actual}")]
    ShortBuffer {
        /// Bytes required by the declared vertex count
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Adler-32 disagrees with `check_value`; the vertices are kept but unverified
    #[error("checksum mismatch: document says {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The document's `check_value`
        expected: u32,
        /// Byte-swapped Adler-32 of the decrypted buffer
        computed: u32,
    },

    /// An opcode needed more operand bytes than the stream holds
    #[error("facet stream truncated at offset {offset}")]
    FacetStreamTruncated {
        /// Byte offset of the command whose operands ran out
        offset: usize,
    },

    /// A reserved opcode (11..=15) was skipped
    #[error("invalid opcode {opcode} at offset {offset}")]
    InvalidOpcode {
        /// The low nibble that was read
        opcode: u8,
        /// Byte offset of the command
        offset: usize,
    },

    /// An opcode popped from an empty edge queue; interpretation stopped
    #[error("edge queue underflow at offset {offset}")]
    QueueUnderflow {
        /// Byte offset of the command
        offset: usize,
    },

    /// A relative operand resolved below zero; interpretation stopped
    #[error("negative vertex index at offset {offset}")]
    NegativeIndex {
        /// Byte offset of the command
        offset: usize,
    },

    /// A triangle references a vertex past the end of the vertex array
    #[error("triangle {triangle} index {index} out of range (vertex count {vertex_count})")]
    IndexOutOfRange {
        /// Ordinal of the offending triangle
        triangle: usize,
        /// The out-of-range vertex index
        index: u32,
        /// Number of decoded vertices
        vertex_count: usize,
    },

    /// The interpreter emitted a different number of triangles than declared
    #[error("expected {expected} triangles, decoded {actual}")]
    TriangleCountMismatch {
        /// `facet_count` from the document
        expected: usize,
        /// Triangles actually emitted
        actual: usize,
    },

    /// The document carries no `<Binary_data>` element
    #[error("document contains no geometry")]
    NoGeometry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ShortBuffer {
            expected: 36,
            actual: 20,
        };
        assert_eq!(
            err.to_string(),
            "vertex buffer too small: need 36 bytes, have 20"
        );
    }

    #[test]
    fn test_checksum_display_is_hex() {
        let err = Error::ChecksumMismatch {
            expected: 0xC000_C001,
            computed: 0xDEAD_BEEF,
        };
        let msg = err.to_string();
        assert!(msg.contains("0xc000c001"));
        assert!(msg.contains("0xdeadbeef"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::TriangleCountMismatch {
            expected: 10,
            actual: 7,
        };
        assert_eq!(diag.to_string(), "expected 10 triangles, decoded 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
