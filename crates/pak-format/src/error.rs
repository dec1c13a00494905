//! Error types for pak archive operations

use thiserror::Error;

use crate::header::CompressionMethod;

/// Pak operation result type
pub type PakResult<T> = Result<T, PakError>;

/// Error types for pak archive loading and record access
#[derive(Debug, Error)]
pub enum PakError {
    /// Storage handle does not refer to a regular file
    #[error("not a regular file: {0}")]
    NotAFile(String),

    /// Fewer bytes were available than a read required
    #[error("short read at offset {position}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Absolute offset the read started at
        position: u64,
        /// Number of bytes requested
        expected: u64,
        /// Number of bytes actually available
        actual: u64,
    },

    /// Footer signature mismatch
    #[error("bad pak magic: expected {expected:#010x}, got {found:#010x}")]
    BadMagic {
        /// Signature the archive was expected to carry
        expected: u32,
        /// Signature found in the footer
        found: u32,
    },

    /// Index table could not be parsed
    #[error("index corrupt: {reason}")]
    IndexCorrupt {
        /// Detailed description of the corruption
        reason: String,
    },

    /// Record header is unreadable or structurally inconsistent
    #[error("malformed record header: {reason}")]
    MalformedHeader {
        /// Detailed description of the problem
        reason: String,
    },

    /// Compression method is known but has no read support
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(CompressionMethod),

    /// Codec rejected a block or produced the wrong length
    #[error("decompression failed in block {block}: {reason}")]
    DecompressionFailure {
        /// Index of the failing compression block
        block: usize,
        /// Detailed description of the failure
        reason: String,
    },

    /// Record name absent from the directory
    #[error("record not found: {0}")]
    NotFound(String),

    /// Stored payload does not match the recorded content hash
    #[error(
        "hash mismatch for {name}: expected {}, got {}",
        hex::encode(expected),
        hex::encode(actual)
    )]
    HashMismatch {
        /// Record name
        name: String,
        /// Hash stored in the record header
        expected: [u8; 20],
        /// Hash computed over the stored payload
        actual: [u8; 20],
    },

    /// Fixed-length text field is not valid UTF-8
    #[error("invalid text at offset {position}: {source}")]
    InvalidText {
        /// Absolute offset the text started at
        position: u64,
        /// Underlying decode error
        source: std::string::FromUtf8Error,
    },

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Binary structure error that is not a truncation
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),

    /// I/O error that is not a truncation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PakError {
    /// Errors that abort the whole archive load
    pub fn is_archive_level(&self) -> bool {
        matches!(
            self,
            Self::NotAFile(_) | Self::BadMagic { .. } | Self::IndexCorrupt { .. }
        )
    }

    /// Errors scoped to a single record access
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::MalformedHeader { .. }
                | Self::UnsupportedCompression(_)
                | Self::DecompressionFailure { .. }
                | Self::NotFound(_)
                | Self::HashMismatch { .. }
        )
    }

    /// Re-tag a truncation as index corruption.
    ///
    /// Any other error passes through unchanged.
    pub(crate) fn into_index_corrupt(self, context: &str) -> Self {
        match self {
            Self::ShortRead { .. } | Self::MalformedHeader { .. } | Self::InvalidText { .. } => {
                Self::IndexCorrupt {
                    reason: format!("{context}: {self}"),
                }
            }
            other => other,
        }
    }

    /// Re-tag a truncation as a malformed header
    pub(crate) fn into_malformed_header(self) -> Self {
        match self {
            Self::ShortRead { .. } => Self::MalformedHeader {
                reason: self.to_string(),
            },
            other => other,
        }
    }
}
