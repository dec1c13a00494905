//! Reader for footer-indexed pak game archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
//! A pak archive is a single file holding many named records, each optionally
//! zlib-compressed in fixed-size blocks and optionally encrypted. A fixed-size
//! footer at the end of the file points at an index table that lists every
//! record's name and header offset.
//!
//! # Layout
//!
//! ```text
//! [record header + payload]*  [index table]  [footer (204 bytes)]
//! ```
//!
//! Loading an archive only reads the footer and the index. Record headers are
//! decoded from storage when a record is accessed, and payloads are
//! materialized in full on demand.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pak_format::PakArchive;
//!
//! let mut archive = PakArchive::open("000-Example_P.pak")?;
//! archive.load_records()?;
//!
//! for name in archive.list_names() {
//!     let header = archive.read_header(&name)?;
//!     println!("{name}: {} bytes ({})", header.decompressed_size, header.compression_method);
//! }
//!
//! let data = archive.read_data("metadata.json")?;
//! if !data.is_encrypted() {
//!     println!("{}", String::from_utf8_lossy(data.as_bytes()));
//! }
//! # Ok::<(), pak_format::PakError>(())
//! ```
//!
//! Encryption is reported, never undone: encrypted payloads come back as
//! [`RecordData::StillEncrypted`].

#![warn(missing_docs)]

pub mod archive;
pub mod config;
pub mod cursor;
pub mod decompress;
pub mod error;
pub mod footer;
pub mod header;
pub mod index;

pub use archive::PakArchive;
pub use config::PakConfig;
pub use cursor::{ByteCursor, FixedSize};
pub use decompress::{RecordData, inflate_block};
pub use error::{PakError, PakResult};
pub use footer::Footer;
pub use header::{
    CONTENT_HASH_LEN, CompressionBlock, CompressionMethod, RecordHeader, decode_record_header,
    skip_record_header,
};
pub use index::{ArchiveDirectory, RecordDescriptor};

/// Footer signature, `5a6f12e1` when read as a little-endian `u32`
pub const PAK_MAGIC: u32 = 0x5A6F12E1;

/// Distance of the footer from end-of-file
pub const FOOTER_SIZE: u64 = 204;
