//! Synthetic pak archives for tests
//!
//! [`PakFixtureBuilder`] lays records out the way an archiver does: each
//! record is an 8-byte offset field, the header, then the stored payload. The
//! index follows the last record and the footer sits `footer_size` bytes
//! before end-of-file.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;

/// Footer signature as written to disk, little-endian
pub const FIXTURE_MAGIC: u32 = 0x5A6F12E1;

/// Default footer distance from end-of-file
pub const FIXTURE_FOOTER_SIZE: u64 = 204;

/// How a fixture record's payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureCompression {
    /// Method 0, bytes stored as-is
    Stored,
    /// Method 1, one zlib stream per `block_size` chunk
    Zlib {
        /// Uncompressed bytes per block
        block_size: u32,
    },
    /// Any other method value, written with a zlib block table
    Reserved {
        /// Raw method value to record
        method: u32,
        /// Uncompressed bytes per block
        block_size: u32,
    },
}

impl FixtureCompression {
    fn method(self) -> u32 {
        match self {
            Self::Stored => 0,
            Self::Zlib { .. } => 1,
            Self::Reserved { method, .. } => method,
        }
    }

    fn block_size(self) -> u32 {
        match self {
            Self::Stored => 0,
            Self::Zlib { block_size } | Self::Reserved { block_size, .. } => block_size,
        }
    }
}

/// One record to place in a fixture archive
#[derive(Debug, Clone)]
pub struct FixtureEntry {
    name: Vec<u8>,
    payload: Vec<u8>,
    compression: FixtureCompression,
    encrypted: bool,
    hashed: bool,
    terminated: bool,
}

impl FixtureEntry {
    /// Stored record with a content hash and a NUL-terminated name
    pub fn new(name: impl AsRef<[u8]>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.as_ref().to_vec(),
            payload: payload.into(),
            compression: FixtureCompression::Stored,
            encrypted: false,
            hashed: true,
            terminated: true,
        }
    }

    /// Set the payload compression
    pub fn compression(mut self, compression: FixtureCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the encrypted flag; the payload bytes are left untouched
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Record a real SHA-1 (`true`) or an all-zero hash (`false`)
    pub fn hashed(mut self, hashed: bool) -> Self {
        self.hashed = hashed;
        self
    }

    /// Store the name without its trailing NUL
    pub fn unterminated(mut self) -> Self {
        self.terminated = false;
        self
    }
}

/// A built fixture archive and where its parts landed
#[derive(Debug, Clone)]
pub struct BuiltPak {
    /// Complete archive bytes
    pub bytes: Vec<u8>,
    /// Header offset of each entry, in insertion order
    pub header_offsets: Vec<u64>,
    /// Absolute offset of the index table
    pub index_offset: u64,
    /// Length of the index table
    pub index_size: u64,
}

impl BuiltPak {
    /// Offset of the footer within `bytes`
    pub fn footer_offset(&self) -> usize {
        (self.index_offset + self.index_size) as usize
    }

    /// Write the archive to a temporary file
    pub fn write_temp(&self) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        Ok(file)
    }
}

/// Builder for synthetic pak archives
#[derive(Debug, Clone)]
pub struct PakFixtureBuilder {
    version: u32,
    mount_point: String,
    magic: u32,
    footer_size: u64,
    record_count: Option<u32>,
    entries: Vec<FixtureEntry>,
}

impl Default for PakFixtureBuilder {
    fn default() -> Self {
        Self {
            version: 8,
            mount_point: "../../../".to_string(),
            magic: FIXTURE_MAGIC,
            footer_size: FIXTURE_FOOTER_SIZE,
            record_count: None,
            entries: Vec::new(),
        }
    }
}

impl PakFixtureBuilder {
    /// Empty archive, version 8, default magic and footer size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer version field
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the index mount point
    pub fn mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = mount_point.into();
        self
    }

    /// Set the footer signature
    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    /// Set the footer distance from end-of-file; must be at least 24
    pub fn footer_size(mut self, footer_size: u64) -> Self {
        self.footer_size = footer_size;
        self
    }

    /// Write `count` as the index record count instead of the real one
    pub fn record_count(mut self, count: u32) -> Self {
        self.record_count = Some(count);
        self
    }

    /// Add a stored record
    pub fn stored(self, name: &str, payload: impl Into<Vec<u8>>) -> Self {
        self.entry(FixtureEntry::new(name, payload))
    }

    /// Add a zlib record split into `block_size` chunks
    pub fn zlib(self, name: &str, payload: impl Into<Vec<u8>>, block_size: u32) -> Self {
        self.entry(
            FixtureEntry::new(name, payload).compression(FixtureCompression::Zlib { block_size }),
        )
    }

    /// Add a fully described record
    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Lay out the archive
    pub fn build(&self) -> io::Result<BuiltPak> {
        let mut bytes = Vec::new();
        let mut header_offsets = Vec::with_capacity(self.entries.len());
        let mut headers = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let header_offset = bytes.len() as u64;
            let (header, stored) = encode_record(entry)?;
            bytes.extend_from_slice(&0u64.to_le_bytes());
            bytes.extend_from_slice(&header);
            bytes.extend_from_slice(&stored);
            header_offsets.push(header_offset);
            headers.push(header);
        }

        let index_offset = bytes.len() as u64;
        push_string(&mut bytes, self.mount_point.as_bytes(), true);
        let count = self.record_count.unwrap_or(self.entries.len() as u32);
        bytes.extend_from_slice(&count.to_le_bytes());
        for ((entry, header), offset) in self.entries.iter().zip(&headers).zip(&header_offsets) {
            push_string(&mut bytes, &entry.name, entry.terminated);
            bytes.extend_from_slice(&offset.to_le_bytes());
            bytes.extend_from_slice(header);
        }
        let index_size = bytes.len() as u64 - index_offset;

        let mut footer = Vec::with_capacity(self.footer_size as usize);
        footer.extend_from_slice(&self.magic.to_le_bytes());
        footer.extend_from_slice(&self.version.to_le_bytes());
        footer.extend_from_slice(&index_offset.to_le_bytes());
        footer.extend_from_slice(&index_size.to_le_bytes());
        footer.resize((self.footer_size as usize).max(footer.len()), 0);
        bytes.extend_from_slice(&footer);

        Ok(BuiltPak {
            bytes,
            header_offsets,
            index_offset,
            index_size,
        })
    }

    /// Lay out the archive and write it to a temporary file
    pub fn write_temp(&self) -> io::Result<NamedTempFile> {
        self.build()?.write_temp()
    }
}

/// Compress `data` into a single zlib stream
pub fn zlib_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn push_string(out: &mut Vec<u8>, text: &[u8], terminated: bool) {
    let len = text.len() + usize::from(terminated);
    out.extend_from_slice(&(len as u32).to_le_bytes());
    out.extend_from_slice(text);
    if terminated {
        out.push(0);
    }
}

/// Encode the header (without the offset field) and the stored payload bytes
fn encode_record(entry: &FixtureEntry) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let method = entry.compression.method();
    let block_size = entry.compression.block_size();

    let blocks: Vec<Vec<u8>> = if method == 0 {
        Vec::new()
    } else if entry.payload.is_empty() || block_size == 0 {
        vec![zlib_compress(&entry.payload)?]
    } else {
        entry
            .payload
            .chunks(block_size as usize)
            .map(zlib_compress)
            .collect::<io::Result<_>>()?
    };

    let stored: Vec<u8> = if method == 0 {
        entry.payload.clone()
    } else {
        blocks.concat()
    };

    let hash: [u8; 20] = if entry.hashed {
        Sha1::digest(&stored).into()
    } else {
        [0; 20]
    };

    let mut header = Vec::new();
    header.extend_from_slice(&(stored.len() as u64).to_le_bytes());
    header.extend_from_slice(&(entry.payload.len() as u64).to_le_bytes());
    header.extend_from_slice(&method.to_le_bytes());
    header.extend_from_slice(&hash);

    if method != 0 {
        // Block offsets are relative to the header offset, past the offset field
        // and the header itself
        let header_len = 8 + header.len() as u64 + 4 + 16 * blocks.len() as u64 + 1 + 4;
        header.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
        let mut start = header_len;
        for block in &blocks {
            let end = start + block.len() as u64;
            header.extend_from_slice(&start.to_le_bytes());
            header.extend_from_slice(&end.to_le_bytes());
            start = end;
        }
    }

    header.push(u8::from(entry.encrypted));
    header.extend_from_slice(&block_size.to_le_bytes());

    Ok((header, stored))
}
