//! Record header structures and decoding
//!
//! A record header lives at the record's `header_offset`, behind an 8-byte
//! offset field, and has this layout (all integers little-endian):
//!
//! ```text
//! compressed_size    u64
//! decompressed_size  u64
//! compression_method u32
//! content_hash       [u8; 20]
//! block_count        u32                 \ only when compression_method != 0
//! blocks             [{start, end}; n]   /
//! is_encrypted       u8
//! nominal_block_size u32
//! ```
//!
//! The index repeats the same fields for every entry, which is why
//! [`skip_record_header`] exists next to [`decode_record_header`].

use std::fmt;

use binrw::io::{Read, Seek};
use binrw::{BinRead, Endian};

use crate::cursor::{ByteCursor, FixedSize};
use crate::error::{PakError, PakResult};

/// Length of the SHA-1 content hash stored in every header
pub const CONTENT_HASH_LEN: usize = 20;

/// Size of the offset field that precedes a header at `header_offset`
pub const HEADER_OFFSET_FIELD_LEN: u64 = 8;

/// Payload compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CompressionMethod {
    /// Stored as-is
    None = 0,
    /// Block-wise zlib streams
    Zlib = 1,
    /// Reserved, no read support
    BiasMemory = 2,
    /// Reserved, no read support
    BiasSpeed = 3,
}

impl CompressionMethod {
    /// Parse from the on-disk value
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Zlib),
            2 => Some(Self::BiasMemory),
            3 => Some(Self::BiasSpeed),
            _ => None,
        }
    }

    /// On-disk value
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether payloads carry a compression block table
    pub fn has_blocks(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Zlib => "Zlib",
            Self::BiasMemory => "BiasMemory",
            Self::BiasSpeed => "BiasSpeed",
        };
        write!(f, "{name}")
    }
}

/// On-disk block range, stored as start/end pairs
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct BlockRange {
    start: u64,
    end: u64,
}

impl FixedSize for BlockRange {
    const SIZE: u64 = 16;
}

/// One independently compressed chunk of a record payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionBlock {
    /// Offset relative to the record's `header_offset`
    pub start: u64,
    /// Compressed length in bytes
    pub size: u64,
}

impl CompressionBlock {
    /// Offset one past the last compressed byte, relative to `header_offset`
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// Decoded record header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Stored payload size in bytes
    pub compressed_size: u64,
    /// Payload size after decompression
    pub decompressed_size: u64,
    /// Compression applied to the payload
    pub compression_method: CompressionMethod,
    /// SHA-1 digest recorded by the archiver
    pub content_hash: [u8; CONTENT_HASH_LEN],
    /// Block table, in decompression order; empty for uncompressed records
    pub compression_blocks: Vec<CompressionBlock>,
    /// Decompressed size of every block but the last
    pub nominal_block_size: u32,
    /// Payload is encrypted; no decryption is performed
    pub is_encrypted: bool,
}

impl RecordHeader {
    /// Encoded length of the header, excluding the leading offset field
    pub fn encoded_len(&self) -> u64 {
        let blocks = if self.compression_method.has_blocks() {
            4 + BlockRange::SIZE * self.compression_blocks.len() as u64
        } else {
            0
        };
        8 + 8 + 4 + CONTENT_HASH_LEN as u64 + blocks + 1 + 4
    }

    /// Absolute offset of the payload for a record whose header starts at
    /// `header_offset`
    pub fn data_offset(&self, header_offset: u64) -> u64 {
        header_offset + HEADER_OFFSET_FIELD_LEN + self.encoded_len()
    }

    /// Expected decompressed length of block `index`.
    ///
    /// Every block but the last yields `nominal_block_size` bytes; the last
    /// yields the remainder, or a full block when the size divides evenly.
    /// Returns `None` when the block lies entirely past `decompressed_size`.
    pub fn block_output_len(&self, index: usize) -> Option<u64> {
        let nominal = u64::from(self.nominal_block_size);
        let start = (index as u64).checked_mul(nominal)?;
        if self.decompressed_size == 0 && index == 0 {
            return Some(0);
        }
        if start >= self.decompressed_size {
            return None;
        }
        Some((self.decompressed_size - start).min(nominal))
    }

    /// Whether a content hash was recorded at all
    pub fn has_content_hash(&self) -> bool {
        self.content_hash.iter().any(|&b| b != 0)
    }

    fn validate(&self) -> PakResult<()> {
        if self.compression_method.has_blocks() {
            if self.compression_blocks.is_empty() {
                return Err(malformed(format!(
                    "{} record has an empty block table",
                    self.compression_method
                )));
            }
            if self.nominal_block_size == 0 && self.decompressed_size > 0 {
                return Err(malformed(format!(
                    "{} record has a zero nominal block size",
                    self.compression_method
                )));
            }
        } else if !self.is_encrypted && self.compressed_size != self.decompressed_size {
            return Err(malformed(format!(
                "uncompressed record sizes disagree: stored {} bytes, decompressed {} bytes",
                self.compressed_size, self.decompressed_size
            )));
        }
        Ok(())
    }
}

fn malformed(reason: String) -> PakError {
    PakError::MalformedHeader { reason }
}

fn read_method<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> PakResult<CompressionMethod> {
    let position = cursor.position();
    let raw = cursor.read_u32_le()?;
    CompressionMethod::from_u32(raw).ok_or_else(|| {
        malformed(format!(
            "unknown compression method {raw} at offset {position}"
        ))
    })
}

/// Decode a record header at the cursor's position.
///
/// Truncation is reported as [`PakError::MalformedHeader`].
pub fn decode_record_header<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
) -> PakResult<RecordHeader> {
    decode_fields(cursor).map_err(PakError::into_malformed_header)
}

fn decode_fields<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> PakResult<RecordHeader> {
    let compressed_size = cursor.read_u64_le()?;
    let decompressed_size = cursor.read_u64_le()?;
    let compression_method = read_method(cursor)?;
    let content_hash = cursor.read_array::<CONTENT_HASH_LEN>()?;

    let compression_blocks = if compression_method.has_blocks() {
        let count = cursor.read_u32_le()?;
        // Bound the reservation; a corrupt count fails on the reads below.
        let mut blocks = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let position = cursor.position();
            let range: BlockRange = cursor.read(Endian::Little)?;
            let size = range.end.checked_sub(range.start).ok_or_else(|| {
                malformed(format!(
                    "block at offset {position} ends before it starts ({} < {})",
                    range.end, range.start
                ))
            })?;
            blocks.push(CompressionBlock {
                start: range.start,
                size,
            });
        }
        blocks
    } else {
        Vec::new()
    };

    let is_encrypted = cursor.read_u8()? != 0;
    let nominal_block_size = cursor.read_u32_le()?;

    let header = RecordHeader {
        compressed_size,
        decompressed_size,
        compression_method,
        content_hash,
        compression_blocks,
        nominal_block_size,
        is_encrypted,
    };
    header.validate()?;
    Ok(header)
}

/// Advance past a header without keeping any of it.
///
/// Only the compression method and block count are read, since they decide
/// the layout. Seeking past the end of the resource is not detected here.
pub fn skip_record_header<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> PakResult<()> {
    cursor.skip(16)?;
    let method = read_method(cursor)?;
    cursor.skip(CONTENT_HASH_LEN as u64)?;
    if method.has_blocks() {
        let count = cursor.read_u32_le()?;
        cursor.skip(BlockRange::SIZE * u64::from(count))?;
    }
    cursor.skip(5)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(
        compressed: u64,
        decompressed: u64,
        method: u32,
        blocks: &[(u64, u64)],
        encrypted: bool,
        block_size: u32,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&compressed.to_le_bytes());
        out.extend_from_slice(&decompressed.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&[0xAB; 20]);
        if method != 0 {
            out.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
            for (start, end) in blocks {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&end.to_le_bytes());
            }
        }
        out.push(u8::from(encrypted));
        out.extend_from_slice(&block_size.to_le_bytes());
        out
    }

    fn decode(bytes: Vec<u8>) -> PakResult<RecordHeader> {
        let mut cursor = ByteCursor::new(Cursor::new(bytes)).unwrap();
        decode_record_header(&mut cursor)
    }

    #[test]
    fn test_decode_uncompressed_header() {
        let bytes = encode(5, 5, 0, &[], false, 0);
        let len = bytes.len() as u64;
        let header = decode(bytes).unwrap();

        assert_eq!(header.compressed_size, 5);
        assert_eq!(header.decompressed_size, 5);
        assert_eq!(header.compression_method, CompressionMethod::None);
        assert_eq!(header.content_hash, [0xAB; 20]);
        assert!(header.compression_blocks.is_empty());
        assert!(!header.is_encrypted);
        assert_eq!(header.encoded_len(), len);
        assert_eq!(header.data_offset(100), 100 + 8 + len);
    }

    #[test]
    fn test_decode_zlib_header_converts_end_offsets() {
        let bytes = encode(30, 100, 1, &[(60, 75), (75, 90)], true, 64);
        let len = bytes.len() as u64;
        let header = decode(bytes).unwrap();

        assert_eq!(header.compression_method, CompressionMethod::Zlib);
        assert_eq!(
            header.compression_blocks,
            vec![
                CompressionBlock { start: 60, size: 15 },
                CompressionBlock { start: 75, size: 15 },
            ]
        );
        assert!(header.is_encrypted);
        assert_eq!(header.nominal_block_size, 64);
        assert_eq!(header.encoded_len(), len);
    }

    #[test]
    fn test_unknown_method_is_malformed() {
        let err = decode(encode(5, 5, 9, &[], false, 0)).unwrap_err();
        assert!(matches!(err, PakError::MalformedHeader { .. }));
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let mut bytes = encode(30, 100, 1, &[(60, 75)], false, 64);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            decode(bytes),
            Err(PakError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_block_table_cut_mid_entry_is_malformed() {
        let mut bytes = encode(30, 100, 1, &[(60, 75), (75, 90)], false, 64);
        // Keep the first block and half of the second
        bytes.truncate(40 + 4 + 16 + 8);
        let err = decode(bytes).unwrap_err();
        assert!(matches!(err, PakError::MalformedHeader { .. }), "{err}");
    }

    #[test]
    fn test_block_ending_before_start_is_malformed() {
        let err = decode(encode(30, 100, 1, &[(80, 60)], false, 64)).unwrap_err();
        assert!(matches!(err, PakError::MalformedHeader { .. }));
    }

    #[test]
    fn test_compressed_record_without_blocks_is_malformed() {
        let err = decode(encode(30, 100, 1, &[], false, 64)).unwrap_err();
        assert!(matches!(err, PakError::MalformedHeader { .. }));
    }

    #[test]
    fn test_uncompressed_size_mismatch_is_malformed() {
        assert!(decode(encode(5, 7, 0, &[], false, 0)).is_err());
        // Encrypted payloads are padded, so the sizes may differ
        assert!(decode(encode(16, 7, 0, &[], true, 0)).is_ok());
    }

    #[test]
    fn test_block_output_len_remainder() {
        let header = decode(encode(1, 150, 1, &[(0, 1), (1, 2), (2, 3)], false, 64)).unwrap();
        assert_eq!(header.block_output_len(0), Some(64));
        assert_eq!(header.block_output_len(1), Some(64));
        assert_eq!(header.block_output_len(2), Some(22));
        assert_eq!(header.block_output_len(3), None);
    }

    #[test]
    fn test_block_output_len_exact_multiple() {
        let header = decode(encode(1, 128, 1, &[(0, 1), (1, 2)], false, 64)).unwrap();
        assert_eq!(header.block_output_len(1), Some(64));
        assert_eq!(header.block_output_len(2), None);
    }

    #[test]
    fn test_skip_matches_decode_length() {
        for bytes in [
            encode(5, 5, 0, &[], false, 0),
            encode(30, 100, 1, &[(60, 75), (75, 90), (90, 99)], false, 64),
            encode(30, 100, 2, &[(60, 75)], false, 64),
        ] {
            let len = bytes.len() as u64;
            let mut cursor = ByteCursor::new(Cursor::new(bytes)).unwrap();
            skip_record_header(&mut cursor).unwrap();
            assert_eq!(cursor.position(), len);
        }
    }

    #[test]
    fn test_method_display_and_values() {
        assert_eq!(CompressionMethod::BiasSpeed.to_string(), "BiasSpeed");
        assert_eq!(CompressionMethod::from_u32(1), Some(CompressionMethod::Zlib));
        assert_eq!(CompressionMethod::from_u32(4), None);
        assert_eq!(CompressionMethod::BiasMemory.as_u32(), 2);
    }
}
