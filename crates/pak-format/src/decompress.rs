//! Record payload materialization
//!
//! Uncompressed payloads are copied straight from the bytes that follow the
//! header. Zlib payloads are stored as independent streams, one per
//! compression block, whose offsets are relative to the record's header
//! offset. Every block but the last inflates to exactly the nominal block
//! size, so block `i` lands at output offset `i * nominal_block_size`.

use binrw::io::{Read, Seek, SeekFrom};
use flate2::read::ZlibDecoder;
use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

use crate::config::PakConfig;
use crate::cursor::ByteCursor;
use crate::error::{PakError, PakResult};
use crate::header::{CONTENT_HASH_LEN, CompressionMethod, RecordHeader};
use crate::index::RecordDescriptor;

/// Largest buffer reserved ahead of decompression
const MAX_RESERVATION: usize = 16 * 1024 * 1024;

/// Materialized record payload.
///
/// Encrypted records are returned undecrypted and tagged so the bytes are not
/// mistaken for plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// Plain payload bytes
    Plain(Vec<u8>),
    /// Payload still carries the archive's encryption
    StillEncrypted(Vec<u8>),
}

impl RecordData {
    /// Whether the bytes are still encrypted
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::StillEncrypted(_))
    }

    /// Borrow the bytes regardless of encryption state
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Plain(bytes) | Self::StillEncrypted(bytes) => bytes,
        }
    }

    /// Take the bytes regardless of encryption state
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Plain(bytes) | Self::StillEncrypted(bytes) => bytes,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Inflate one zlib stream that must yield exactly `expected` bytes
pub fn inflate_block(data: &[u8], expected: u64, block: usize) -> PakResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(MAX_RESERVATION as u64) as usize);
    // One extra byte is enough to detect an oversized block
    ZlibDecoder::new(data)
        .take(expected.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| PakError::DecompressionFailure {
            block,
            reason: format!("zlib: {e}"),
        })?;

    let produced = out.len() as u64;
    if produced > expected {
        return Err(PakError::DecompressionFailure {
            block,
            reason: format!("block inflates past the expected {expected} bytes"),
        });
    }
    if produced < expected {
        return Err(PakError::DecompressionFailure {
            block,
            reason: format!("expected {expected} decompressed bytes, got {produced}"),
        });
    }

    trace!("Block {}: {} -> {} bytes", block, data.len(), out.len());
    Ok(out)
}

/// Read and decode the payload of `descriptor`, whose header was already
/// decoded as `header`
pub fn read_payload<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    descriptor: &RecordDescriptor,
    header: &RecordHeader,
    config: &PakConfig,
) -> PakResult<RecordData> {
    if header.decompressed_size > config.max_record_size {
        return Err(PakError::MalformedHeader {
            reason: format!(
                "{} declares {} bytes, above the {}-byte limit",
                descriptor.name, header.decompressed_size, config.max_record_size
            ),
        });
    }

    let mut hasher = config.verify_hashes.then(Sha1::new);

    let bytes = match header.compression_method {
        CompressionMethod::None => {
            let data_offset = header.data_offset(descriptor.header_offset);
            debug!(
                "Reading {} stored bytes of {} at {}",
                header.compressed_size, descriptor.name, data_offset
            );
            cursor.seek(SeekFrom::Start(data_offset))?;
            let bytes = cursor.read_bytes(header.compressed_size)?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&bytes);
            }
            bytes
        }
        CompressionMethod::Zlib => {
            debug!(
                "Inflating {} from {} blocks ({} -> {} bytes)",
                descriptor.name,
                header.compression_blocks.len(),
                header.compressed_size,
                header.decompressed_size
            );
            inflate_blocks(cursor, descriptor, header, hasher.as_mut())?
        }
        method @ (CompressionMethod::BiasMemory | CompressionMethod::BiasSpeed) => {
            return Err(PakError::UnsupportedCompression(method));
        }
    };

    if let Some(hasher) = hasher
        && header.has_content_hash()
    {
        let actual: [u8; CONTENT_HASH_LEN] = hasher.finalize().into();
        if actual != header.content_hash {
            return Err(PakError::HashMismatch {
                name: descriptor.name.clone(),
                expected: header.content_hash,
                actual,
            });
        }
    }

    if header.is_encrypted {
        warn!(
            "{} is encrypted, returning {} undecrypted bytes",
            descriptor.name,
            bytes.len()
        );
        Ok(RecordData::StillEncrypted(bytes))
    } else {
        Ok(RecordData::Plain(bytes))
    }
}

fn inflate_blocks<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    descriptor: &RecordDescriptor,
    header: &RecordHeader,
    mut hasher: Option<&mut Sha1>,
) -> PakResult<Vec<u8>> {
    let total = usize::try_from(header.decompressed_size).map_err(|_| PakError::MalformedHeader {
        reason: format!(
            "decompressed size {} too large for this platform",
            header.decompressed_size
        ),
    })?;
    // Declared sizes are untrusted; the buffer grows with real output
    let mut output = Vec::with_capacity(total.min(MAX_RESERVATION));
    let nominal = u64::from(header.nominal_block_size);

    for (i, block) in header.compression_blocks.iter().enumerate() {
        let expected = header
            .block_output_len(i)
            .ok_or_else(|| PakError::DecompressionFailure {
                block: i,
                reason: format!(
                    "block starts past the {}-byte decompressed size",
                    header.decompressed_size
                ),
            })?;

        let offset = descriptor
            .header_offset
            .checked_add(block.start)
            .ok_or_else(|| PakError::MalformedHeader {
                reason: format!("block {i} offset overflows"),
            })?;

        trace!(
            "Block {}: seek {} (+{}), {} compressed bytes, output offset {}",
            i,
            offset,
            block.start,
            block.size,
            i as u64 * nominal
        );

        cursor.seek(SeekFrom::Start(offset))?;
        let compressed = cursor.read_bytes(block.size)?;
        if let Some(hasher) = hasher.as_deref_mut() {
            hasher.update(&compressed);
        }

        let inflated = inflate_block(&compressed, expected, i)?;
        debug_assert_eq!(output.len() as u64, i as u64 * nominal);
        output.extend_from_slice(&inflated);
    }

    if output.len() != total {
        return Err(PakError::DecompressionFailure {
            block: header.compression_blocks.len(),
            reason: format!(
                "blocks yielded {} of {} decompressed bytes",
                output.len(),
                total
            ),
        });
    }

    Ok(output)
}
