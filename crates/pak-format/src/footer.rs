//! Archive footer decoding
//!
//! The footer sits a fixed distance before end-of-file. Only its leading
//! 24 bytes are interpreted:
//!
//! ```text
//! magic        u32  (must equal 0x5A6F12E1)
//! version      u32
//! index_offset u64  (absolute)
//! index_size   u64
//! ```

use binrw::BinRead;
use binrw::io::{Read, Seek};
use tracing::debug;

use crate::cursor::{ByteCursor, FixedSize};
use crate::error::{PakError, PakResult};

/// Footer fields used to locate the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(little)]
pub struct Footer {
    /// Archive signature
    pub magic: u32,
    /// Format version, informational only
    pub version: u32,
    /// Absolute offset of the index table
    pub index_offset: u64,
    /// Size of the index table in bytes
    pub index_size: u64,
}

impl FixedSize for Footer {
    const SIZE: u64 = 24;
}

impl Footer {
    /// Locate and decode the footer `footer_size` bytes before end-of-file.
    ///
    /// The signature is checked before any other field is trusted.
    pub fn locate<R: Read + Seek>(
        cursor: &mut ByteCursor<R>,
        footer_size: u64,
        expected_magic: u32,
    ) -> PakResult<Self> {
        let distance = i64::try_from(footer_size)
            .map_err(|_| PakError::InvalidConfig(format!("footer size {footer_size} too large")))?;

        let footer = cursor
            .seek_to(-distance)
            .and_then(|_| cursor.read::<Self>(binrw::Endian::Little))
            .map_err(|err| err.into_index_corrupt("footer"))?;

        if footer.magic != expected_magic {
            return Err(PakError::BadMagic {
                expected: expected_magic,
                found: footer.magic,
            });
        }

        debug!(
            "Footer: version={}, index_offset={}, index_size={}",
            footer.version, footer.index_offset, footer.index_size
        );

        Ok(footer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{FOOTER_SIZE, PAK_MAGIC};
    use std::io::Cursor;

    fn archive_with_footer(magic: u32) -> Vec<u8> {
        let mut data = vec![0xCC; 40];
        let mut footer = vec![0u8; FOOTER_SIZE as usize];
        footer[0..4].copy_from_slice(&magic.to_le_bytes());
        footer[4..8].copy_from_slice(&8u32.to_le_bytes());
        footer[8..16].copy_from_slice(&40u64.to_le_bytes());
        footer[16..24].copy_from_slice(&12u64.to_le_bytes());
        data.extend_from_slice(&footer);
        data
    }

    #[test]
    fn test_read_footer() {
        let mut cursor = ByteCursor::new(Cursor::new(archive_with_footer(PAK_MAGIC))).unwrap();
        let footer = Footer::locate(&mut cursor, FOOTER_SIZE, PAK_MAGIC).unwrap();
        assert_eq!(
            footer,
            Footer {
                magic: PAK_MAGIC,
                version: 8,
                index_offset: 40,
                index_size: 12,
            }
        );
        assert_eq!(cursor.position(), 40 + 24);
    }

    #[test]
    fn test_magic_bytes_on_disk() {
        let data = archive_with_footer(PAK_MAGIC);
        assert_eq!(&data[40..44], &[0xE1, 0x12, 0x6F, 0x5A]);
    }

    #[test]
    fn test_bad_magic() {
        let mut cursor = ByteCursor::new(Cursor::new(archive_with_footer(0x12345678))).unwrap();
        let err = Footer::locate(&mut cursor, FOOTER_SIZE, PAK_MAGIC).unwrap_err();
        assert!(matches!(
            err,
            PakError::BadMagic {
                expected: PAK_MAGIC,
                found: 0x12345678
            }
        ));
    }

    #[test]
    fn test_file_smaller_than_footer() {
        let mut cursor = ByteCursor::new(Cursor::new(vec![0u8; 100])).unwrap();
        let err = Footer::locate(&mut cursor, FOOTER_SIZE, PAK_MAGIC).unwrap_err();
        assert!(matches!(err, PakError::IndexCorrupt { .. }));
    }

    #[test]
    fn test_footer_cut_short_is_corrupt() {
        // Only 12 of the 24 footer bytes remain after the anchor
        let mut data = archive_with_footer(PAK_MAGIC);
        data.truncate(40 + 12);
        let mut cursor = ByteCursor::new(Cursor::new(data)).unwrap();
        let err = Footer::locate(&mut cursor, 12, PAK_MAGIC).unwrap_err();
        assert!(matches!(err, PakError::IndexCorrupt { .. }), "{err}");
    }
}
