//! Index table parsing and the record directory
//!
//! The index lives at the footer's `index_offset`:
//!
//! ```text
//! mount_point_len u32
//! mount_point     [u8; mount_point_len]   (NUL-terminated)
//! record_count    u32
//! records         [entry; record_count]
//!
//! entry:
//!   name_len      u32
//!   name          [u8; name_len]          (NUL-terminated)
//!   header_offset u64
//!   header fields (same layout as the record header, skipped)
//! ```

use std::collections::HashMap;

use binrw::io::{Read, Seek, SeekFrom};
use tracing::{debug, info, warn};

use crate::config::PakConfig;
use crate::cursor::ByteCursor;
use crate::error::{PakError, PakResult};
use crate::footer::Footer;
use crate::header::skip_record_header;

/// Name and header location of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// Record name as stored in the index, terminator removed
    pub name: String,
    /// Absolute offset of the record header
    pub header_offset: u64,
}

/// Records of one archive in on-disk index order, with lookup by name.
///
/// Names are unique: when the index repeats a name, the first entry is kept.
#[derive(Debug, Clone, Default)]
pub struct ArchiveDirectory {
    mount_point: String,
    records: Vec<RecordDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ArchiveDirectory {
    /// Mount point recorded in the index
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Look up a record by exact name
    pub fn get(&self, name: &str) -> Option<&RecordDescriptor> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    /// Check whether a record exists
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check whether the directory has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in index order
    pub fn iter(&self) -> impl Iterator<Item = &RecordDescriptor> {
        self.records.iter()
    }

    /// Iterate record names in index order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    /// Insert a descriptor, returning `false` if the name was already taken
    fn insert(&mut self, descriptor: RecordDescriptor) -> bool {
        if self.by_name.contains_key(&descriptor.name) {
            return false;
        }
        self.by_name
            .insert(descriptor.name.clone(), self.records.len());
        self.records.push(descriptor);
        true
    }
}

impl<'a> IntoIterator for &'a ArchiveDirectory {
    type Item = &'a RecordDescriptor;
    type IntoIter = std::slice::Iter<'a, RecordDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Drop a single trailing NUL terminator, if present
fn strip_terminator(mut text: String) -> String {
    if text.ends_with('\0') {
        text.pop();
    }
    text
}

/// Parse the index table the footer points at.
///
/// Any truncation or undecodable entry is reported as
/// [`PakError::IndexCorrupt`]; nothing is returned for a partial index.
pub fn read_index<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    footer: &Footer,
    config: &PakConfig,
) -> PakResult<ArchiveDirectory> {
    let stream_len = cursor.stream_len()?;
    if footer.index_offset >= stream_len {
        return Err(PakError::IndexCorrupt {
            reason: format!(
                "index offset {} lies outside the {stream_len}-byte archive",
                footer.index_offset
            ),
        });
    }

    cursor.seek(SeekFrom::Start(footer.index_offset))?;

    let mount_len = cursor
        .read_u32_le()
        .map_err(|e| e.into_index_corrupt("mount point length"))?;
    let mount_bytes = cursor
        .read_bytes(u64::from(mount_len))
        .map_err(|e| e.into_index_corrupt("mount point"))?;
    let mount_point =
        strip_terminator(String::from_utf8_lossy(&mount_bytes).into_owned());

    let record_count = cursor
        .read_u32_le()
        .map_err(|e| e.into_index_corrupt("record count"))?;
    if record_count > config.max_records {
        return Err(PakError::IndexCorrupt {
            reason: format!(
                "record count {record_count} exceeds limit of {}",
                config.max_records
            ),
        });
    }

    debug!(
        "Index at {}: mount point {:?}, {} records",
        footer.index_offset, mount_point, record_count
    );

    let mut directory = ArchiveDirectory {
        mount_point,
        records: Vec::with_capacity(record_count.min(65_536) as usize),
        by_name: HashMap::new(),
    };

    for i in 0..record_count {
        let descriptor = read_entry(cursor)
            .map_err(|e| e.into_index_corrupt(&format!("record {i} of {record_count}")))?;

        if cursor.position() > stream_len {
            return Err(PakError::IndexCorrupt {
                reason: format!(
                    "record {i} of {record_count} ({}) runs past end of archive",
                    descriptor.name
                ),
            });
        }

        if !directory.insert(descriptor.clone()) {
            warn!(
                "Duplicate record name {:?} at header offset {}, keeping first entry",
                descriptor.name, descriptor.header_offset
            );
        }
    }

    info!(
        "Loaded pak index: version {}, {} records, mount point {:?}",
        footer.version,
        directory.len(),
        directory.mount_point
    );

    Ok(directory)
}

fn read_entry<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> PakResult<RecordDescriptor> {
    let name_position = cursor.position();
    let name_len = cursor.read_u32_le()?;
    if name_len == 0 {
        return Err(PakError::IndexCorrupt {
            reason: format!("empty record name at offset {name_position}"),
        });
    }

    let name = strip_terminator(cursor.read_text(u64::from(name_len))?);
    let header_offset = cursor.read_u64_le()?;
    skip_record_header(cursor)?;

    Ok(RecordDescriptor {
        name,
        header_offset,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::PAK_MAGIC;
    use std::io::Cursor;

    fn push_string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u32 + 1).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }

    fn push_entry(out: &mut Vec<u8>, name: &str, header_offset: u64, method: u32) {
        push_string(out, name);
        out.extend_from_slice(&header_offset.to_le_bytes());
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&[0u8; 20]);
        if method != 0 {
            out.extend_from_slice(&2u32.to_le_bytes());
            out.extend_from_slice(&[0u8; 32]);
        }
        out.extend_from_slice(&[0u8; 5]);
    }

    /// 16 bytes of payload area, then the index
    fn index_archive(entries: &[(&str, u64, u32)], record_count: u32) -> (Vec<u8>, Footer) {
        let mut data = vec![0u8; 16];
        let index_offset = data.len() as u64;
        push_string(&mut data, "../../../");
        data.extend_from_slice(&record_count.to_le_bytes());
        for (name, offset, method) in entries {
            push_entry(&mut data, name, *offset, *method);
        }
        let footer = Footer {
            magic: PAK_MAGIC,
            version: 8,
            index_offset,
            index_size: data.len() as u64 - index_offset,
        };
        (data, footer)
    }

    fn parse(data: Vec<u8>, footer: &Footer) -> PakResult<ArchiveDirectory> {
        let mut cursor = ByteCursor::new(Cursor::new(data)).unwrap();
        read_index(&mut cursor, footer, &PakConfig::default())
    }

    #[test]
    fn test_index_order_and_lookup() {
        let (data, footer) = index_archive(
            &[("z.txt", 0, 0), ("a/b.bin", 100, 1), ("m.json", 50, 0)],
            3,
        );
        let directory = parse(data, &footer).unwrap();

        assert_eq!(directory.mount_point(), "../../../");
        assert_eq!(
            directory.names().collect::<Vec<_>>(),
            vec!["z.txt", "a/b.bin", "m.json"]
        );
        assert_eq!(directory.get("a/b.bin").unwrap().header_offset, 100);
        assert!(directory.contains("m.json"));
        assert!(!directory.contains("m.json\0"));
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let (data, footer) = index_archive(&[("a.txt", 10, 0), ("a.txt", 20, 0)], 2);
        let directory = parse(data, &footer).unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("a.txt").unwrap().header_offset, 10);
    }

    #[test]
    fn test_count_exceeding_entries_is_corrupt() {
        let (data, footer) = index_archive(&[("a.txt", 0, 0)], 2);
        let err = parse(data, &footer).unwrap_err();
        assert!(matches!(err, PakError::IndexCorrupt { .. }), "{err}");
    }

    #[test]
    fn test_unknown_method_in_index_is_corrupt() {
        let (data, footer) = index_archive(&[("a.txt", 0, 7)], 1);
        assert!(matches!(
            parse(data, &footer),
            Err(PakError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn test_index_offset_outside_archive() {
        let (data, mut footer) = index_archive(&[], 0);
        footer.index_offset = 10_000;
        assert!(matches!(
            parse(data, &footer),
            Err(PakError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn test_record_count_limit() {
        let (data, footer) = index_archive(&[("a.txt", 0, 0)], 1);
        let mut cursor = ByteCursor::new(Cursor::new(data)).unwrap();
        let config = PakConfig::default().with_max_records(0);
        assert!(matches!(
            read_index(&mut cursor, &footer, &config),
            Err(PakError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn test_strip_terminator_only_strips_nul() {
        assert_eq!(strip_terminator("a.txt\0".into()), "a.txt");
        assert_eq!(strip_terminator("a.txt".into()), "a.txt");
    }
}
