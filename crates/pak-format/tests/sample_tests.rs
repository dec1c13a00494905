//! Tests against a real archive named by `PAK_SAMPLE_FILE`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pak_format::{PakArchive, PakConfig, PakError};
use test_utils::require_pak_sample;

#[test]
#[ignore = "requires PAK_SAMPLE_FILE"]
fn test_real_archive_loads_and_reads() {
    let path = require_pak_sample!();

    let config = PakConfig::default().with_header_cache(true);
    let mut archive = PakArchive::open_with_config(&path, config).unwrap();
    archive.load_records().unwrap();

    println!(
        "{}: version {:?}, {} records, mount point {:?}",
        path.display(),
        archive.version(),
        archive.len(),
        archive.mount_point()
    );

    let mut plain = 0usize;
    let mut encrypted = 0usize;
    for (name, result) in archive.read_all() {
        let header = archive.read_header(name).unwrap();
        match result {
            Ok(data) if data.is_encrypted() => encrypted += 1,
            Ok(data) => {
                assert_eq!(data.len() as u64, header.decompressed_size, "{name}");
                plain += 1;
            }
            Err(PakError::UnsupportedCompression(method)) => {
                println!("{name}: skipped {method} record");
            }
            // Zlib over ciphertext does not inflate
            Err(PakError::DecompressionFailure { .. }) if header.is_encrypted => encrypted += 1,
            Err(e) => panic!("{name}: {e}"),
        }
    }

    println!("{plain} plain records, {encrypted} encrypted");
    assert_eq!(archive.list_names().len(), archive.directory().len());
}
