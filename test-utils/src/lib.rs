//! Test utilities for pak-rs
//!
//! Provides synthetic archive fixtures and discovery of real archive samples
//! for tests and examples.

mod fixture;

use std::path::{Path, PathBuf};

pub use fixture::{
    BuiltPak, FIXTURE_FOOTER_SIZE, FIXTURE_MAGIC, FixtureCompression, FixtureEntry,
    PakFixtureBuilder, zlib_compress,
};

/// Environment variable naming a real archive to test against
pub const SAMPLE_ENV_VAR: &str = "PAK_SAMPLE_FILE";

/// Environment variable naming a directory of real archives
pub const SAMPLE_DIR_ENV_VAR: &str = "PAK_SAMPLE_DIR";

/// Smallest file that can hold the 204-byte footer
const MIN_SAMPLE_SIZE: u64 = 204;

/// Attempts to locate a real archive sample
pub fn find_pak_sample() -> Option<PathBuf> {
    // Strategy 1: Explicit file
    if let Ok(path) = std::env::var(SAMPLE_ENV_VAR) {
        let path = PathBuf::from(shellexpand::tilde(&path).to_string());
        if is_valid_pak_sample(&path) {
            return Some(path);
        }
    }

    // Strategy 2: First archive in the sample directory
    let dir = std::env::var(SAMPLE_DIR_ENV_VAR).ok()?;
    let dir = PathBuf::from(shellexpand::tilde(&dir).to_string());
    find_pak_in_directory(&dir)
}

/// Find the first `.pak` file in a directory, by name
fn find_pak_in_directory(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "pak"))
        .filter(|path| is_valid_pak_sample(path))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Check if a path is a regular file large enough to hold a footer
pub fn is_valid_pak_sample(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() >= MIN_SAMPLE_SIZE)
}

/// Print instructions for pointing tests at real archives
pub fn print_setup_instructions() {
    println!("Pak Sample Setup Instructions:");
    println!("==============================");
    println!();
    println!("To run tests that require a real archive, set one of:");
    println!();
    println!("  {SAMPLE_ENV_VAR} = /path/to/archive.pak");
    println!("  {SAMPLE_DIR_ENV_VAR} = /path/to/directory/with/paks");
    println!();
    println!("Examples:");
    println!("  export {SAMPLE_ENV_VAR}=\"$HOME/Downloads/000-TestPak_P.pak\"");
    println!("  export {SAMPLE_DIR_ENV_VAR}=\"$HOME/Games/Content/Paks\"");
}

/// Get a sample path or skip the test with a helpful message
#[macro_export]
macro_rules! require_pak_sample {
    () => {
        match $crate::find_pak_sample() {
            Some(path) => path,
            None => {
                println!("Skipping test - no pak sample found");
                $crate::print_setup_instructions();
                return;
            }
        }
    };
}
