//! Reader configuration
//!
//! [`PakConfig`] carries the format constants the reader anchors on and the
//! opt-in behaviours (header caching, hash verification). Defaults match the
//! supported format revision.

use serde::{Deserialize, Serialize};

use crate::error::{PakError, PakResult};
use crate::{FOOTER_SIZE, PAK_MAGIC};

/// Bytes of the footer the reader actually interprets
const FOOTER_FIELDS_LEN: u64 = 24;

/// Pak reader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PakConfig {
    /// Distance of the footer from end-of-file
    pub footer_size: u64,
    /// Signature the footer must carry
    pub expected_magic: u32,
    /// Keep parsed record headers until the next `load_records`
    pub cache_headers: bool,
    /// Check the SHA-1 of stored payload bytes against the header
    pub verify_hashes: bool,
    /// Largest payload a single read may materialize, in bytes
    pub max_record_size: u64,
    /// Largest record count accepted from the index
    pub max_records: u32,
}

impl Default for PakConfig {
    fn default() -> Self {
        Self {
            footer_size: FOOTER_SIZE,
            expected_magic: PAK_MAGIC,
            cache_headers: false,
            verify_hashes: false,
            max_record_size: 1024 * 1024 * 1024, // 1 GiB
            max_records: 1 << 24,
        }
    }
}

impl PakConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer distance from end-of-file
    pub fn with_footer_size(mut self, footer_size: u64) -> Self {
        self.footer_size = footer_size;
        self
    }

    /// Set the expected footer signature
    pub fn with_expected_magic(mut self, magic: u32) -> Self {
        self.expected_magic = magic;
        self
    }

    /// Enable or disable the header cache
    pub fn with_header_cache(mut self, enabled: bool) -> Self {
        self.cache_headers = enabled;
        self
    }

    /// Enable or disable content hash verification
    pub fn with_hash_verification(mut self, enabled: bool) -> Self {
        self.verify_hashes = enabled;
        self
    }

    /// Set the payload size limit
    pub fn with_max_record_size(mut self, max_bytes: u64) -> Self {
        self.max_record_size = max_bytes;
        self
    }

    /// Set the record count limit
    pub fn with_max_records(mut self, max_records: u32) -> Self {
        self.max_records = max_records;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> PakResult<()> {
        if self.footer_size < FOOTER_FIELDS_LEN {
            return Err(PakError::InvalidConfig(format!(
                "footer_size must be at least {FOOTER_FIELDS_LEN} bytes, got {}",
                self.footer_size
            )));
        }

        if i64::try_from(self.footer_size).is_err() {
            return Err(PakError::InvalidConfig(format!(
                "footer_size {} does not fit a signed offset",
                self.footer_size
            )));
        }

        if self.max_record_size == 0 {
            return Err(PakError::InvalidConfig(
                "max_record_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PakConfig::default();
        assert_eq!(config.footer_size, 204);
        assert_eq!(config.expected_magic, 0x5A6F12E1);
        assert!(!config.cache_headers);
        assert!(!config.verify_hashes);
        config.validate().unwrap();
    }

    #[test]
    fn test_builder_setters() {
        let config = PakConfig::new()
            .with_footer_size(44)
            .with_header_cache(true)
            .with_hash_verification(true)
            .with_max_record_size(4096)
            .with_max_records(10);
        assert_eq!(config.footer_size, 44);
        assert!(config.cache_headers);
        assert!(config.verify_hashes);
        assert_eq!(config.max_record_size, 4096);
        assert_eq!(config.max_records, 10);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            PakConfig::new().with_footer_size(8).validate(),
            Err(PakError::InvalidConfig(_))
        ));
        assert!(PakConfig::new().with_footer_size(u64::MAX).validate().is_err());
        assert!(PakConfig::new().with_max_record_size(0).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PakConfig =
            serde_json::from_str(r#"{"cache_headers": true, "footer_size": 221}"#).unwrap();
        assert!(config.cache_headers);
        assert_eq!(config.footer_size, 221);
        assert_eq!(config.expected_magic, PAK_MAGIC);
    }
}
