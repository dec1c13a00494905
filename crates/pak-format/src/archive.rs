//! Archive handle and record access
//!
//! [`PakArchive`] owns the storage cursor, the record directory built by
//! [`PakArchive::load_records`] and the optional header cache. Record headers
//! are re-read from storage on every access unless caching is enabled in
//! [`PakConfig`].
//!
//! All reads go through one cursor guarded by a mutex, so a handle can be
//! shared between threads but reads are serialized. For parallel reads over a
//! file, [`PakArchive::reopen`] gives an independent handle that shares the
//! loaded directory.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use binrw::io::{Read, Seek, SeekFrom};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::PakConfig;
use crate::cursor::ByteCursor;
use crate::decompress::{RecordData, read_payload};
use crate::error::{PakError, PakResult};
use crate::footer::Footer;
use crate::header::{HEADER_OFFSET_FIELD_LEN, RecordHeader, decode_record_header};
use crate::index::{ArchiveDirectory, RecordDescriptor, read_index};

type HeaderCache = Arc<Mutex<HashMap<String, RecordHeader>>>;

/// Pak archive reader
pub struct PakArchive<R> {
    cursor: Mutex<ByteCursor<R>>,
    config: PakConfig,
    path: Option<PathBuf>,
    footer: Option<Footer>,
    directory: Arc<ArchiveDirectory>,
    header_cache: HeaderCache,
}

impl PakArchive<File> {
    /// Open an archive file from path with default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> PakResult<Self> {
        Self::open_with_config(path, PakConfig::default())
    }

    /// Open an archive file from path
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PakConfig) -> PakResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = Self::from_file_with_config(file, config)
            .map_err(|err| match err {
                PakError::NotAFile(_) => PakError::NotAFile(path.display().to_string()),
                other => other,
            })?;
        archive.path = Some(path.to_path_buf());
        debug!("Opened pak archive {}", path.display());
        Ok(archive)
    }

    /// Wrap an already open file, rejecting anything but a regular file
    pub fn from_file_with_config(file: File, config: PakConfig) -> PakResult<Self> {
        if !file.metadata()?.is_file() {
            return Err(PakError::NotAFile("storage handle".to_string()));
        }
        Self::from_reader_with_config(file, config)
    }

    /// Open a second, independent handle on the same file.
    ///
    /// The new handle has its own cursor and shares the loaded directory and
    /// header cache, so reads on the two handles do not contend.
    pub fn reopen(&self) -> PakResult<Self> {
        let path = self.path.as_ref().ok_or_else(|| {
            PakError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "archive was not opened from a path",
            ))
        })?;
        let file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(PakError::NotAFile(path.display().to_string()));
        }

        Ok(Self {
            cursor: Mutex::new(ByteCursor::new(file)?),
            config: self.config.clone(),
            path: Some(path.clone()),
            footer: self.footer,
            directory: Arc::clone(&self.directory),
            header_cache: Arc::clone(&self.header_cache),
        })
    }
}

impl<R: Read + Seek> PakArchive<R> {
    /// Wrap any seekable reader with default configuration
    pub fn from_reader(reader: R) -> PakResult<Self> {
        Self::from_reader_with_config(reader, PakConfig::default())
    }

    /// Wrap any seekable reader
    pub fn from_reader_with_config(reader: R, config: PakConfig) -> PakResult<Self> {
        config.validate()?;
        Ok(Self {
            cursor: Mutex::new(ByteCursor::new(reader)?),
            config,
            path: None,
            footer: None,
            directory: Arc::new(ArchiveDirectory::default()),
            header_cache: Arc::default(),
        })
    }

    /// Parse the footer and index into the record directory.
    ///
    /// Replaces any previously loaded directory and clears the header cache.
    /// On failure the directory is left empty.
    pub fn load_records(&mut self) -> PakResult<()> {
        self.footer = None;
        self.directory = Arc::new(ArchiveDirectory::default());
        self.header_cache.lock().clear();

        let cursor = self.cursor.get_mut();
        let footer = Footer::locate(
            cursor,
            self.config.footer_size,
            self.config.expected_magic,
        )?;
        let directory = read_index(cursor, &footer, &self.config)?;

        self.footer = Some(footer);
        self.directory = Arc::new(directory);
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &PakConfig {
        &self.config
    }

    /// Decoded footer, once records are loaded
    pub fn footer(&self) -> Option<&Footer> {
        self.footer.as_ref()
    }

    /// Archive format version, once records are loaded
    pub fn version(&self) -> Option<u32> {
        self.footer.map(|f| f.version)
    }

    /// Absolute offset of the index table, once records are loaded
    pub fn index_offset(&self) -> Option<u64> {
        self.footer.map(|f| f.index_offset)
    }

    /// Size of the index table, once records are loaded
    pub fn index_size(&self) -> Option<u64> {
        self.footer.map(|f| f.index_size)
    }

    /// Mount point recorded in the index
    pub fn mount_point(&self) -> &str {
        self.directory.mount_point()
    }

    /// Loaded record directory
    pub fn directory(&self) -> &ArchiveDirectory {
        &self.directory
    }

    /// Record names in index order
    pub fn list_names(&self) -> Vec<String> {
        self.directory.names().map(str::to_owned).collect()
    }

    /// Record descriptors in index order
    pub fn records(&self) -> impl Iterator<Item = &RecordDescriptor> {
        self.directory.iter()
    }

    /// Check whether a record exists
    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    /// Check whether the archive has no records
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Look up a record descriptor by name
    pub fn descriptor(&self, name: &str) -> PakResult<&RecordDescriptor> {
        self.directory
            .get(name)
            .ok_or_else(|| PakError::NotFound(name.to_string()))
    }

    /// Read a record's header from storage (or the cache, when enabled)
    pub fn read_header(&self, name: &str) -> PakResult<RecordHeader> {
        let descriptor = self.descriptor(name)?;
        let mut cursor = self.cursor.lock();
        self.header_for(&mut cursor, descriptor)
    }

    /// Read and decode a record's payload
    pub fn read_data(&self, name: &str) -> PakResult<RecordData> {
        let descriptor = self.descriptor(name)?;
        let mut cursor = self.cursor.lock();
        let header = self.header_for(&mut cursor, descriptor)?;
        read_payload(&mut cursor, descriptor, &header, &self.config)
    }

    /// Read every record in index order.
    ///
    /// A failing record yields its error and does not stop the rest.
    pub fn read_all(&self) -> impl Iterator<Item = (&str, PakResult<RecordData>)> {
        self.directory
            .iter()
            .map(|descriptor| (descriptor.name.as_str(), self.read_data(&descriptor.name)))
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.cursor.into_inner().into_inner()
    }

    fn header_for(
        &self,
        cursor: &mut ByteCursor<R>,
        descriptor: &RecordDescriptor,
    ) -> PakResult<RecordHeader> {
        if self.config.cache_headers
            && let Some(header) = self.header_cache.lock().get(&descriptor.name)
        {
            trace!("Header cache hit for {}", descriptor.name);
            return Ok(header.clone());
        }

        let offset = descriptor
            .header_offset
            .checked_add(HEADER_OFFSET_FIELD_LEN)
            .ok_or_else(|| PakError::MalformedHeader {
                reason: format!(
                    "header offset {} of {} overflows",
                    descriptor.header_offset, descriptor.name
                ),
            })?;
        cursor.seek(SeekFrom::Start(offset))?;
        let header = decode_record_header(cursor)?;

        trace!(
            "Header for {}: method={}, {} -> {} bytes, {} blocks",
            descriptor.name,
            header.compression_method,
            header.compressed_size,
            header.decompressed_size,
            header.compression_blocks.len()
        );

        if self.config.cache_headers {
            self.header_cache
                .lock()
                .insert(descriptor.name.clone(), header.clone());
        }
        Ok(header)
    }
}

impl<R> std::fmt::Debug for PakArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PakArchive")
            .field("path", &self.path)
            .field("footer", &self.footer)
            .field("records", &self.directory.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
