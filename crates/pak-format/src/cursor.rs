//! Sequential, seekable byte reader
//!
//! [`ByteCursor`] wraps a single `Read + Seek` resource and tracks the absolute
//! position of every read so truncations can be reported with the offset they
//! started at. Fixed-width values are decoded through binrw.

use binrw::io::{Read, Seek, SeekFrom};
use binrw::{BinRead, Endian};

use crate::error::{PakError, PakResult};

/// Values with a fixed on-disk width that decode without arguments
pub trait FixedSize: for<'a> BinRead<Args<'a> = ()> {
    /// Encoded size in bytes
    const SIZE: u64;
}

macro_rules! fixed_width_integers {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FixedSize for $ty {
                const SIZE: u64 = std::mem::size_of::<$ty>() as u64;
            }
        )*
    };
}

fixed_width_integers!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Seekable reader over one byte-addressable resource.
///
/// Not shareable between logical readers: every read and seek moves the one
/// position this cursor owns.
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    position: u64,
}

impl<R: Read + Seek> ByteCursor<R> {
    /// Wrap a reader, picking up its current stream position
    pub fn new(mut inner: R) -> PakResult<Self> {
        let position = inner.stream_position()?;
        Ok(Self { inner, position })
    }

    /// Current absolute position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total length of the underlying resource.
    ///
    /// The cursor position is left unchanged.
    pub fn stream_len(&mut self) -> PakResult<u64> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.position))?;
        Ok(len)
    }

    /// Seek with an explicit origin, returning the new absolute position.
    ///
    /// A target before the start of the resource is reported as a short read
    /// rather than an I/O error.
    pub fn seek(&mut self, target: SeekFrom) -> PakResult<u64> {
        let (anchor, delta) = match target {
            SeekFrom::Start(offset) => (offset, 0),
            SeekFrom::End(delta) => (self.stream_len()?, delta),
            SeekFrom::Current(delta) => (self.position, delta),
        };

        // A target before the start has only `anchor` bytes in front of it
        let Some(absolute) = anchor.checked_add_signed(delta) else {
            return Err(PakError::ShortRead {
                position: anchor,
                expected: delta.unsigned_abs(),
                actual: anchor,
            });
        };

        self.position = self.inner.seek(SeekFrom::Start(absolute))?;
        Ok(self.position)
    }

    /// Seek to an absolute offset; negative offsets count back from the end
    pub fn seek_to(&mut self, offset: i64) -> PakResult<u64> {
        if offset >= 0 {
            self.seek(SeekFrom::Start(offset.unsigned_abs()))
        } else {
            self.seek(SeekFrom::End(offset))
        }
    }

    /// Advance the cursor by `count` bytes without reading them
    pub fn skip(&mut self, count: u64) -> PakResult<u64> {
        let target = self
            .position
            .checked_add(count)
            .ok_or(PakError::ShortRead {
                position: self.position,
                expected: count,
                actual: 0,
            })?;
        self.seek(SeekFrom::Start(target))
    }

    /// Decode one fixed-size value with the given byte order
    pub fn read<T: FixedSize>(&mut self, endian: Endian) -> PakResult<T> {
        let start = self.position;
        match T::read_options(&mut self.inner, endian, ()) {
            Ok(value) => {
                self.position = start + T::SIZE;
                Ok(value)
            }
            Err(err) => Err(self.map_read_error(err, start, T::SIZE)),
        }
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> PakResult<u8> {
        self.read(Endian::Little)
    }

    /// Read a little-endian `u32`
    pub fn read_u32_le(&mut self) -> PakResult<u32> {
        self.read(Endian::Little)
    }

    /// Read a little-endian `u64`
    pub fn read_u64_le(&mut self) -> PakResult<u64> {
        self.read(Endian::Little)
    }

    /// Read exactly `len` bytes into a new buffer
    pub fn read_bytes(&mut self, len: u64) -> PakResult<Vec<u8>> {
        let start = self.position;
        // The buffer grows with the data actually present, so a corrupt length
        // cannot force a huge allocation up front.
        let mut buf = Vec::with_capacity(len.min(64 * 1024) as usize);
        let read = (&mut self.inner).take(len).read_to_end(&mut buf)? as u64;
        self.position = start + read;

        if read != len {
            return Err(PakError::ShortRead {
                position: start,
                expected: len,
                actual: read,
            });
        }
        Ok(buf)
    }

    /// Read exactly `N` bytes into an array
    pub fn read_array<const N: usize>(&mut self) -> PakResult<[u8; N]> {
        let start = self.position;
        let mut buf = [0u8; N];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.position = start + N as u64;
                Ok(buf)
            }
            Err(err) => Err(self.map_read_error(binrw::Error::Io(err), start, N as u64)),
        }
    }

    /// Read `len` bytes and decode them as UTF-8.
    ///
    /// Terminators are returned as-is; stripping them is up to the caller.
    pub fn read_text(&mut self, len: u64) -> PakResult<String> {
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|source| PakError::InvalidText {
            position: start,
            source,
        })
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn map_read_error(&mut self, err: binrw::Error, start: u64, expected: u64) -> PakError {
        // Derived readers wrap field errors in backtraces
        let truncated = matches!(
            err.root_cause(),
            binrw::Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof
        );

        match err {
            _ if truncated => {
                let actual = self
                    .stream_len()
                    .map(|end| end.saturating_sub(start).min(expected))
                    .unwrap_or(0);
                self.position = start + actual;
                if let Err(err) = self.inner.seek(SeekFrom::Start(self.position)) {
                    return PakError::Io(err);
                }
                PakError::ShortRead {
                    position: start,
                    expected,
                    actual,
                }
            }
            binrw::Error::Io(io) => PakError::Io(io),
            other => PakError::BinRw(other),
        }
    }
}
