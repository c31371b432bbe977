//! Read-only random-access views over the bytes being scanned.
//!
//! A `ScanInput` is either a top-level buffer/file or a window derived from
//! another input (`slice`), or a decoded stream produced by a codec. All
//! derived inputs share the backing store, so slicing is cheap.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use crate::err::{Result, ScanError};

/// Byte order applied when fixed-size numbers are read from an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug)]
pub struct ScanInput {
    path: String,
    data: Arc<[u8]>,
    // Window into `data`; top-level inputs span the whole backing store.
    start: usize,
    end: usize,
}

impl ScanInput {
    pub fn from_bytes(path: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Arc<Self> {
        let data = data.into();
        let end = data.len();
        Arc::new(ScanInput {
            path: path.into(),
            data,
            start: 0,
            end,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| ScanError::FailedToOpenFile {
            source,
            path: path.to_path_buf(),
        })?;
        Ok(Self::from_bytes(path.to_string_lossy().into_owned(), data))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        (self.end - self.start) as u64
    }

    /// The full window of this input.
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Bounds-checked read; running past the end of the input surfaces as
    /// `FailedToRead` with an `UnexpectedEof` source.
    pub fn cached_read(&self, position: u64, len: usize, what: &'static str) -> Result<&[u8]> {
        let bytes = self.bytes();
        let start = usize::try_from(position).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= bytes.len() => Ok(&bytes[start..end]),
            _ => Err(ScanError::FailedToRead {
                offset: position,
                what,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "need {} bytes at offset {}, input `{}` holds {}",
                        len,
                        position,
                        self.path,
                        bytes.len()
                    ),
                ),
            }),
        }
    }

    /// Clamped read used for prefix matching; may return fewer than `max`
    /// bytes and never fails.
    pub fn read_prefix(&self, position: u64, max: usize) -> &[u8] {
        let bytes = self.bytes();
        let start = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        let end = start.saturating_add(max).min(bytes.len());
        &bytes[start..end]
    }

    /// Derive an input covering `[start, end)` of this input.
    pub fn slice(
        self: &Arc<Self>,
        start: u64,
        end: u64,
        path: impl Into<String>,
    ) -> Result<Arc<ScanInput>> {
        let path = path.into();
        if start > end || end > self.size() {
            return Err(ScanError::InvalidSlice {
                start,
                end,
                path: self.path.clone(),
            });
        }
        Ok(Arc::new(ScanInput {
            path,
            data: Arc::clone(&self.data),
            start: self.start + start as usize,
            end: self.start + end as usize,
        }))
    }

    /// A reader over the bytes from `position` to the end of the input.
    pub fn reader_at(self: &Arc<Self>, position: u64) -> InputReader {
        InputReader {
            input: Arc::clone(self),
            position,
        }
    }
}

/// `io::Read` adapter consumed by streaming decoders.
pub struct InputReader {
    input: Arc<ScanInput>,
    position: u64,
}

impl InputReader {
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.input.bytes();
        let pos = usize::try_from(self.position)
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        let n = buf.len().min(bytes.len() - pos);
        buf[..n].copy_from_slice(&bytes[pos..pos + n]);
        self.position += n as u64;
        Ok(n)
    }
}
