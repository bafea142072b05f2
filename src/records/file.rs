//! Record File
//!
//! Random access to equal-length records over a local file, a caller-owned
//! handle, or a remote HTTP(S) resource.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::error::{RecordError, Result};

use super::lock::ExclusiveLock;
use super::mode::{FileHandle, OpenMode};
use super::remote::HttpRange;
use super::source::{Part, Resource};

/// Backing store of a record file
#[derive(Debug)]
enum Source {
    Local { path: PathBuf, handle: FileHandle },
    Handle(File),
    Remote(HttpRange),
}

/// A file (or remote resource) viewed as an array of `record_size` records
///
/// ## Caching
/// - `record_count` / `file_size`: refreshed by `record_count(true)`, by
///   opening a local file, and under the lock of every append. The cached
///   count is only trusted while the source is open.
/// - remote size: learned from range responses or a HEAD probe, refreshed
///   by a forced recount.
#[derive(Debug)]
pub struct RecordFile {
    source: Source,
    record_size: u64,
    start_offset: u64,
    file_size_limit: Option<u64>,
    record_count: Option<u64>,
    file_size: u64,
}

impl RecordFile {
    /// Create a record file over `resource`
    ///
    /// Nothing is opened until the first operation needs it.
    pub fn new(resource: impl Into<Resource>, record_size: u64) -> Result<Self> {
        if record_size == 0 {
            return Err(RecordError::InvalidRecordSize);
        }
        let source = match resource.into() {
            Resource::Path(path) => Source::Local {
                path,
                handle: FileHandle::new(),
            },
            Resource::Handle(file) => Source::Handle(file),
            Resource::Url(url) => Source::Remote(HttpRange::new(url)?),
        };
        Ok(Self {
            source,
            record_size,
            start_offset: 0,
            file_size_limit: None,
            record_count: None,
            file_size: 0,
        })
    }

    /// Refuse appends that would grow the file past `limit` bytes
    pub fn with_file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = Some(limit);
        self
    }

    /// Records start `offset` bytes into the file
    ///
    /// The prefix itself is never written by this type; it must exist before
    /// the first append.
    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self.record_count = None;
        self
    }

    pub fn set_file_size_limit(&mut self, limit: Option<u64>) {
        self.file_size_limit = limit;
    }

    // =========================================================================
    // Counting
    // =========================================================================

    /// Number of whole records after `start_offset`
    ///
    /// Served from cache unless `force_recount` is set or the source is not
    /// open. A missing local file has zero records.
    pub fn record_count(&mut self, force_recount: bool) -> Result<u64> {
        if !force_recount && self.is_open() {
            if let Some(count) = self.record_count {
                return Ok(count);
            }
        }
        let size = match &mut self.source {
            Source::Local { path, .. } => match fs::metadata(&*path) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            },
            Source::Handle(file) => file.metadata()?.len(),
            Source::Remote(remote) => match remote.remote_size() {
                Some(size) if !force_recount => size,
                _ => remote.probe_size()?,
            },
        };
        let count = self.count_for_size(size);
        self.file_size = size;
        self.record_count = Some(count);
        Ok(count)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Read record `record`
    pub fn read_record(&mut self, record: u64) -> Result<Vec<u8>> {
        self.read_records(record, 1)
    }

    /// Read `count` consecutive records starting at `record`, concatenated
    ///
    /// Returns `RecordNotFound` when `record` is past the end. Records past
    /// the end in a multi-record read are simply missing from the result, and
    /// a remote read may come back short; callers that need exact lengths
    /// must check.
    pub fn read_records(&mut self, record: u64, count: u64) -> Result<Vec<u8>> {
        self.ensure_readable()?;
        let mut total = self.record_count(false)?;
        if record >= total {
            // Another process may have appended since the last count
            total = self.record_count(true)?;
        }
        if record >= total {
            return Err(RecordError::RecordNotFound(record));
        }
        let len = count.checked_mul(self.record_size).ok_or_else(|| {
            RecordError::Config(format!("{} records of {} bytes overflow", count, self.record_size))
        })?;
        let part = self.read_part(self.record_offset(record), len)?;
        Ok(part.data)
    }

    /// Read up to `len` bytes starting at byte `from`, regardless of records
    pub fn read_part(&mut self, from: u64, len: u64) -> Result<Part> {
        match &mut self.source {
            Source::Local { path, handle } => {
                let file = handle.open(path, OpenMode::ReadOnly, 0)?;
                read_at(file, from, len)
            }
            Source::Handle(file) => read_at(file, from, len),
            Source::Remote(remote) => remote.read_range(from, len),
        }
    }

    /// Read the first `max_len` bytes after `start_offset`
    ///
    /// `None` when fewer than `min_len` bytes exist. A short read from the
    /// very start of the resource reveals its total size.
    pub fn read_first_bytes(&mut self, max_len: u64, min_len: u64) -> Result<Option<Part>> {
        let mut part = self.read_part(self.start_offset, max_len)?;
        if (part.len() as u64) < min_len {
            return Ok(None);
        }
        if part.total_size.is_none() && self.start_offset == 0 && (part.len() as u64) < max_len {
            part.total_size = Some(part.len() as u64);
        }
        Ok(Some(part))
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append one record; returns its record number
    pub fn append_record(&mut self, record: &[u8]) -> Result<u64> {
        self.append_records(&[record])
    }

    /// Append records in one locked write; returns the first record number
    ///
    /// Every record must be exactly `record_size` bytes. This is checked
    /// before any I/O, so a bad batch never partially lands.
    pub fn append_records<R: AsRef<[u8]>>(&mut self, records: &[R]) -> Result<u64> {
        if matches!(self.source, Source::Remote(_)) {
            return Err(RecordError::Unsupported("append to a remote resource"));
        }
        if let Some(bad) = records
            .iter()
            .map(|record| record.as_ref().len() as u64)
            .find(|&len| len != self.record_size)
        {
            return Err(RecordError::SizeMismatch {
                expected: self.record_size,
                actual: bad,
            });
        }
        let mut batch = BytesMut::with_capacity(records.iter().map(|r| r.as_ref().len()).sum());
        for record in records {
            batch.extend_from_slice(record.as_ref());
        }
        if records.is_empty() {
            return self.record_count(true);
        }

        let record_size = self.record_size;
        let start_offset = self.start_offset;
        let limit = self.file_size_limit;
        let file: &File = match &mut self.source {
            Source::Local { path, handle } => handle.open(path, OpenMode::Append, 0)?,
            Source::Handle(file) => file,
            Source::Remote(_) => return Err(RecordError::Unsupported("append to a remote resource")),
        };

        let (first, new_size) = {
            let lock = ExclusiveLock::acquire(file)?;
            let size = lock.file().metadata()?.len();
            let first = size.saturating_sub(start_offset) / record_size;
            let required = size + batch.len() as u64;
            if let Some(limit) = limit {
                if required > limit {
                    tracing::debug!(size, required, limit, "file size limit reached");
                    return Err(RecordError::SizeLimit { limit, required });
                }
            }
            let mut writer = lock.file();
            writer.seek(SeekFrom::End(0))?;
            let written = writer.write(&batch)?;
            if written != batch.len() {
                return Err(RecordError::ShortWrite {
                    expected: batch.len() as u64,
                    written: written as u64,
                });
            }
            writer.flush()?;
            (first, required)
        };

        self.record_count = Some(first + records.len() as u64);
        self.file_size = new_size;
        tracing::debug!(first, count = records.len(), "appended records");
        Ok(first)
    }

    /// Overwrite record `record` with exactly `record_size` bytes
    pub fn rewrite_record(&mut self, record: u64, data: &[u8]) -> Result<u64> {
        if data.len() as u64 != self.record_size {
            return Err(RecordError::SizeMismatch {
                expected: self.record_size,
                actual: data.len() as u64,
            });
        }
        self.rewrite_at(record, data)
    }

    /// Overwrite the leading `data.len()` bytes of record `record`
    ///
    /// For fixed layouts that update a prefix of a record in place. `data`
    /// may not spill into the next record.
    pub fn rewrite_record_unchecked(&mut self, record: u64, data: &[u8]) -> Result<u64> {
        if data.len() as u64 > self.record_size {
            return Err(RecordError::SizeMismatch {
                expected: self.record_size,
                actual: data.len() as u64,
            });
        }
        self.rewrite_at(record, data)
    }

    /// Rewrites take no lock; callers need their own mutual exclusion.
    fn rewrite_at(&mut self, record: u64, data: &[u8]) -> Result<u64> {
        if matches!(self.source, Source::Remote(_)) {
            return Err(RecordError::Unsupported("rewrite of a remote resource"));
        }
        let mut count = self.record_count(false)?;
        if record >= count {
            count = self.record_count(true)?;
        }
        if record >= count {
            return Err(RecordError::OutOfRange { record, count });
        }
        let pos = self.record_offset(record);
        let file: &mut File = match &mut self.source {
            Source::Local { path, handle } => handle.open(path, OpenMode::ReadWrite, count)?,
            Source::Handle(file) => file,
            Source::Remote(_) => return Err(RecordError::Unsupported("rewrite of a remote resource")),
        };
        file.seek(SeekFrom::Start(pos))?;
        let written = file.write(data)?;
        if written != data.len() {
            return Err(RecordError::ShortWrite {
                expected: data.len() as u64,
                written: written as u64,
            });
        }
        file.flush()?;
        Ok(record)
    }

    // =========================================================================
    // Handle Management
    // =========================================================================

    /// Open a local file in `mode` now instead of lazily
    ///
    /// Remote and caller-owned sources only accept `ReadOnly`, which is a
    /// no-op for them.
    pub fn open(&mut self, mode: OpenMode) -> Result<()> {
        match &mut self.source {
            Source::Local { path, handle } => {
                if mode == OpenMode::Closed {
                    handle.close();
                    return Ok(());
                }
                let was_open = handle.is_open();
                let count = match mode {
                    OpenMode::ReadWrite => {
                        let size = match fs::metadata(&*path) {
                            Ok(meta) => meta.len(),
                            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                            Err(e) => return Err(e.into()),
                        };
                        size.saturating_sub(self.start_offset) / self.record_size
                    }
                    _ => 0,
                };
                handle.open(path, mode, count)?;
                if !was_open {
                    self.record_count(true)?;
                }
                Ok(())
            }
            _ if mode == OpenMode::ReadOnly => Ok(()),
            _ => Err(RecordError::Unsupported("mode switch on a non-local resource")),
        }
    }

    /// Release the local handle; later operations reopen lazily
    ///
    /// Caller-owned handles stay open until the record file is dropped.
    pub fn close(&mut self) {
        if let Source::Local { handle, .. } = &mut self.source {
            handle.close();
        }
    }

    /// Whether cached state can be trusted without touching the source
    pub fn is_open(&self) -> bool {
        match &self.source {
            Source::Local { handle, .. } => handle.is_open(),
            Source::Handle(_) => true,
            Source::Remote(remote) => remote.remote_size().is_some(),
        }
    }

    /// Current open mode of a local file; `None` for other sources
    pub fn mode(&self) -> Option<OpenMode> {
        match &self.source {
            Source::Local { handle, .. } => Some(handle.mode()),
            _ => None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn file_size_limit(&self) -> Option<u64> {
        self.file_size_limit
    }

    /// File size observed by the last count or append
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Local path, if the source is one
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Local { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Remote URL, if the source is one
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            Source::Remote(remote) => Some(remote.url()),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.source, Source::Remote(_))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn record_offset(&self, record: u64) -> u64 {
        self.start_offset + record * self.record_size
    }

    fn count_for_size(&self, size: u64) -> u64 {
        size.saturating_sub(self.start_offset) / self.record_size
    }

    /// Open a local file for reading, recounting if it was closed
    fn ensure_readable(&mut self) -> Result<()> {
        if let Source::Local { path, handle } = &mut self.source {
            if !handle.is_open() {
                handle.open(path, OpenMode::ReadOnly, 0)?;
                self.record_count(true)?;
            }
        }
        Ok(())
    }
}

impl Drop for RecordFile {
    fn drop(&mut self) {
        self.close();
    }
}

/// Seek to `from` and read until `len` bytes or end of file
fn read_at(file: &mut File, from: u64, len: u64) -> Result<Part> {
    let total_size = file.metadata()?.len();
    file.seek(SeekFrom::Start(from))?;
    let mut data = Vec::with_capacity(len.min(total_size.saturating_sub(from)) as usize);
    Read::take(&mut *file, len).read_to_end(&mut data)?;
    Ok(Part {
        data,
        total_size: Some(total_size),
        remote: false,
    })
}
