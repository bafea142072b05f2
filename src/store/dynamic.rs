//! Dynamic Record Store
//!
//! Variable-length records sharded across index + data file pairs.
//!
//! ## Responsibilities
//! - Place global record numbers into shards
//! - Append payloads under advisory locks, retrying when a concurrent
//!   writer fills the shard first
//! - Resolve record numbers back to payloads, retrying while a write is
//!   still becoming visible

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec;
use crate::config::StoreConfig;
use crate::error::{RecordError, Result};
use crate::records::{ExclusiveLock, RecordFile};

use super::cache::ShardCache;
use super::layout::StoreLayout;
use super::schema::{Schema, SchemaHeader};

/// Where a global record number lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPosition {
    pub shard: u64,
    /// Record number inside the shard's index file
    pub position: u64,
}

/// Location of a payload inside its shard's data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub length: u64,
}

impl IndexEntry {
    /// `offset || length`, big-endian, at the schema's widths
    pub fn pack(&self, schema: &Schema) -> Result<Vec<u8>> {
        let offset_width = usize::from(schema.offset_width);
        let mut bytes = vec![0u8; schema.entry_size() as usize];
        let (offset, length) = bytes.split_at_mut(offset_width);
        codec::pack_into(self.offset, offset)?;
        codec::pack_into(self.length, length)?;
        Ok(bytes)
    }

    pub fn unpack(bytes: &[u8], schema: &Schema) -> Result<Self> {
        if bytes.len() as u64 != schema.entry_size() {
            return Err(RecordError::ShortRead {
                expected: schema.entry_size(),
                actual: bytes.len() as u64,
            });
        }
        let (offset, length) = bytes.split_at(usize::from(schema.offset_width));
        Ok(Self {
            offset: codec::unpack(offset)?,
            length: codec::unpack(length)?,
        })
    }
}

/// Mutable state, guarded by the store's mutex
struct StoreState {
    /// Total records; invalidated by every append
    record_count: Option<u64>,
    /// Known shard numbers, ascending; extended by appends, rebuilt on recount
    shards: Option<Vec<u64>>,
    /// Open index files
    cache: ShardCache<RecordFile>,
}

/// A store of variable-length records addressed by a contiguous number
///
/// ## Concurrency
/// - Across processes: appends lock the data and index files they write.
///   Reads take no lock and retry until data is visible.
/// - Within a process: all methods take `&self`; the shard cache and
///   counters sit behind one mutex, released while sleeping between retries.
///
/// ## Invariant
/// Every shard but the last holds exactly `records_per_shard` records.
/// `record_count` relies on it and the append path keeps it: a writer only
/// moves to shard `s + 1` after the index of shard `s` refused a write for
/// being full.
pub struct DynamicStore {
    config: StoreConfig,
    layout: StoreLayout,
    schema: Schema,
    state: Mutex<StoreState>,
}

impl DynamicStore {
    /// Open the store whose header is `header_path`
    ///
    /// With `schema` set, a missing store is created; an existing one must
    /// have been created with the same schema. Without it, the store must
    /// exist.
    pub fn open(header_path: impl Into<PathBuf>, schema: Option<Schema>) -> Result<Self> {
        let mut config = StoreConfig::default();
        config.header_path = header_path.into();
        config.schema = schema;
        Self::open_with_config(config)
    }

    /// Open with full configuration
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let layout = StoreLayout::from_header_path(&config.header_path)?;
        if config.schema.is_some() && !layout.base_dir().exists() {
            std::fs::create_dir_all(layout.base_dir())?;
        }
        let schema = SchemaHeader::open_or_create(&layout.header_path(), config.schema.as_ref())?;

        tracing::debug!(
            dir = %layout.base_dir().display(),
            base = layout.base_name(),
            ?schema,
            "opened dynamic store"
        );

        let cache = ShardCache::new(config.shard_cache_capacity);
        Ok(Self {
            config,
            layout,
            schema,
            state: Mutex::new(StoreState {
                record_count: None,
                shards: None,
                cache,
            }),
        })
    }

    // =========================================================================
    // Placement and Counting
    // =========================================================================

    /// Shard and in-shard position of global record `record`
    pub fn shard_for(&self, record: u64) -> ShardPosition {
        let per_shard = u64::from(self.schema.records_per_shard);
        ShardPosition {
            shard: record / per_shard,
            position: record % per_shard,
        }
    }

    /// Total number of records
    ///
    /// `max_shard * records_per_shard + records in max_shard`.
    pub fn record_count(&self, force_recount: bool) -> Result<u64> {
        let mut state = self.state.lock();
        self.record_count_locked(&mut state, force_recount)
    }

    /// Shard numbers with an index file, ascending
    pub fn shard_numbers(&self, force_recount: bool) -> Result<Vec<u64>> {
        let mut state = self.state.lock();
        self.refresh_shards(&mut state, force_recount)?;
        Ok(state.shards.clone().unwrap_or_default())
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Append a payload; returns its global record number
    ///
    /// Retries with a fresh placement when a concurrent writer fills the
    /// target shard first. Payloads whose length or offset do not fit the
    /// schema's widths fail immediately.
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        let length = payload.len() as u64;
        let length_width = usize::from(self.schema.length_width);
        if length > codec::max_value(length_width) {
            return Err(RecordError::Overflow {
                value: length,
                width: length_width,
            });
        }

        let attempts = self.config.append_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_append(payload) {
                Err(e @ RecordError::SizeLimit { .. }) if attempt < attempts => {
                    tracing::warn!(attempt, "shard filled by a concurrent writer, retrying: {}", e);
                    thread::sleep(self.config.append_retry_delay);
                }
                Err(e @ RecordError::SizeLimit { .. }) => {
                    return Err(RecordError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                other => return other,
            }
        }
    }

    fn try_append(&self, payload: &[u8]) -> Result<u64> {
        let mut state = self.state.lock();
        let next = self.record_count_locked(&mut state, true)?;
        let target = self.shard_for(next);

        let offset_width = usize::from(self.schema.offset_width);
        let offset = append_data(&self.layout.data_path(target.shard), payload, offset_width)?;
        let entry = IndexEntry {
            offset,
            length: payload.len() as u64,
        }
        .pack(&self.schema)?;

        let position = self.index_file(&mut state, target.shard)?.append_record(&entry)?;

        state.record_count = None;
        if let Some(shards) = state.shards.as_mut() {
            if let Err(at) = shards.binary_search(&target.shard) {
                shards.insert(at, target.shard);
            }
        }

        let record = target.shard * u64::from(self.schema.records_per_shard) + position;
        tracing::debug!(record, shard = target.shard, offset, len = payload.len(), "appended record");
        Ok(record)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Read record `record` with the configured retry budget
    pub fn read(&self, record: u64) -> Result<Vec<u8>> {
        self.read_with(record, self.config.read_attempts, self.config.read_retry_delay)
    }

    /// Read record `record`, retrying transient failures
    ///
    /// A record that is not visible yet (index entry missing or incomplete,
    /// payload shorter than its entry says) is retried up to `max_attempts`
    /// times with `retry_delay` in between; the last transient error is
    /// returned when they run out.
    pub fn read_with(&self, record: u64, max_attempts: u32, retry_delay: Duration) -> Result<Vec<u8>> {
        let attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_read(record) {
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::debug!(record, attempt, "record not readable yet: {}", e);
                    thread::sleep(retry_delay);
                }
                other => return other,
            }
        }
    }

    /// Decoded index entry of record `record`, without retries
    ///
    /// A shard whose index file does not exist yet holds no records.
    pub fn index_entry(&self, record: u64) -> Result<IndexEntry> {
        let target = self.shard_for(record);
        let mut state = self.state.lock();
        let bytes = match self.index_file(&mut state, target.shard)?.read_record(target.position) {
            Ok(bytes) => bytes,
            Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                state.cache.remove(target.shard);
                return Err(RecordError::RecordNotFound(record));
            }
            Err(e) => return Err(e),
        };
        IndexEntry::unpack(&bytes, &self.schema)
    }

    fn try_read(&self, record: u64) -> Result<Vec<u8>> {
        let entry = self.index_entry(record)?;
        if entry.length == 0 {
            return Ok(Vec::new());
        }
        self.read_payload(self.shard_for(record).shard, entry)
    }

    /// Read a payload straight from the data file, independent of the
    /// cached index handle
    fn read_payload(&self, shard: u64, entry: IndexEntry) -> Result<Vec<u8>> {
        let path = self.layout.data_path(shard);
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RecordError::MissingFile(path.display().to_string()),
            _ => RecordError::Io(e),
        })?;
        file.seek(SeekFrom::Start(entry.offset))?;

        let length = entry.length as usize;
        let mut data = vec![0u8; length];
        let mut filled = 0;
        let attempts = self.config.data_read_attempts;
        for attempt in 1..=attempts {
            while filled < length {
                match file.read(&mut data[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            if filled == length {
                return Ok(data);
            }
            tracing::trace!(shard, attempt, filled, length, "short payload read");
            if attempt < attempts {
                thread::sleep(self.config.data_read_delay);
            }
        }
        Err(RecordError::ShortRead {
            expected: entry.length,
            actual: filled as u64,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of index files currently held open
    pub fn open_shard_count(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Close every cached index file
    pub fn close_shards(&self) {
        self.state.lock().cache.clear();
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn record_count_locked(&self, state: &mut StoreState, force_recount: bool) -> Result<u64> {
        if !force_recount {
            if let Some(count) = state.record_count {
                return Ok(count);
            }
        }
        self.refresh_shards(state, force_recount)?;
        let last = state.shards.as_ref().and_then(|shards| shards.last().copied());
        let count = match last {
            None => 0,
            Some(shard) => {
                let in_last = self.index_file(state, shard)?.record_count(force_recount)?;
                shard * u64::from(self.schema.records_per_shard) + in_last
            }
        };
        state.record_count = Some(count);
        Ok(count)
    }

    fn refresh_shards(&self, state: &mut StoreState, force_recount: bool) -> Result<()> {
        if force_recount || state.shards.is_none() {
            state.shards = Some(self.layout.discover_shards()?);
        }
        Ok(())
    }

    fn index_file<'s>(&self, state: &'s mut StoreState, shard: u64) -> Result<&'s mut RecordFile> {
        let path = self.layout.index_path(shard);
        let entry_size = self.schema.entry_size();
        let limit = self.schema.index_file_limit();
        state.cache.get_or_open(shard, || {
            tracing::trace!(shard, path = %path.display(), "opening shard index");
            Ok(RecordFile::new(path, entry_size)?.with_file_size_limit(limit))
        })
    }
}

/// Append `payload` to a data file under an exclusive lock; returns the
/// offset it was written at
///
/// The offset must fit `offset_width` bytes; this is checked before writing,
/// so an overflowing shard is left untouched.
fn append_data(path: &Path, payload: &[u8], offset_width: usize) -> Result<u64> {
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let lock = ExclusiveLock::acquire(&file)?;
    let offset = lock.file().metadata()?.len();
    if offset > codec::max_value(offset_width) {
        return Err(RecordError::Overflow {
            value: offset,
            width: offset_width,
        });
    }
    if !payload.is_empty() {
        let mut writer = lock.file();
        let written = writer.write(payload)?;
        if written != payload.len() {
            return Err(RecordError::ShortWrite {
                expected: payload.len() as u64,
                written: written as u64,
            });
        }
        writer.flush()?;
    }
    Ok(offset)
}
