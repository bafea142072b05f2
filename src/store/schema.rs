//! Schema and its persisted header
//!
//! ## Header File Format
//! ```text
//! ┌───────────┬─────────────┬──────────────────────┬───────────┐
//! │ Magic (4) │ Len (4, LE) │ bincode(Schema)      │ CRC32 (4) │
//! └───────────┴─────────────┴──────────────────────┴───────────┘
//! ```
//! Written once and never modified afterwards. The header is assembled in a
//! temp file next to it and hard-linked into place, so it appears complete
//! or not at all.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};

/// Magic bytes at the start of every header file
pub const HEADER_MAGIC: &[u8; 4] = b"DRS\x01";

/// Headers are tiny; anything larger is not one of ours
const MAX_HEADER_SIZE: u64 = 1000;

/// Magic + length + CRC, before any payload
const MIN_HEADER_SIZE: u64 = 12;

/// Times a short header is re-checked before it is declared corrupt
const LOAD_ATTEMPTS: u32 = 10;
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Valid range of `records_per_shard`
pub const RECORDS_PER_SHARD_RANGE: std::ops::RangeInclusive<u32> = 1..=100_000_000;
/// Valid range of `offset_width`
pub const OFFSET_WIDTH_RANGE: std::ops::RangeInclusive<u8> = 2..=4;
/// Valid range of `length_width`
pub const LENGTH_WIDTH_RANGE: std::ops::RangeInclusive<u8> = 1..=4;

/// Layout parameters of a dynamic record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Capacity of each shard
    pub records_per_shard: u32,
    /// Bytes for a payload's offset inside its data file
    pub offset_width: u8,
    /// Bytes for a payload's length
    pub length_width: u8,
}

impl Schema {
    /// Build and validate a schema
    pub fn new(records_per_shard: u32, offset_width: u8, length_width: u8) -> Result<Self> {
        let schema = Self {
            records_per_shard,
            offset_width,
            length_width,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        if !RECORDS_PER_SHARD_RANGE.contains(&self.records_per_shard) {
            return Err(RecordError::Config(format!(
                "records_per_shard must be in {:?}, got {}",
                RECORDS_PER_SHARD_RANGE, self.records_per_shard
            )));
        }
        if !OFFSET_WIDTH_RANGE.contains(&self.offset_width) {
            return Err(RecordError::Config(format!(
                "offset_width must be in {:?}, got {}",
                OFFSET_WIDTH_RANGE, self.offset_width
            )));
        }
        if !LENGTH_WIDTH_RANGE.contains(&self.length_width) {
            return Err(RecordError::Config(format!(
                "length_width must be in {:?}, got {}",
                LENGTH_WIDTH_RANGE, self.length_width
            )));
        }
        Ok(())
    }

    /// Size of one index entry
    pub fn entry_size(&self) -> u64 {
        u64::from(self.offset_width) + u64::from(self.length_width)
    }

    /// Byte ceiling of a full shard index file
    pub fn index_file_limit(&self) -> u64 {
        self.entry_size() * u64::from(self.records_per_shard)
    }
}

/// Reads and writes the schema header file
pub struct SchemaHeader;

impl SchemaHeader {
    /// Load and validate an existing header
    pub fn load(path: &Path) -> Result<Schema> {
        let meta = fs::metadata(path)?;
        if meta.len() > MAX_HEADER_SIZE {
            return Err(RecordError::HeaderCorrupt(format!(
                "'{}' is {} bytes, too large for a header",
                path.display(),
                meta.len()
            )));
        }
        let bytes = fs::read(path)?;
        Self::decode(&bytes).map_err(|e| match e {
            RecordError::HeaderCorrupt(msg) => {
                RecordError::HeaderCorrupt(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Write a new header; fails with `AlreadyExists` if one is there
    pub fn create(path: &Path, schema: &Schema) -> Result<()> {
        schema.validate()?;
        let bytes = Self::encode(schema)?;
        let tmp = temp_path(path)?;

        let result = write_new(&tmp, &bytes).and_then(|()| fs::hard_link(&tmp, path));
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), "failed to remove temp header: {}", e);
            }
        }
        result?;

        tracing::info!(path = %path.display(), ?schema, "created schema header");
        Ok(())
    }

    /// Load the header at `path`, creating it from `requested` if missing
    ///
    /// An explicit schema that differs from the persisted one is rejected
    /// without writing anything. Without a schema the header must exist.
    pub fn open_or_create(path: &Path, requested: Option<&Schema>) -> Result<Schema> {
        if let Some(schema) = requested {
            schema.validate()?;
        }
        if !path.exists() {
            let Some(schema) = requested else {
                return Err(RecordError::Config(format!(
                    "Header file '{}' not found",
                    path.display()
                )));
            };
            match Self::create(path, schema) {
                Ok(()) => return Ok(*schema),
                // Another process created it first; fall through and check it
                Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        let persisted = Self::load_complete(path)?;
        if let Some(schema) = requested {
            if *schema != persisted {
                return Err(RecordError::SchemaMismatch {
                    path: path.display().to_string(),
                });
            }
        }
        Ok(persisted)
    }

    /// Load a header that another writer may still be filling in
    ///
    /// A file shorter than its own length field says is re-read a few times
    /// before it is reported as corrupt.
    fn load_complete(path: &Path) -> Result<Schema> {
        let mut attempt = 1;
        loop {
            match Self::load(path) {
                Err(RecordError::HeaderCorrupt(msg))
                    if attempt < LOAD_ATTEMPTS && is_incomplete(&fs::read(path)?) =>
                {
                    tracing::debug!(path = %path.display(), attempt, "schema header incomplete, waiting: {}", msg);
                    thread::sleep(LOAD_RETRY_DELAY);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Serialize a schema into header bytes
    pub fn encode(schema: &Schema) -> Result<Vec<u8>> {
        let payload =
            bincode::serialize(schema).map_err(|e| RecordError::Config(e.to_string()))?;
        let mut bytes = Vec::with_capacity(payload.len() + 12);
        bytes.extend_from_slice(HEADER_MAGIC);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        Ok(bytes)
    }

    /// Parse and validate header bytes
    pub fn decode(bytes: &[u8]) -> Result<Schema> {
        if (bytes.len() as u64) < MIN_HEADER_SIZE {
            return Err(RecordError::HeaderCorrupt(format!(
                "{} bytes is too short",
                bytes.len()
            )));
        }
        if &bytes[0..4] != HEADER_MAGIC {
            return Err(RecordError::HeaderCorrupt(format!(
                "invalid magic {:?}",
                &bytes[0..4]
            )));
        }
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        if bytes.len() != 8 + len + 4 {
            return Err(RecordError::HeaderCorrupt(format!(
                "payload length {} does not match file size {}",
                len,
                bytes.len()
            )));
        }
        let payload = &bytes[8..8 + len];
        let stored = u32::from_le_bytes([
            bytes[8 + len],
            bytes[9 + len],
            bytes[10 + len],
            bytes[11 + len],
        ]);
        if crc32fast::hash(payload) != stored {
            return Err(RecordError::HeaderCorrupt("checksum mismatch".to_string()));
        }
        let schema: Schema = bincode::deserialize(payload)
            .map_err(|e| RecordError::HeaderCorrupt(e.to_string()))?;
        schema
            .validate()
            .map_err(|e| RecordError::HeaderCorrupt(e.to_string()))?;
        Ok(schema)
    }
}

/// Whether `bytes` look like the prefix of a header still being written
fn is_incomplete(bytes: &[u8]) -> bool {
    if (bytes.len() as u64) < MIN_HEADER_SIZE {
        return true;
    }
    let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as u64;
    (bytes.len() as u64) < 8 + len + 4 && 8 + len + 4 <= MAX_HEADER_SIZE
}

/// `{dir}/.{name}.{random}.tmp` next to the header
fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RecordError::Config(format!("'{}' has no usable file name", path.display())))?;
    let suffix: u64 = rand::thread_rng().gen();
    Ok(path.with_file_name(format!(".{}.{:016x}.tmp", name, suffix)))
}

fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
