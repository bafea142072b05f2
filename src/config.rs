//! Configuration for FileRecords
//!
//! Centralized store configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RecordError, Result};
use crate::store::Schema;

/// Default number of shard index files kept open at once
pub const DEFAULT_SHARD_CACHE_CAPACITY: usize = 10;

/// Main configuration for a DynamicStore instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the schema header file. Shard files live next to it:
    ///   {dir}/
    ///     ├── {base}.drs        (schema header)
    ///     ├── {base}-0.idx      (index of shard 0)
    ///     ├── {base}-0.dat      (payloads of shard 0)
    ///     └── ...
    pub header_path: PathBuf,

    /// Schema to create the store with, or to check against an existing
    /// header. `None` trusts whatever header is on disk.
    pub schema: Option<Schema>,

    /// Max number of shard index files kept open
    pub shard_cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Append Configuration
    // -------------------------------------------------------------------------
    /// Attempts before an append racing other writers gives up
    pub append_attempts: u32,

    /// Pause between append attempts
    pub append_retry_delay: Duration,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// Attempts of the full index lookup + data read cycle
    pub read_attempts: u32,

    /// Pause between full read attempts
    pub read_retry_delay: Duration,

    /// Attempts to complete a short payload read from the data file
    pub data_read_attempts: u32,

    /// Pause between payload read attempts
    pub data_read_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            header_path: PathBuf::from("./records.drs"),
            schema: None,
            shard_cache_capacity: DEFAULT_SHARD_CACHE_CAPACITY,
            append_attempts: 5,
            append_retry_delay: Duration::from_millis(50),
            read_attempts: 5,
            read_retry_delay: Duration::from_millis(10),
            data_read_attempts: 5,
            data_read_delay: Duration::from_millis(10),
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Reject settings that would make the store unusable
    pub fn validate(&self) -> Result<()> {
        if self.shard_cache_capacity == 0 {
            return Err(RecordError::Config(
                "shard cache capacity must be at least 1".to_string(),
            ));
        }
        if self.append_attempts == 0 || self.read_attempts == 0 || self.data_read_attempts == 0 {
            return Err(RecordError::Config(
                "attempt counts must be at least 1".to_string(),
            ));
        }
        if let Some(schema) = &self.schema {
            schema.validate()?;
        }
        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the schema header path (shard files are placed next to it)
    pub fn header_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.header_path = path.into();
        self
    }

    /// Set the schema used to create or verify the store
    pub fn schema(mut self, schema: Schema) -> Self {
        self.config.schema = Some(schema);
        self
    }

    /// Set how many shard index files may stay open
    pub fn shard_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.shard_cache_capacity = capacity;
        self
    }

    /// Set the append retry budget
    pub fn append_attempts(mut self, attempts: u32) -> Self {
        self.config.append_attempts = attempts;
        self
    }

    /// Set the pause between append attempts
    pub fn append_retry_delay(mut self, delay: Duration) -> Self {
        self.config.append_retry_delay = delay;
        self
    }

    /// Set the read retry budget
    pub fn read_attempts(mut self, attempts: u32) -> Self {
        self.config.read_attempts = attempts;
        self
    }

    /// Set the pause between read attempts
    pub fn read_retry_delay(mut self, delay: Duration) -> Self {
        self.config.read_retry_delay = delay;
        self
    }

    /// Set the payload read retry budget
    pub fn data_read_attempts(mut self, attempts: u32) -> Self {
        self.config.data_read_attempts = attempts;
        self
    }

    /// Set the pause between payload read attempts
    pub fn data_read_delay(mut self, delay: Duration) -> Self {
        self.config.data_read_delay = delay;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
