//! Advisory exclusive file locks
//!
//! Appends follow lock -> read size -> write -> unlock. The guard releases
//! the lock on drop so early returns cannot leak it.

use std::fs::File;

use fs2::FileExt;

use crate::error::{RecordError, Result};

/// Holds an exclusive advisory lock until dropped
pub struct ExclusiveLock<'a> {
    file: &'a File,
}

impl<'a> ExclusiveLock<'a> {
    /// Block until the exclusive lock on `file` is acquired
    pub fn acquire(file: &'a File) -> Result<Self> {
        FileExt::lock_exclusive(file).map_err(|e| RecordError::Lock(e.to_string()))?;
        Ok(Self { file })
    }

    /// The locked file
    pub fn file(&self) -> &File {
        self.file
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!("failed to release file lock: {}", e);
        }
    }
}
