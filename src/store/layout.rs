//! Store file naming and discovery
//!
//! ```text
//! {base_dir}/{base}.drs       schema header
//! {base_dir}/{base}-{n}.idx   index of shard n
//! {base_dir}/{base}-{n}.dat   payloads of shard n
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{RecordError, Result};

pub const HEADER_EXT: &str = "drs";
pub const INDEX_EXT: &str = "idx";
pub const DATA_EXT: &str = "dat";

/// Where a store's files live and how they are named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    base_dir: PathBuf,
    base_name: String,
}

impl StoreLayout {
    pub fn new(base_dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Result<Self> {
        let base_name = base_name.into();
        if base_name.is_empty() {
            return Err(RecordError::Config("base name must not be empty".to_string()));
        }
        Ok(Self {
            base_dir: base_dir.into(),
            base_name,
        })
    }

    /// Derive the layout from the path of a header file
    ///
    /// `data/log.drs`, `data/log` and `data/log-3` all name the store `log`
    /// in `data/`. Relative paths are resolved against the current directory.
    pub fn from_header_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RecordError::Config(format!("'{}' has no usable file name", path.display()))
            })?;

        let stem = match file_name.rsplit_once('.') {
            Some((stem, ext)) if ext == HEADER_EXT => stem,
            Some(_) => {
                return Err(RecordError::Config(format!(
                    "Header file-extension must be empty or .{}",
                    HEADER_EXT
                )))
            }
            None => file_name,
        };
        let base_name = match stem.rsplit_once('-') {
            Some((base, shard)) if !shard.is_empty() && shard.bytes().all(|b| b.is_ascii_digit()) => base,
            _ => stem,
        };

        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let base_dir = if parent.as_os_str().is_empty() {
            std::env::current_dir()?
        } else if parent.is_absolute() {
            parent.to_path_buf()
        } else {
            std::env::current_dir()?.join(parent)
        };

        Self::new(base_dir, base_name)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn header_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.{}", self.base_name, HEADER_EXT))
    }

    pub fn index_path(&self, shard: u64) -> PathBuf {
        self.base_dir.join(format!("{}-{}.{}", self.base_name, shard, INDEX_EXT))
    }

    pub fn data_path(&self, shard: u64) -> PathBuf {
        self.base_dir.join(format!("{}-{}.{}", self.base_name, shard, DATA_EXT))
    }

    /// Shard numbers that have an index file, ascending
    pub fn discover_shards(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut shards = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(shard) = self.parse_shard_number(&entry.path()) {
                shards.push(shard);
            }
        }
        shards.sort_unstable();
        Ok(shards)
    }

    /// "{base}-42.idx" -> Some(42)
    fn parse_shard_number(&self, path: &Path) -> Option<u64> {
        if path.extension()?.to_str()? != INDEX_EXT {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let number = stem.strip_prefix(self.base_name.as_str())?.strip_prefix('-')?;
        number.parse().ok()
    }
}
