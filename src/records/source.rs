//! Resource identifiers and partial reads

use std::fs::File;
use std::path::{Path, PathBuf};

/// Where a record file's bytes come from
#[derive(Debug)]
pub enum Resource {
    /// Local file, opened lazily in whatever mode an operation needs
    Path(PathBuf),
    /// Already-open handle owned by the record file from now on
    Handle(File),
    /// `http://` or `https://` URL read with byte-range requests
    Url(String),
}

impl Resource {
    /// Classify a string: URLs by scheme, anything else is a local path
    pub fn parse(resource: &str) -> Self {
        let lower = resource
            .get(..8)
            .unwrap_or(resource)
            .to_ascii_lowercase();
        if lower.starts_with("https://") || lower.starts_with("http://") {
            Resource::Url(resource.to_string())
        } else {
            Resource::Path(PathBuf::from(resource))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Resource::Url(_))
    }
}

impl From<PathBuf> for Resource {
    fn from(path: PathBuf) -> Self {
        Resource::Path(path)
    }
}

impl From<&Path> for Resource {
    fn from(path: &Path) -> Self {
        Resource::Path(path.to_path_buf())
    }
}

impl From<File> for Resource {
    fn from(file: File) -> Self {
        Resource::Handle(file)
    }
}

impl From<&str> for Resource {
    fn from(resource: &str) -> Self {
        Resource::parse(resource)
    }
}

/// Result of a byte-range read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Bytes read; may be shorter than requested
    pub data: Vec<u8>,
    /// Total size of the resource when the read revealed it
    pub total_size: Option<u64>,
    /// Whether the bytes came over the network
    pub remote: bool,
}

impl Part {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
