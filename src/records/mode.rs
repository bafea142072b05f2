//! Open-mode state machine
//!
//! A local record file is held open in at most one mode at a time. The
//! handle and its mode live together in `FileHandle`, so there is no way to
//! hold a file without knowing what it was opened for.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{RecordError, Result};

/// Mode a record file is currently open in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Closed,
    ReadOnly,
    /// Append at end, reads allowed; file is created when missing
    Append,
    /// Rewrite in place, reads allowed; file must already exist
    ReadWrite,
}

/// What to do with the current handle when a mode is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Current handle already serves the requested mode
    Reuse,
    /// Close (if open) and open again in the requested mode
    Reopen,
    /// Close and stay closed
    Close,
}

impl OpenMode {
    /// Transition from `self` to `requested`
    ///
    /// Every open mode can serve reads, so `ReadOnly` reuses any open handle.
    pub fn transition(self, requested: OpenMode) -> Transition {
        match (self, requested) {
            (_, OpenMode::Closed) => Transition::Close,
            (OpenMode::Closed, _) => Transition::Reopen,
            (_, OpenMode::ReadOnly) => Transition::Reuse,
            (current, requested) if current == requested => Transition::Reuse,
            _ => Transition::Reopen,
        }
    }

    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            OpenMode::ReadOnly => {
                options.read(true);
            }
            OpenMode::Append => {
                options.read(true).append(true).create(true);
            }
            OpenMode::ReadWrite => {
                options.read(true).write(true);
            }
            OpenMode::Closed => {}
        }
        options
    }
}

/// An owned file handle together with the mode it was opened in
#[derive(Debug)]
pub struct FileHandle {
    mode: OpenMode,
    file: Option<File>,
}

impl Default for FileHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandle {
    pub fn new() -> Self {
        Self {
            mode: OpenMode::Closed,
            file: None,
        }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Open `path` in `requested` mode, reusing the current handle when the
    /// transition allows it.
    ///
    /// `record_count` guards `ReadWrite`: there is nothing to rewrite in an
    /// empty file.
    pub fn open(&mut self, path: &Path, requested: OpenMode, record_count: u64) -> Result<&mut File> {
        match self.mode.transition(requested) {
            Transition::Reuse => {}
            Transition::Close => {
                self.close();
                return Err(RecordError::Config(
                    "cannot open a file in Closed mode".to_string(),
                ));
            }
            Transition::Reopen => {
                self.close();
                if requested == OpenMode::ReadWrite && record_count == 0 {
                    return Err(RecordError::NothingToRewrite);
                }
                let file = requested.options().open(path)?;
                tracing::trace!(path = %path.display(), mode = ?requested, "opened record file");
                self.file = Some(file);
                self.mode = requested;
            }
        }
        self.file
            .as_mut()
            .ok_or_else(|| RecordError::Config("file handle lost its file".to_string()))
    }

    /// Drop the handle; the OS descriptor closes with it
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::trace!(mode = ?self.mode, "closed record file");
        }
        self.mode = OpenMode::Closed;
    }
}
