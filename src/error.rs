//! Error types for FileRecords
//!
//! Provides a unified error type for all operations, grouped by how the
//! store reacts to them: configuration and overflow errors are fatal,
//! contention and transient I/O errors are retried, resource errors are
//! surfaced to the caller as-is.

use thiserror::Error;

/// Result type alias using RecordError
pub type Result<T> = std::result::Result<T, RecordError>;

/// Unified error type for FileRecords operations
#[derive(Debug, Error)]
pub enum RecordError {
    // -------------------------------------------------------------------------
    // Configuration Errors (fatal, never retried)
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record size must be greater than 0")]
    InvalidRecordSize,

    #[error("Schema header '{path}' does not match the requested schema")]
    SchemaMismatch { path: String },

    #[error("Schema header corrupted: {0}")]
    HeaderCorrupt(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Value {value} does not fit in {width} byte(s)")]
    Overflow { value: u64, width: usize },

    // -------------------------------------------------------------------------
    // Contention Errors (retried by the dynamic store)
    // -------------------------------------------------------------------------
    #[error("File size limit reached: {required} bytes needed, limit is {limit}")]
    SizeLimit { limit: u64, required: u64 },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RecordError>,
    },

    // -------------------------------------------------------------------------
    // Transient I/O Errors
    // -------------------------------------------------------------------------
    #[error("Record #{0} not found")]
    RecordNotFound(u64),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: u64, written: u64 },

    #[error("Can't lock file: {0}")]
    Lock(String),

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Different record size: {actual} (need {expected})")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Record #{record} out of records range [0 - {count})")]
    OutOfRange { record: u64, count: u64 },

    #[error("Can't open file for re-write: no records")]
    NothingToRewrite,

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    // -------------------------------------------------------------------------
    // Name Lease Errors
    // -------------------------------------------------------------------------
    #[error("Name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Name busy in cell {cell} since {since}")]
    LeaseBusy { cell: u64, since: u32 },

    #[error("No free cells")]
    NoFreeCells,

    #[error("Lease file corrupted: {0}")]
    LeaseFileCorrupt(String),
}

impl RecordError {
    /// Errors that may clear up on their own when the operation is retried
    /// (another writer is mid-flight, or data has not propagated yet).
    pub fn is_transient(&self) -> bool {
        match self {
            RecordError::SizeLimit { .. }
            | RecordError::RecordNotFound(_)
            | RecordError::ShortRead { .. }
            | RecordError::ShortWrite { .. }
            | RecordError::Lock(_) => true,
            RecordError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True for errors caused by configuration rather than runtime state.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            RecordError::Config(_)
                | RecordError::InvalidRecordSize
                | RecordError::SchemaMismatch { .. }
                | RecordError::HeaderCorrupt(_)
        )
    }
}
