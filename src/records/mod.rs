//! Fixed-Size Record Files
//!
//! Treats a flat byte stream as a dense array of equal-length records.
//!
//! ## Responsibilities
//! - Count, read, append and rewrite records by number
//! - Serialize appends across processes with advisory locks
//! - Serve local paths, caller-owned handles and HTTP(S) resources
//!
//! ## Layout
//! ```text
//! ┌──────────────┬──────────┬──────────┬─────┬──────────┐
//! │ start_offset │ record 0 │ record 1 │ ... │ record N │
//! └──────────────┴──────────┴──────────┴─────┴──────────┘
//!                 └─ record_size bytes each
//! ```

mod file;
mod lock;
mod mode;
mod remote;
mod source;

pub use file::RecordFile;
pub use lock::ExclusiveLock;
pub use mode::{FileHandle, OpenMode, Transition};
pub use remote::{parse_content_range_total, HttpRange};
pub use source::{Part, Resource};
