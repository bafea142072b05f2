//! # FileRecords
//!
//! An embeddable, file-based record store with:
//! - Fixed-size record files (local, caller-owned handle, or HTTP(S) range reads)
//! - Variable-size records sharded across index + data file pairs
//! - Cross-process write safety through advisory file locks
//! - Bounded retries for readers racing in-flight writes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DynamicStore                             │
//! │          (append / read variable-length records)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ ShardCache  │          │ Data files  │
//!   │ (random     │          │ {base}-N.dat│
//!   │  eviction)  │          └─────────────┘
//!   └──────┬──────┘
//!          │
//!          ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ RecordFile  │─────────▶│    codec    │
//!   │ {base}-N.idx│          │ (BE packed) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use filerecords::{DynamicStore, Schema};
//!
//! let schema = Schema::new(100_000, 3, 2).unwrap();
//! let store = DynamicStore::open("data/test.drs", Some(schema)).unwrap();
//!
//! let n1 = store.append(b"lalala!").unwrap();
//! let n2 = store.append(b"bla-bla-bla!").unwrap();
//!
//! assert_eq!(store.read(n2).unwrap(), b"bla-bla-bla!");
//! assert_eq!(store.read(n1).unwrap(), b"lalala!");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod records;
pub mod store;
pub mod lease;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RecordError, Result};
pub use config::StoreConfig;
pub use records::{RecordFile, Resource};
pub use store::{DynamicStore, Schema};
pub use lease::NameLease;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FileRecords
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
