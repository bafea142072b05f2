//! Dynamic Record Store Module
//!
//! Variable-length records on top of fixed-size index files.
//!
//! ## Responsibilities
//! - Persist and validate the store schema
//! - Name, discover and cache shard files
//! - Append and read variable-length records
//!
//! ## Shard Format
//! ```text
//! {base}-{n}.idx  (fixed-size records, offset_width + length_width bytes)
//! ┌────────────────────┬───────────────────┐
//! │ Offset (BE)        │ Length (BE)       │  record n*R + 0
//! ├────────────────────┼───────────────────┤
//! │ Offset (BE)        │ Length (BE)       │  record n*R + 1
//! └────────────────────┴───────────────────┘
//!
//! {base}-{n}.dat  (payloads, concatenated, no delimiters)
//! ┌───────────┬─────────────┬─────┐
//! │ payload 0 │ payload 1   │ ... │
//! └───────────┴─────────────┴─────┘
//! ```

mod cache;
mod dynamic;
mod layout;
mod schema;

pub use cache::ShardCache;
pub use dynamic::{DynamicStore, IndexEntry, ShardPosition};
pub use layout::{StoreLayout, DATA_EXT, HEADER_EXT, INDEX_EXT};
pub use schema::{Schema, SchemaHeader, HEADER_MAGIC};
