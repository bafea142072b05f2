//! Name Lease
//!
//! Reserves names for a limited time, e.g. so that several processes
//! producing the same output file do not clobber each other. Leases live in
//! one fixed-size record file of 64-byte cells.
//!
//! ## Cell Format
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────┬───────────────┐
//! │ Time (4) │ Prog (1) │ Tmp (8)  │ Len (1) │ Name (50)     │
//! └──────────┴──────────┴──────────┴─────────┴───────────────┘
//! ```
//! Time is a big-endian unix timestamp; 0 marks a free cell.
//!
//! Cells are rewritten without a lock, so one lease file should only be
//! mutated under external mutual exclusion.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::{RecordError, Result};
use crate::records::RecordFile;

/// Bytes per cell
pub const CELL_SIZE: u64 = 64;
/// Longest name a cell can hold
pub const MAX_NAME_LEN: usize = 50;
/// Length of generated temporary names
pub const TMP_NAME_LEN: usize = 8;
/// File name of the lease file inside its directory
pub const LEASE_FILE_NAME: &str = "namesquat.tmp";
/// Default number of cells
pub const DEFAULT_CELLS: u64 = 50;

const TIME_AT: usize = 0;
const PROGRESS_AT: usize = 4;
const TMP_AT: usize = 5;
const LEN_AT: usize = 13;
const NAME_AT: usize = 14;

/// Decoded contents of an occupied cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseCell {
    pub cell: u64,
    /// Unix time of the last acquire or progress update; 0 when free
    pub time: u32,
    pub progress: u8,
    pub tmp: String,
    pub name: String,
}

/// Outcome of looking a name up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// The name is leased
    Held(LeaseCell),
    /// The name is not leased; first free cell, if any
    Free(Option<u64>),
}

/// A freshly acquired lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub cell: u64,
    pub tmp: String,
    /// Temporary name of an expired lease this one replaced
    pub previous_tmp: Option<String>,
}

/// Table of time-limited name leases
pub struct NameLease {
    path: PathBuf,
    cells: u64,
    file: RecordFile,
}

impl NameLease {
    /// Open (or create zero-filled) the lease file in `dir`
    pub fn open(dir: &Path, cells: u64) -> Result<Self> {
        if cells == 0 {
            return Err(RecordError::Config("lease file needs at least one cell".to_string()));
        }
        let dir = dir.canonicalize()?;
        let path = dir.join(LEASE_FILE_NAME);
        let size = cells * CELL_SIZE;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&vec![0u8; size as usize])?;
                file.sync_all()?;
                tracing::debug!(path = %path.display(), cells, "created lease file");
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let actual = std::fs::metadata(&path)?.len();
        if actual != size {
            return Err(RecordError::LeaseFileCorrupt(format!(
                "'{}' is {} bytes, expected {}",
                path.display(),
                actual,
                size
            )));
        }

        let file = RecordFile::new(path.clone(), CELL_SIZE)?;
        Ok(Self { path, cells, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cells(&self) -> u64 {
        self.cells
    }

    /// All occupied cells, in cell order
    pub fn entries(&mut self) -> Result<Vec<LeaseCell>> {
        let content = self.content()?;
        Ok(content
            .chunks_exact(CELL_SIZE as usize)
            .enumerate()
            .map(|(cell, row)| decode_cell(cell as u64, row))
            .filter(|cell| cell.time != 0)
            .collect())
    }

    /// Find the cell leasing `name`, or the first free cell
    pub fn scan(&mut self, name: &str) -> Result<Scan> {
        check_name(name)?;
        let content = self.content()?;
        let mut free = None;
        for (cell, row) in content.chunks_exact(CELL_SIZE as usize).enumerate() {
            let decoded = decode_cell(cell as u64, row);
            if decoded.time == 0 {
                free.get_or_insert(cell as u64);
            } else if decoded.name == name {
                return Ok(Scan::Held(decoded));
            }
        }
        Ok(Scan::Free(free))
    }

    /// Lease `name` for `ttl_secs` seconds
    ///
    /// An existing lease blocks until `time + ttl_secs` has passed, after
    /// which it is taken over. `time_offset` shifts the recorded time.
    pub fn acquire(&mut self, name: &str, ttl_secs: u64, time_offset: i64) -> Result<Lease> {
        let now = now_secs(0);
        let (cell, previous_tmp) = match self.scan(name)? {
            Scan::Free(Some(cell)) => (cell, None),
            Scan::Free(None) => return Err(RecordError::NoFreeCells),
            Scan::Held(held) => {
                if u64::from(held.time) + ttl_secs >= u64::from(now) {
                    return Err(RecordError::LeaseBusy {
                        cell: held.cell,
                        since: held.time,
                    });
                }
                (held.cell, Some(held.tmp))
            }
        };

        let tmp = generate_tmp();
        let mut row = Vec::with_capacity(NAME_AT + name.len());
        row.extend_from_slice(&now_secs(time_offset).to_be_bytes());
        row.push(0);
        row.extend_from_slice(tmp.as_bytes());
        row.push(name.len() as u8);
        row.extend_from_slice(name.as_bytes());
        self.file.rewrite_record_unchecked(cell, &row)?;

        tracing::debug!(name, cell, tmp = %tmp, "acquired lease");
        Ok(Lease {
            cell,
            tmp,
            previous_tmp,
        })
    }

    /// Decode one cell straight from the file
    pub fn read_cell(&mut self, cell: u64) -> Result<LeaseCell> {
        let row = self.file.read_record(cell)?;
        if row.len() as u64 != CELL_SIZE {
            return Err(RecordError::ShortRead {
                expected: CELL_SIZE,
                actual: row.len() as u64,
            });
        }
        Ok(decode_cell(cell, &row))
    }

    /// Refresh the lease time and record a progress byte
    pub fn update_progress(&mut self, cell: u64, progress: u8, time_offset: i64) -> Result<()> {
        let mut row = now_secs(time_offset).to_be_bytes().to_vec();
        row.push(progress);
        self.file.rewrite_record_unchecked(cell, &row)?;
        Ok(())
    }

    /// Free a cell
    pub fn release(&mut self, cell: u64) -> Result<()> {
        self.file.rewrite_record_unchecked(cell, &0u32.to_be_bytes())?;
        tracing::debug!(cell, "released lease");
        Ok(())
    }

    /// Whole lease table, re-read from disk
    fn content(&mut self) -> Result<Vec<u8>> {
        let count = self.file.record_count(true)?;
        if count != self.cells {
            return Err(RecordError::LeaseFileCorrupt(format!(
                "{} cells on disk, expected {}",
                count, self.cells
            )));
        }
        let content = self.file.read_records(0, self.cells)?;
        if content.len() as u64 != self.cells * CELL_SIZE {
            return Err(RecordError::LeaseFileCorrupt(format!(
                "read {} bytes, expected {}",
                content.len(),
                self.cells * CELL_SIZE
            )));
        }
        Ok(content)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(RecordError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn decode_cell(cell: u64, row: &[u8]) -> LeaseCell {
    let time = u32::from_be_bytes([
        row[TIME_AT],
        row[TIME_AT + 1],
        row[TIME_AT + 2],
        row[TIME_AT + 3],
    ]);
    let len = usize::from(row[LEN_AT]).min(MAX_NAME_LEN);
    LeaseCell {
        cell,
        time,
        progress: row[PROGRESS_AT],
        tmp: String::from_utf8_lossy(&row[TMP_AT..TMP_AT + TMP_NAME_LEN]).into_owned(),
        name: String::from_utf8_lossy(&row[NAME_AT..NAME_AT + len]).into_owned(),
    }
}

/// Unix seconds shifted by `offset`, clamped to the u32 range
fn now_secs(offset: i64) -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    (now + offset).clamp(0, i64::from(u32::MAX)) as u32
}

fn generate_tmp() -> String {
    let mut rng = rand::thread_rng();
    (0..TMP_NAME_LEN)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}
