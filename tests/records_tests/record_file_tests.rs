//! Tests for RecordFile over local files and handles
//!
//! These tests verify:
//! - Construction and record size validation
//! - Append / count / read of fixed-size records
//! - Size mismatch and size limit rejection without side effects
//! - In-place rewrite
//! - Open-mode transitions and close/reopen
//! - Start offsets, caller-owned handles and partial reads

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use filerecords::records::{OpenMode, Resource};
use filerecords::{RecordError, RecordFile};
use tempfile::TempDir;

const RECORD_SIZE: u64 = 32;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("records.dat");
    (temp_dir, path)
}

fn record(fill: u8) -> Vec<u8> {
    vec![fill; RECORD_SIZE as usize]
}

/// Append `count` distinct records, checking the returned numbers
fn create_file_with_records(file: &mut RecordFile, count: u64) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    for n in 0..count {
        let rec = record(b'A' + (n % 26) as u8);
        assert_eq!(file.append_record(&rec).unwrap(), n);
        records.push(rec);
    }
    records
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_zero_record_size_fails() {
    let (_temp, path) = setup_temp_file();
    let result = RecordFile::new(path, 0);
    assert!(matches!(result, Err(RecordError::InvalidRecordSize)));
}

#[test]
fn test_missing_file_has_no_records() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();

    assert_eq!(file.record_count(false).unwrap(), 0);
    assert!(!path.exists());
}

#[test]
fn test_resource_parse() {
    assert!(matches!(Resource::parse("https://example.com/x.idx"), Resource::Url(_)));
    assert!(matches!(Resource::parse("HTTP://example.com/x.idx"), Resource::Url(_)));
    assert!(matches!(Resource::parse("data/x.idx"), Resource::Path(_)));
    assert!(matches!(Resource::parse("http"), Resource::Path(_)));
}

// =============================================================================
// Append / Read Tests
// =============================================================================

#[test]
fn test_append_and_count() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();

    let records = create_file_with_records(&mut file, 10);

    assert_eq!(file.record_count(false).unwrap(), 10);
    assert_eq!(file.record_count(true).unwrap(), 10);
    assert_eq!(fs::read(&path).unwrap(), records.concat());
}

#[test]
fn test_read_each_record() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    let records = create_file_with_records(&mut file, 10);

    for (n, expected) in records.iter().enumerate() {
        assert_eq!(&file.read_record(n as u64).unwrap(), expected);
    }
}

#[test]
fn test_read_out_of_range() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 10);

    assert!(matches!(file.read_record(10), Err(RecordError::RecordNotFound(10))));
    assert!(matches!(file.read_record(11), Err(RecordError::RecordNotFound(11))));
    assert!(matches!(
        file.read_record(u64::MAX),
        Err(RecordError::RecordNotFound(u64::MAX))
    ));
}

#[test]
fn test_read_missing_file_fails() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 2);

    file.close();
    fs::remove_file(&path).unwrap();

    assert!(matches!(file.read_record(1), Err(RecordError::Io(_))));
}

#[test]
fn test_read_multiple_records() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    let records = create_file_with_records(&mut file, 5);

    assert_eq!(file.read_records(1, 3).unwrap(), records[1..4].concat());
    // Past the end the result is simply short
    assert_eq!(file.read_records(3, 5).unwrap(), records[3..5].concat());
}

#[test]
fn test_batch_append() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 2);

    let batch = vec![record(b'x'), record(b'y'), record(b'z')];
    assert_eq!(file.append_records(&batch).unwrap(), 2);
    assert_eq!(file.record_count(false).unwrap(), 5);
    assert_eq!(file.read_record(4).unwrap(), record(b'z'));
}

#[test]
fn test_append_after_close_continues_numbering() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 3);

    file.close();
    assert_eq!(file.append_record(&record(b'M')).unwrap(), 3);
    assert_eq!(file.record_count(false).unwrap(), 4);
}

#[test]
fn test_external_append_is_seen() {
    let (_temp, path) = setup_temp_file();
    let mut writer = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();
    let mut reader = RecordFile::new(path, RECORD_SIZE).unwrap();

    writer.append_record(&record(b'a')).unwrap();
    assert_eq!(reader.read_record(0).unwrap(), record(b'a'));

    writer.append_record(&record(b'b')).unwrap();
    // Cached count is stale, the miss forces a recount
    assert_eq!(reader.read_record(1).unwrap(), record(b'b'));
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_size_mismatch_leaves_file_unchanged() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 3);
    let size_before = fs::metadata(&path).unwrap().len();

    let result = file.append_record(b"abc");
    assert!(matches!(
        result,
        Err(RecordError::SizeMismatch { expected: 32, actual: 3 })
    ));

    // One bad record spoils the whole batch
    let batch = vec![record(b'x'), b"short".to_vec()];
    assert!(file.append_records(&batch).is_err());

    assert_eq!(fs::metadata(&path).unwrap().len(), size_before);
    assert_eq!(file.record_count(true).unwrap(), 3);
}

#[test]
fn test_size_mismatch_with_huge_record_size() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), u64::MAX).unwrap();

    let batch: [&[u8]; 2] = [b"ab", b"cd"];
    assert!(matches!(
        file.append_records(&batch),
        Err(RecordError::SizeMismatch { expected: u64::MAX, actual: 2 })
    ));
    assert!(!path.exists());
}

#[test]
fn test_size_limit_leaves_file_unchanged() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 2);
    let size_before = fs::metadata(&path).unwrap().len();

    file.set_file_size_limit(Some(size_before));
    let result = file.append_record(&record(b'L'));
    assert!(matches!(
        result,
        Err(RecordError::SizeLimit { limit, required }) if limit == size_before && required == size_before + RECORD_SIZE
    ));
    assert_eq!(fs::metadata(&path).unwrap().len(), size_before);

    // Lock was released: a second writer can still append
    file.set_file_size_limit(None);
    let mut other = RecordFile::new(path, RECORD_SIZE).unwrap();
    assert_eq!(other.append_record(&record(b'N')).unwrap(), 2);
}

#[test]
fn test_size_limit_exact_fit_allowed() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE)
        .unwrap()
        .with_file_size_limit(RECORD_SIZE * 2);

    assert_eq!(file.append_record(&record(b'1')).unwrap(), 0);
    assert_eq!(file.append_record(&record(b'2')).unwrap(), 1);
    assert!(matches!(
        file.append_record(&record(b'3')),
        Err(RecordError::SizeLimit { .. })
    ));
}

// =============================================================================
// Rewrite Tests
// =============================================================================

#[test]
fn test_rewrite_record() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    let records = create_file_with_records(&mut file, 10);

    let replacement = record(b'X');
    assert_eq!(file.rewrite_record(5, &replacement).unwrap(), 5);
    assert_eq!(file.read_record(5).unwrap(), replacement);
    assert_eq!(file.read_record(4).unwrap(), records[4]);
    assert_eq!(file.read_record(6).unwrap(), records[6]);
    assert_eq!(file.record_count(true).unwrap(), 10);
}

#[test]
fn test_rewrite_out_of_range() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 10);

    let result = file.rewrite_record(10, &record(b'X'));
    assert!(matches!(
        result,
        Err(RecordError::OutOfRange { record: 10, count: 10 })
    ));
}

#[test]
fn test_rewrite_size_checks() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path, RECORD_SIZE).unwrap();
    create_file_with_records(&mut file, 2);

    assert!(matches!(
        file.rewrite_record(1, b"abc"),
        Err(RecordError::SizeMismatch { .. })
    ));

    // Unchecked rewrites may update a prefix of the record
    file.rewrite_record_unchecked(1, b"abc").unwrap();
    let back = file.read_record(1).unwrap();
    assert_eq!(&back[..3], b"abc");
    assert_eq!(&back[3..], &record(b'B')[3..]);

    // ...but not spill into the next one
    let too_long = vec![0u8; RECORD_SIZE as usize + 1];
    assert!(matches!(
        file.rewrite_record_unchecked(0, &too_long),
        Err(RecordError::SizeMismatch { .. })
    ));
}

// =============================================================================
// Mode Tests
// =============================================================================

#[test]
fn test_open_modes() {
    let (_temp, path) = setup_temp_file();
    let mut file = RecordFile::new(path.clone(), RECORD_SIZE).unwrap();

    // Nothing to rewrite in an empty file
    assert!(matches!(
        file.open(OpenMode::ReadWrite),
        Err(RecordError::NothingToRewrite)
    ));
    assert_eq!(file.mode(), Some(OpenMode::Closed));

    file.open(OpenMode::Append).unwrap();
    assert_eq!(file.mode(), Some(OpenMode::Append));

    file.append_record(&record(b'A')).unwrap();
    assert_eq!(file.read_record(0).unwrap(), record(b'A'));
    // Reads reuse the append handle
    assert_eq!(file.mode(), Some(OpenMode::Append));

    file.open(OpenMode::ReadWrite).unwrap();
    assert_eq!(file.mode(), Some(OpenMode::ReadWrite));
    file.rewrite_record(0, &record(b'Z')).unwrap();

    file.close();
    assert_eq!(file.mode(), Some(OpenMode::Closed));
    assert!(!file.is_open());

    fs::remove_file(&path).unwrap();
    assert!(matches!(file.open(OpenMode::ReadOnly), Err(RecordError::Io(_))));
}

// =============================================================================
// Start Offset / Handle / Partial Read Tests
// =============================================================================

#[test]
fn test_start_offset() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"HEADER").unwrap();

    let mut file = RecordFile::new(path.clone(), 4).unwrap().with_start_offset(6);
    assert_eq!(file.record_count(true).unwrap(), 0);

    assert_eq!(file.append_record(b"aaaa").unwrap(), 0);
    assert_eq!(file.append_record(b"bbbb").unwrap(), 1);
    assert_eq!(file.read_record(1).unwrap(), b"bbbb");

    file.rewrite_record(0, b"cccc").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"HEADERccccbbbb");
}

#[test]
fn test_handle_source() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, [record(b'a'), record(b'b')].concat()).unwrap();

    let handle = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let mut file = RecordFile::new(handle, RECORD_SIZE).unwrap();

    assert_eq!(file.record_count(true).unwrap(), 2);
    assert_eq!(file.read_record(1).unwrap(), record(b'b'));
    assert_eq!(file.append_record(&record(b'c')).unwrap(), 2);
    assert_eq!(file.read_record(2).unwrap(), record(b'c'));
    assert_eq!(file.mode(), None);
    assert!(file.path().is_none());
}

#[test]
fn test_read_part_and_first_bytes() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"0123456789").unwrap();
    let mut file = RecordFile::new(path, 2).unwrap();

    let part = file.read_part(3, 4).unwrap();
    assert_eq!(part.data, b"3456");
    assert_eq!(part.total_size, Some(10));
    assert!(!part.remote);

    let first = file.read_first_bytes(100, 4).unwrap().unwrap();
    assert_eq!(first.data, b"0123456789");
    assert_eq!(first.total_size, Some(10));

    assert!(file.read_first_bytes(100, 11).unwrap().is_none());
}
