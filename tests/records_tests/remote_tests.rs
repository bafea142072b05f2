//! Tests for RecordFile over HTTP range requests
//!
//! These tests verify:
//! - Record counting through a HEAD request
//! - Record reads through `Range` requests
//! - Total size learned from `Content-Range`
//! - Fallback when the server ignores `Range`
//! - Total size inferred from a short read without `Content-Range`
//! - Partial data kept when a body breaks off
//! - Writes to remote resources are refused
//!
//! A minimal HTTP/1.1 server runs on a loopback port for each test.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use filerecords::records::Resource;
use filerecords::{RecordError, RecordFile};

// =============================================================================
// Test Server
// =============================================================================

/// How the test server answers range requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// 206 with `Content-Range`
    Ranged,
    /// 200 with the whole body, like servers without range support
    IgnoreRange,
    /// 206 with the requested slice but no `Content-Range`
    NoContentRange,
    /// 206 with `Content-Range`, connection closed halfway through the body
    BrokenBody,
}

/// Serve `body` on a loopback port; returns the resource URL
fn serve(body: Vec<u8>, mode: Mode) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let body = Arc::new(body);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let body = Arc::clone(&body);
            thread::spawn(move || handle(stream, &body, mode));
        }
    });

    format!("http://{}/shard-0.idx", addr)
}

fn handle(mut stream: TcpStream, body: &[u8], mode: Mode) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let method = request_line.split_whitespace().next().unwrap_or("").to_string();

    let mut range = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("range") {
                range = parse_range(value.trim(), body.len() as u64);
            }
        }
    }

    let total = body.len() as u64;
    let ranged = mode != Mode::IgnoreRange;
    let response = match (method.as_str(), range) {
        ("HEAD", _) => format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            total
        )
        .into_bytes(),
        ("GET", Some((from, to))) if ranged => {
            let part = &body[from as usize..=to as usize];
            let content_range = match mode {
                Mode::NoContentRange => String::new(),
                _ => format!("Content-Range: bytes {}-{}/{}\r\n", from, to, total),
            };
            let mut out = format!(
                "HTTP/1.1 206 Partial Content\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
                content_range,
                part.len()
            )
            .into_bytes();
            match mode {
                Mode::BrokenBody => out.extend_from_slice(&part[..part.len() / 2]),
                _ => out.extend_from_slice(part),
            }
            out
        }
        ("GET", None) if ranged => format!(
            "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            total
        )
        .into_bytes(),
        ("GET", _) => {
            let mut out = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                total
            )
            .into_bytes();
            out.extend_from_slice(body);
            out
        }
        _ => b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec(),
    };
    let _ = stream.write_all(&response);
    let _ = stream.flush();
}

/// `bytes=from-to`, clamped to the body; `None` when unsatisfiable
fn parse_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (from, to) = spec.split_once('-')?;
    let from: u64 = from.parse().ok()?;
    let to: u64 = to.parse().ok()?;
    if from >= total || to < from {
        return None;
    }
    Some((from, to.min(total - 1)))
}

fn records_body(count: u8, size: usize) -> Vec<u8> {
    (0..count).flat_map(|n| vec![b'a' + n; size]).collect()
}

// =============================================================================
// Range Read Tests
// =============================================================================

#[test]
fn test_remote_record_count() {
    let url = serve(records_body(5, 8), Mode::Ranged);
    let mut file = RecordFile::new(url.as_str(), 8).unwrap();

    assert!(file.is_remote());
    assert_eq!(file.url(), Some(url.as_str()));
    assert_eq!(file.record_count(false).unwrap(), 5);
    assert_eq!(file.file_size(), 40);
}

#[test]
fn test_remote_read_record() {
    let url = serve(records_body(5, 8), Mode::Ranged);
    let mut file = RecordFile::new(Resource::parse(&url), 8).unwrap();

    assert_eq!(file.read_record(0).unwrap(), vec![b'a'; 8]);
    assert_eq!(file.read_record(3).unwrap(), vec![b'd'; 8]);
    assert_eq!(file.read_records(3, 2).unwrap(), records_body(5, 8)[24..].to_vec());
    assert!(matches!(file.read_record(5), Err(RecordError::RecordNotFound(5))));
}

#[test]
fn test_remote_part_reports_total_size() {
    let url = serve(b"0123456789abcdef".to_vec(), Mode::Ranged);
    let mut file = RecordFile::new(url.as_str(), 4).unwrap();

    let part = file.read_part(4, 4).unwrap();
    assert_eq!(part.data, b"4567");
    assert_eq!(part.total_size, Some(16));
    assert!(part.remote);

    // Size learned from Content-Range, no HEAD needed
    assert!(file.is_open());
    assert_eq!(file.record_count(false).unwrap(), 4);
}

#[test]
fn test_remote_first_bytes() {
    let url = serve(b"short".to_vec(), Mode::Ranged);
    let mut file = RecordFile::new(url.as_str(), 1).unwrap();

    let part = file.read_first_bytes(1100, 1).unwrap().unwrap();
    assert_eq!(part.data, b"short");
    assert_eq!(part.total_size, Some(5));
}

#[test]
fn test_remote_ignored_range_falls_back() {
    let url = serve(b"0123456789".to_vec(), Mode::IgnoreRange);
    let mut file = RecordFile::new(url.as_str(), 2).unwrap();

    let part = file.read_part(6, 2).unwrap();
    assert_eq!(part.data, b"67");
    assert_eq!(part.total_size, Some(10));

    assert_eq!(file.read_record(1).unwrap(), b"23");
}

#[test]
fn test_remote_short_read_without_content_range() {
    let url = serve(b"0123456789".to_vec(), Mode::NoContentRange);
    let mut file = RecordFile::new(url.as_str(), 2).unwrap();

    // A full read reveals nothing about the total
    let part = file.read_part(0, 4).unwrap();
    assert_eq!(part.data, b"0123");
    assert_eq!(part.total_size, None);

    // A short one ends at the end of the resource
    let part = file.read_part(6, 10).unwrap();
    assert_eq!(part.data, b"6789");
    assert_eq!(part.total_size, Some(10));
    assert_eq!(file.record_count(false).unwrap(), 5);
}

#[test]
fn test_remote_broken_body_keeps_partial_data() {
    let body: Vec<u8> = (0..200u8).collect();
    let url = serve(body.clone(), Mode::BrokenBody);
    let mut file = RecordFile::new(url.as_str(), 10).unwrap();

    let part = file.read_part(0, 100).unwrap();
    assert_eq!(part.len(), 50);
    assert_eq!(part.data, body[..50].to_vec());
    assert_eq!(part.total_size, Some(200));
    assert!(part.remote);
}

#[test]
fn test_remote_range_overflow_rejected() {
    let url = serve(records_body(2, 4), Mode::Ranged);
    let mut file = RecordFile::new(url.as_str(), 4).unwrap();

    assert!(matches!(
        file.read_part(u64::MAX - 2, 10),
        Err(RecordError::Config(_))
    ));
}

// =============================================================================
// Write Rejection Tests
// =============================================================================

#[test]
fn test_remote_writes_unsupported() {
    let url = serve(records_body(2, 4), Mode::Ranged);
    let mut file = RecordFile::new(url.as_str(), 4).unwrap();

    assert!(matches!(
        file.append_record(b"zzzz"),
        Err(RecordError::Unsupported(_))
    ));
    assert!(matches!(
        file.rewrite_record(0, b"zzzz"),
        Err(RecordError::Unsupported(_))
    ));
    assert_eq!(file.read_record(0).unwrap(), b"aaaa");
}

#[test]
fn test_unreachable_remote_fails() {
    // Bind and drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let mut file = RecordFile::new(format!("http://127.0.0.1:{}/x", port).as_str(), 4).unwrap();

    assert!(matches!(file.record_count(true), Err(RecordError::Remote(_))));
}
