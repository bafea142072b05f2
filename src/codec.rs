//! Variable-Length Integer Codec
//!
//! Packs non-negative integers into a fixed number of big-endian bytes.
//!
//! ## Layout
//! ```text
//! value = 0x0A0B0C, width = 4
//! ┌──────┬──────┬──────┬──────┐
//! │ 0x00 │ 0x0A │ 0x0B │ 0x0C │
//! └──────┴──────┴──────┴──────┘
//! ```
//!
//! Index entries use widths 1-4; `pack` accepts up to 8 and `unpack` any
//! width whose surplus leading bytes are zero.

use crate::error::{RecordError, Result};

/// Widest encoding `pack` produces
pub const MAX_WIDTH: usize = 8;

/// Largest value representable in `width` bytes
pub fn max_value(width: usize) -> u64 {
    if width >= MAX_WIDTH {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

/// Pack `value` into exactly `width` big-endian bytes
pub fn pack(value: u64, width: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; width];
    pack_into(value, &mut buf)?;
    Ok(buf)
}

/// Pack `value` into `buf`, using the whole buffer as the width
pub fn pack_into(value: u64, buf: &mut [u8]) -> Result<()> {
    let width = buf.len();
    if width == 0 || width > MAX_WIDTH {
        return Err(RecordError::Config(format!(
            "pack width must be 1..={}, got {}",
            MAX_WIDTH, width
        )));
    }
    if value > max_value(width) {
        return Err(RecordError::Overflow { value, width });
    }
    buf.copy_from_slice(&value.to_be_bytes()[MAX_WIDTH - width..]);
    Ok(())
}

/// Unpack big-endian bytes into an integer
///
/// An empty slice decodes to 0.
pub fn unpack(bytes: &[u8]) -> Result<u64> {
    let (surplus, tail) = if bytes.len() > MAX_WIDTH {
        bytes.split_at(bytes.len() - MAX_WIDTH)
    } else {
        (&[][..], bytes)
    };
    if surplus.iter().any(|&b| b != 0) {
        return Err(RecordError::Overflow {
            value: u64::MAX,
            width: MAX_WIDTH,
        });
    }
    Ok(tail.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}
