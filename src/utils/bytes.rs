//! Byte-slice utilities for bounds-oriented parsing.
//!
//! There are two layers:
//! - **Option layer** (`read_*`): helpers that return `Option<T>`.
//! - **Result layer** (`*_r`): wrappers that map `None` to [`TruncatedRead`].
//!
//! All numeric reads are **big-endian**: resource data was written by 68k/PowerPC machines and
//! templates never describe any other byte order.

use crate::err::TruncatedRead;

use byteorder::{BigEndian, ByteOrder};

/// Read `N` raw bytes at `offset`.
///
/// Returns `None` if the range is out of bounds.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

/// Read a single byte at `offset`.
pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

/// Read a `u16` (big-endian) at `offset`.
pub(crate) fn read_u16_be(buf: &[u8], offset: usize) -> Option<u16> {
    Some(BigEndian::read_u16(&read_array::<2>(buf, offset)?))
}

/// Read a `u32` (big-endian) at `offset`.
pub(crate) fn read_u32_be(buf: &[u8], offset: usize) -> Option<u32> {
    Some(BigEndian::read_u32(&read_array::<4>(buf, offset)?))
}

/// Read a `u64` (big-endian) at `offset`.
pub(crate) fn read_u64_be(buf: &[u8], offset: usize) -> Option<u64> {
    Some(BigEndian::read_u64(&read_array::<8>(buf, offset)?))
}

#[inline]
pub(crate) fn truncated(what: &'static str, offset: usize, need: usize, len: usize) -> TruncatedRead {
    TruncatedRead {
        what,
        offset,
        need,
        have: len.saturating_sub(offset),
    }
}

pub(crate) fn slice_r<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], TruncatedRead> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))?;
    buf.get(offset..end)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))
}

/// Read `N` raw bytes at `offset`, or return [`TruncatedRead`].
pub(crate) fn read_array_r<const N: usize>(
    buf: &[u8],
    offset: usize,
    what: &'static str,
) -> Result<[u8; N], TruncatedRead> {
    read_array::<N>(buf, offset).ok_or_else(|| truncated(what, offset, N, buf.len()))
}

pub(crate) fn read_u16_be_r(
    buf: &[u8],
    offset: usize,
    what: &'static str,
) -> Result<u16, TruncatedRead> {
    read_u16_be(buf, offset).ok_or_else(|| truncated(what, offset, 2, buf.len()))
}

pub(crate) fn read_u32_be_r(
    buf: &[u8],
    offset: usize,
    what: &'static str,
) -> Result<u32, TruncatedRead> {
    read_u32_be(buf, offset).ok_or_else(|| truncated(what, offset, 4, buf.len()))
}

pub(crate) fn read_u64_be_r(
    buf: &[u8],
    offset: usize,
    what: &'static str,
) -> Result<u64, TruncatedRead> {
    read_u64_be(buf, offset).ok_or_else(|| truncated(what, offset, 8, buf.len()))
}

/// Append the low `width` bytes of `value` in big-endian order.
///
/// `width` must be one of 1, 2, 4 or 8; the caller has already range-checked `value`.
pub(crate) fn write_uint_be(out: &mut Vec<u8>, value: u64, width: usize) {
    let mut scratch = [0_u8; 8];
    BigEndian::write_uint(&mut scratch[..width], value, width);
    out.extend_from_slice(&scratch[..width]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_big_endian() {
        let buf = [0x00, 0x0A, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
        assert_eq!(read_u16_be(&buf, 0), Some(10));
        assert_eq!(read_u32_be(&buf, 2), Some(0x1234_5678));
        assert_eq!(read_u64_be(&buf, 2), Some(0x1234_5678_9ABC_DEF0));
        assert_eq!(read_u16_be(&buf, 9), None);
    }

    #[test]
    fn test_truncated_reports_remaining_bytes() {
        let buf = [0_u8; 3];
        let err = read_u32_be_r(&buf, 1, "long").unwrap_err();
        assert_eq!(
            err,
            TruncatedRead {
                what: "long",
                offset: 1,
                need: 4,
                have: 2
            }
        );
    }

    #[test]
    fn test_write_uint_be() {
        let mut out = vec![];
        write_uint_be(&mut out, 0x0102, 2);
        write_uint_be(&mut out, 0xFF, 1);
        write_uint_be(&mut out, 0x0A0B_0C0D, 4);
        assert_eq!(out, vec![0x01, 0x02, 0xFF, 0x0A, 0x0B, 0x0C, 0x0D]);
    }
}
