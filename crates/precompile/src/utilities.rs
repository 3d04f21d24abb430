//! Byte-level helpers shared by the precompile input parsers.
use alloy_primitives::{Bytes, B256};
use core::cmp::min;

/// Fixed-size window into `data` at `offset`, zero-filled past the end of
/// the buffer.
#[inline]
pub fn right_padded<const LEN: usize>(data: &[u8], offset: usize) -> [u8; LEN] {
    let mut out = [0u8; LEN];
    if let Some(tail) = data.get(offset..) {
        let take = min(tail.len(), LEN);
        out[..take].copy_from_slice(&tail[..take]);
    }
    out
}

/// Value right-aligned in a zero-filled fixed width; oversized input keeps
/// its leading bytes.
#[inline]
pub fn left_padded<const LEN: usize>(data: &[u8]) -> [u8; LEN] {
    let mut out = [0u8; LEN];
    let take = min(data.len(), LEN);
    out[LEN - take..].copy_from_slice(&data[..take]);
    out
}

/// Boolean result as a 32-byte word with the flag in the last byte.
#[inline]
pub fn bool_to_word(value: bool) -> Bytes {
    if value {
        B256::with_last_byte(1).into()
    } else {
        B256::ZERO.into()
    }
}

/// Reads a big-endian `u16` at `offset`, if the buffer is long enough.
#[inline]
pub fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes: [u8; 2] = data.get(offset..offset + 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Reads a big-endian `u32` at `offset`, if the buffer is long enough.
#[inline]
pub fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Reads a big-endian `u64` at `offset`, if the buffer is long enough.
#[inline]
pub fn read_u64_be(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Reads a 4-byte big-endian length prefix at `offset` and returns the
/// argument it frames together with the offset just past it.
#[inline]
pub fn read_length_prefixed(data: &[u8], offset: usize) -> Option<(&[u8], usize)> {
    let len = read_u32_be(data, offset)? as usize;
    let start = offset + 4;
    let end = start.checked_add(len)?;
    let arg = data.get(start..end)?;
    Some((arg, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_padding_fills_with_zeroes() {
        let padded: [u8; 4] = right_padded(&[1, 2], 0);
        assert_eq!(padded, [1, 2, 0, 0]);
        let from_offset: [u8; 4] = right_padded(&[1, 2, 3], 2);
        assert_eq!(from_offset, [3, 0, 0, 0]);
        let past_end: [u8; 4] = right_padded(&[1, 2], 5);
        assert_eq!(past_end, [0, 0, 0, 0]);
    }

    #[test]
    fn left_padding_right_aligns() {
        let padded: [u8; 4] = left_padded(&[1, 2]);
        assert_eq!(padded, [0, 0, 1, 2]);
        let truncated: [u8; 2] = left_padded(&[1, 2, 3]);
        assert_eq!(truncated, [1, 2]);
    }

    #[test]
    fn length_prefix_walks_arguments() {
        let mut buf = vec![0, 0, 0, 3, 0xaa, 0xbb, 0xcc];
        buf.extend_from_slice(&[0, 0, 0, 1, 0xdd]);
        let (first, next) = read_length_prefixed(&buf, 0).unwrap();
        assert_eq!(first, &[0xaa, 0xbb, 0xcc]);
        let (second, end) = read_length_prefixed(&buf, next).unwrap();
        assert_eq!(second, &[0xdd]);
        assert_eq!(end, buf.len());
        assert!(read_length_prefixed(&buf, end).is_none());
    }

    #[test]
    fn truncated_prefix_is_rejected() {
        assert!(read_length_prefixed(&[0, 0, 0, 9, 1], 0).is_none());
    }
}
