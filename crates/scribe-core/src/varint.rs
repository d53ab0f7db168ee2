//! Base-128 varint codec.
//!
//! Each byte carries 7 value bits, least-significant group first, with the
//! high bit set while more bytes follow.

use bytes::BufMut;

use crate::error::ScribeError;

/// Longest legal encoding: 10 bytes cover all 64 bits
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` with the minimal number of bytes
pub fn encode(mut value: u64, buf: &mut impl BufMut) {
    loop {
        if value < 0x80 {
            buf.put_u8(value as u8);
            break;
        } else {
            buf.put_u8(((value & 0x7F) | 0x80) as u8);
            value >>= 7;
        }
    }
}

/// Number of bytes `encode` will write for `value`
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decode a varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed. Fails when the
/// continuation chain runs past [`MAX_VARINT_LEN`] or the input ends
/// mid-sequence.
pub fn decode(buf: &[u8]) -> Result<(u64, usize), ScribeError> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte < 0x80 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(ScribeError::MalformedVarint(format!(
            "continuation chain exceeds {MAX_VARINT_LEN} bytes"
        )))
    } else {
        Err(ScribeError::MalformedVarint(
            "input exhausted mid-sequence".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(value: u64) {
        let mut buf = BytesMut::new();
        encode(value, &mut buf);
        assert_eq!(buf.len(), encoded_len(value));

        let (decoded, consumed) = decode(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_varint_roundtrip() {
        for value in [0, 1, 127, 128, 150, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            roundtrip(value);
        }
    }

    #[test]
    fn test_single_byte_values() {
        let mut buf = BytesMut::new();
        encode(127, &mut buf);
        assert_eq!(&buf[..], &[0x7F]);
    }

    #[test]
    fn test_two_byte_boundary() {
        let mut buf = BytesMut::new();
        encode(300, &mut buf);
        assert_eq!(&buf[..], &[0xAC, 0x02]);
    }

    #[test]
    fn test_max_value_is_ten_bytes() {
        let mut buf = BytesMut::new();
        encode(u64::MAX, &mut buf);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_decode_with_trailing_bytes() {
        let (value, consumed) = decode(&[0xAC, 0x02, 0xFF, 0xFF]).unwrap();
        assert_eq!(value, 300);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(matches!(
            decode(&[]),
            Err(ScribeError::MalformedVarint(_))
        ));
    }

    #[test]
    fn test_decode_truncated_sequence() {
        assert!(matches!(
            decode(&[0x80, 0x80]),
            Err(ScribeError::MalformedVarint(_))
        ));
    }

    #[test]
    fn test_decode_overlong_chain() {
        let bytes = [0x80u8; 11];
        assert!(matches!(
            decode(&bytes),
            Err(ScribeError::MalformedVarint(_))
        ));
    }
}
