//! Compact order-preserving encoding for non-negative integers.
//!
//! Layout: one length byte `n` in `0..=8`, followed by the `n` significant
//! big-endian bytes of the value. Zero encodes as `[0]`. A longer encoding
//! always denotes a larger value, so the bytewise order of encodings equals
//! the numeric order of the values.

use crate::error::{CodecError, CodecResult};

/// Maximum size of a compressed encoding.
pub const MAX_COMPRESSED_LEN: usize = 9;

/// Encodes an unsigned value.
pub fn encode_unsigned(value: u64) -> Vec<u8> {
    let significant = ((u64::BITS - value.leading_zeros()) as usize).div_ceil(8);
    let mut out = Vec::with_capacity(1 + significant);
    out.push(significant as u8);
    out.extend_from_slice(&value.to_be_bytes()[8 - significant..]);
    out
}

/// Decodes an unsigned value, rejecting non-canonical input.
pub fn decode_unsigned(bytes: &[u8]) -> CodecResult<u64> {
    let (&len, payload) = bytes.split_first().ok_or(CodecError::UnexpectedEof)?;
    let len = len as usize;
    if len > 8 {
        return Err(CodecError::decoding_failed(format!(
            "compressed length byte {len} exceeds 8"
        )));
    }
    if payload.len() != len {
        return Err(CodecError::invalid_length("compressed", len + 1, bytes.len()));
    }
    if payload.first() == Some(&0) {
        return Err(CodecError::decoding_failed(
            "compressed value has a leading zero byte",
        ));
    }
    Ok(payload.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Encodes a signed value that must be non-negative.
pub fn encode_non_negative(value: i64) -> CodecResult<Vec<u8>> {
    u64::try_from(value)
        .map(encode_unsigned)
        .map_err(|_| CodecError::NegativeCompressed { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_is_a_single_byte() {
        assert_eq!(encode_unsigned(0), vec![0]);
        assert_eq!(decode_unsigned(&[0]).unwrap(), 0);
    }

    #[test]
    fn max_uses_nine_bytes() {
        let bytes = encode_unsigned(u64::MAX);
        assert_eq!(bytes.len(), MAX_COMPRESSED_LEN);
        assert_eq!(decode_unsigned(&bytes).unwrap(), u64::MAX);
    }

    #[test]
    fn rejects_negative() {
        assert_eq!(
            encode_non_negative(-1),
            Err(CodecError::NegativeCompressed { value: -1 })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_unsigned(&[]).is_err());
        assert!(decode_unsigned(&[9, 1, 1, 1, 1, 1, 1, 1, 1, 1]).is_err());
        assert!(decode_unsigned(&[2, 1]).is_err());
        assert!(decode_unsigned(&[2, 0, 1]).is_err());
    }

    proptest! {
        #[test]
        fn preserves_order(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(a.cmp(&b), encode_unsigned(a).cmp(&encode_unsigned(b)));
        }

        #[test]
        fn decodes_what_it_encodes(v in any::<u64>()) {
            prop_assert_eq!(decode_unsigned(&encode_unsigned(v)).unwrap(), v);
        }
    }
}
