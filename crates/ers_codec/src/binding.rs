//! Byte bindings for scalar property values.
//!
//! Every general encoding here is order-preserving under unsigned bytewise
//! comparison, which is what all backends use for range lookups.

use crate::compressed::{decode_unsigned, encode_non_negative};
use crate::error::{CodecError, CodecResult};

const SIGN_32: u32 = 1 << 31;
const SIGN_64: u64 = 1 << 63;

/// A scalar type with a byte encoding.
pub trait Binding: Sized {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    /// Encodes the value with the general encoding.
    fn encode(&self) -> Vec<u8>;

    /// Decodes a value produced by [`Binding::encode`].
    fn decode(bytes: &[u8]) -> CodecResult<Self>;

    /// Encodes the value with the compact encoding.
    ///
    /// Types without a compact form fall back to the general encoding.
    fn encode_compressed(&self) -> CodecResult<Vec<u8>> {
        Ok(self.encode())
    }

    /// Decodes a value produced by [`Binding::encode_compressed`].
    fn decode_compressed(bytes: &[u8]) -> CodecResult<Self> {
        Self::decode(bytes)
    }
}

fn fixed<const N: usize>(type_name: &'static str, bytes: &[u8]) -> CodecResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| CodecError::invalid_length(type_name, N, bytes.len()))
}

impl Binding for i32 {
    const TYPE_NAME: &'static str = "i32";

    fn encode(&self) -> Vec<u8> {
        ((*self as u32) ^ SIGN_32).to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let raw = u32::from_be_bytes(fixed(Self::TYPE_NAME, bytes)?);
        Ok((raw ^ SIGN_32) as i32)
    }

    fn encode_compressed(&self) -> CodecResult<Vec<u8>> {
        encode_non_negative(i64::from(*self))
    }

    fn decode_compressed(bytes: &[u8]) -> CodecResult<Self> {
        i32::try_from(decode_unsigned(bytes)?).map_err(|_| CodecError::IntegerOverflow)
    }
}

impl Binding for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn encode(&self) -> Vec<u8> {
        ((*self as u64) ^ SIGN_64).to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let raw = u64::from_be_bytes(fixed(Self::TYPE_NAME, bytes)?);
        Ok((raw ^ SIGN_64) as i64)
    }

    fn encode_compressed(&self) -> CodecResult<Vec<u8>> {
        encode_non_negative(*self)
    }

    fn decode_compressed(bytes: &[u8]) -> CodecResult<Self> {
        i64::try_from(decode_unsigned(bytes)?).map_err(|_| CodecError::IntegerOverflow)
    }
}

impl Binding for bool {
    const TYPE_NAME: &'static str = "bool";

    fn encode(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match fixed::<1>(Self::TYPE_NAME, bytes)? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(CodecError::decoding_failed(format!(
                "invalid boolean byte {other}"
            ))),
        }
    }
}

impl Binding for f64 {
    const TYPE_NAME: &'static str = "f64";

    // Negative values have all bits flipped, positive ones only the sign bit,
    // which orders -inf < negatives < -0.0 < 0.0 < positives < +inf < NaN.
    fn encode(&self) -> Vec<u8> {
        let bits = self.to_bits();
        let ordered = if bits & SIGN_64 != 0 {
            !bits
        } else {
            bits | SIGN_64
        };
        ordered.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let ordered = u64::from_be_bytes(fixed(Self::TYPE_NAME, bytes)?);
        let bits = if ordered & SIGN_64 != 0 {
            ordered ^ SIGN_64
        } else {
            !ordered
        };
        Ok(f64::from_bits(bits))
    }
}

impl Binding for String {
    const TYPE_NAME: &'static str = "string";

    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}
