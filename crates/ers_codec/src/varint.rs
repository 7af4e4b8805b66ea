//! Unsigned VLQ varints and a byte cursor for length-prefixed formats.

use crate::error::{CodecError, CodecResult};

/// Maximum allowed length prefix.
/// Guards allocations when reading untrusted input.
const MAX_BYTES_LENGTH: u64 = 1 << 30;

/// Appends `value` as an unsigned LEB128 varint.
pub fn write_vlq(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Appends a varint length followed by the bytes.
pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_vlq(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Appends a varint length followed by the UTF-8 bytes.
pub fn write_str(out: &mut Vec<u8>, value: &str) {
    write_bytes(out, value.as_bytes());
}

/// Sequential reader over a byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a new reader for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Current offset into the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reads one byte.
    #[inline]
    pub fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads exactly `len` bytes.
    #[inline]
    pub fn read_exact(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::IntegerOverflow)?;
        let bytes = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Reads an unsigned varint.
    pub fn read_vlq(&mut self) -> CodecResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift == 63 && byte > 1 {
                return Err(CodecError::IntegerOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(CodecError::IntegerOverflow);
            }
        }
    }

    /// Reads a varint that must fit in `u32`.
    pub fn read_vlq_u32(&mut self) -> CodecResult<u32> {
        u32::try_from(self.read_vlq()?).map_err(|_| CodecError::IntegerOverflow)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_vlq()?;
        if len > MAX_BYTES_LENGTH {
            return Err(CodecError::decoding_failed(format!(
                "byte string length {len} exceeds limit"
            )));
        }
        self.read_exact(len as usize)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> CodecResult<&'a str> {
        std::str::from_utf8(self.read_bytes()?).map_err(|_| CodecError::InvalidUtf8)
    }
}
