//! # ERS Codec
//!
//! Byte encodings for entity property values.
//!
//! Two encoding families are provided:
//! - a general encoding per scalar type ([`Binding::encode`]), itself
//!   order-preserving for numbers so plain values can be range-queried
//! - a compact order-preserving encoding for non-negative integers
//!   ([`Binding::encode_compressed`]), which rejects negative input
//!
//! Backends only ever see raw bytes and compare them as unsigned byte
//! strings.
//!
//! ## Usage
//!
//! ```
//! use ers_codec::{Binding, ValueExt};
//!
//! let bytes = 42i64.encode();
//! assert_eq!(i64::decode(&bytes).unwrap(), 42);
//!
//! let age = 20i32.compressed();
//! assert_eq!(i32::decode_compressed(&age.encode().unwrap()).unwrap(), 20);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binding;
mod compressed;
mod error;
mod value;
pub mod varint;

pub use binding::Binding;
pub use compressed::{decode_unsigned, encode_non_negative, encode_unsigned, MAX_COMPRESSED_LEN};
pub use error::{CodecError, CodecResult};
pub use value::{PropertyValue, Value, ValueExt};
