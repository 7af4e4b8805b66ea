//! Dynamically typed property values and their encoding flags.

use crate::binding::Binding;
use crate::error::CodecResult;

/// A scalar value that can be stored as an entity property.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// Boolean value.
    Bool(bool),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Encodes with the general encoding, or the compact one if `compressed`.
    pub fn encode(&self, compressed: bool) -> CodecResult<Vec<u8>> {
        match (self, compressed) {
            (Value::Int(v), false) => Ok(v.encode()),
            (Value::Int(v), true) => v.encode_compressed(),
            (Value::Long(v), false) => Ok(v.encode()),
            (Value::Long(v), true) => v.encode_compressed(),
            (Value::Bool(v), _) => Ok(v.encode()),
            (Value::Double(v), _) => Ok(v.encode()),
            (Value::Text(v), _) => Ok(v.encode()),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    PropertyValue::new(Value::$variant(value))
                }
            }
        )*
    };
}

impl_from_scalar! {
    i32 => Int,
    i64 => Long,
    bool => Bool,
    f64 => Double,
    String => Text,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::new(Value::from(value))
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::new(value)
    }
}

/// A value together with the encoding chosen for it.
///
/// Searchable values are stored as properties and can be queried with
/// `find*`. Non-searchable values are stored as blobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    /// The wrapped value.
    pub value: Value,
    /// Whether the compact order-preserving encoding is used.
    pub compressed: bool,
    /// Whether the value is indexed for lookups.
    pub searchable: bool,
}

impl PropertyValue {
    /// Wraps a value with the general, searchable encoding.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            compressed: false,
            searchable: true,
        }
    }

    /// Switches to the compact order-preserving encoding.
    #[must_use]
    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    /// Marks the value as opaque.
    #[must_use]
    pub fn non_searchable(mut self) -> Self {
        self.searchable = false;
        self
    }

    /// Encodes the wrapped value.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        self.value.encode(self.compressed)
    }
}

/// Wrapping helpers available on every scalar.
///
/// ```
/// use ers_codec::ValueExt;
///
/// let age = 42i32.compressed();
/// assert!(age.compressed && age.searchable);
///
/// let avatar = "!@#%^&".non_searchable();
/// assert!(!avatar.searchable);
/// ```
pub trait ValueExt: Into<PropertyValue> {
    /// Wraps the value with the compact order-preserving encoding.
    fn compressed(self) -> PropertyValue {
        let value: PropertyValue = self.into();
        value.compressed()
    }

    /// Wraps the value as opaque.
    fn non_searchable(self) -> PropertyValue {
        let value: PropertyValue = self.into();
        value.non_searchable()
    }
}

impl<T: Into<PropertyValue>> ValueExt for T {}
