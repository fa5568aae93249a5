//! In-process representation of marshalled data.

use std::fmt;
use std::sync::Arc;

use super::{BitmaskValue, EnumValue, MarshalError, NativeHandle};

/// A value that can be encoded into, or was decoded from, native memory.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
    Bool(bool),
    Enum(EnumValue),
    Bitmask(BitmaskValue),
    /// A handle, or a pointer to memory this crate does not own.
    Handle(NativeHandle),
    /// Embedded `char[N]` text or a pointed-to C string.
    Text(String),
    /// Pointed-to raw bytes.
    Bytes(Vec<u8>),
    Struct(StructValue),
    Union(UnionValue),
    /// Fixed sequence elements or pointed-to array elements.
    Array(Vec<Value>),
    /// A null pointer.
    Null,
}

impl Value {
    /// Short name of the variant, used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::I8(_) => "int8_t",
            Self::U8(_) => "uint8_t",
            Self::I16(_) => "int16_t",
            Self::U16(_) => "uint16_t",
            Self::I32(_) => "int32_t",
            Self::U32(_) => "uint32_t",
            Self::I64(_) => "int64_t",
            Self::U64(_) => "uint64_t",
            Self::Usize(_) => "size_t",
            Self::F32(_) => "float",
            Self::F64(_) => "double",
            Self::Bool(_) => "bool",
            Self::Enum(_) => "enum",
            Self::Bitmask(_) => "bitmask",
            Self::Handle(_) => "handle",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Struct(_) => "struct",
            Self::Union(_) => "union",
            Self::Array(_) => "array",
            Self::Null => "null",
        }
    }

    /// Interpret an unsigned scalar as an element count.
    pub fn as_count(&self) -> Option<usize> {
        match *self {
            Self::U8(v) => Some(usize::from(v)),
            Self::U16(v) => Some(usize::from(v)),
            Self::U32(v) => usize::try_from(v).ok(),
            Self::U64(v) => usize::try_from(v).ok(),
            Self::Usize(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Handle(NativeHandle::NULL))
    }
}

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }

            impl TryFrom<&Value> for $ty {
                type Error = MarshalError;

                fn try_from(value: &Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(v) => Ok(v.clone()),
                        other => Err(MarshalError::TypeMismatch {
                            field: String::new(),
                            expected: stringify!($variant).to_string(),
                            got: other.kind_name().to_string(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_value_conversions! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    EnumValue => Enum,
    BitmaskValue => Bitmask,
    NativeHandle => Handle,
    String => Text,
    Vec<u8> => Bytes,
    StructValue => Struct,
    UnionValue => Union,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Field values of one structure instance, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    fields: Vec<(Arc<str>, Value)>,
}

impl StructValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a field, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Set a field, replacing any previous value in place.
    pub fn set(&mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Typed field access.
    pub fn field<'a, T>(&'a self, name: &str) -> Result<T, MarshalError>
    where
        T: TryFrom<&'a Value, Error = MarshalError>,
    {
        let value = self.get(name).ok_or_else(|| MarshalError::MissingField {
            name: String::new(),
            field: name.to_string(),
        })?;
        T::try_from(value).map_err(|e| match e {
            MarshalError::TypeMismatch { expected, got, .. } => MarshalError::TypeMismatch {
                field: name.to_string(),
                expected,
                got,
            },
            other => other,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_ref(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<Arc<str>>, V: Into<Value>> FromIterator<(N, V)> for StructValue {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut value = Self::new();
        for (n, v) in iter {
            value.set(n, v);
        }
        value
    }
}

/// The raw bytes of a union.
///
/// Which member is active cannot be recovered from memory, so a union is
/// carried as bytes and viewed through a member on demand with
/// [`StructMarshaller::union_member`](super::StructMarshaller::union_member).
#[derive(Clone, PartialEq, Eq, Default)]
pub struct UnionValue {
    bytes: Vec<u8>,
}

impl UnionValue {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for UnionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnionValue({:02x?})", self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut value = StructValue::new().with("a", 1u32).with("b", 2u32);
        value.set("a", 3u32);
        let names: Vec<_> = value.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(value.get("a"), Some(&Value::U32(3)));
    }

    #[test]
    fn test_typed_field_access() -> Result<(), MarshalError> {
        let value = StructValue::new().with("width", 640u32).with("name", "triangle");
        let width: u32 = value.field("width")?;
        let name: String = value.field("name")?;
        assert_eq!(width, 640);
        assert_eq!(name, "triangle");
        assert!(matches!(
            value.field::<i32>("width"),
            Err(MarshalError::TypeMismatch { .. })
        ));
        assert!(matches!(
            value.field::<u32>("height"),
            Err(MarshalError::MissingField { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_as_count() {
        assert_eq!(Value::U32(3).as_count(), Some(3));
        assert_eq!(Value::Usize(9).as_count(), Some(9));
        assert_eq!(Value::I32(3).as_count(), None);
    }
}
