//! Scalar codecs.
//!
//! Each [`Scalar`] knows its native width and alignment and how to move a
//! [`Value`] in and out of a byte buffer. Native booleans are 4-byte integers.

use std::fmt;

use super::buffer::{read_array, write_slice};
use super::{MarshalError, MarshalOptions, Value};

/// Fixed-width scalar types of the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// `size_t`, 8 bytes on the supported targets.
    Usize,
    F32,
    F64,
    /// `VkBool32`-style boolean stored as a 4-byte integer.
    Bool32,
}

impl Scalar {
    /// Width in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 | Self::Bool32 => 4,
            Self::I64 | Self::U64 | Self::Usize | Self::F64 => 8,
        }
    }

    /// Scalars are naturally aligned.
    pub const fn align(self) -> usize {
        self.size()
    }

    /// The C spelling used in declarations.
    pub const fn c_name(self) -> &'static str {
        match self {
            Self::I8 => "int8_t",
            Self::U8 => "uint8_t",
            Self::I16 => "int16_t",
            Self::U16 => "uint16_t",
            Self::I32 => "int32_t",
            Self::U32 => "uint32_t",
            Self::I64 => "int64_t",
            Self::U64 => "uint64_t",
            Self::Usize => "size_t",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Bool32 => "VkBool32",
        }
    }

    /// Parse a C type name, accepting the common Vulkan typedefs.
    pub fn from_c_name(name: &str) -> Option<Self> {
        Some(match name {
            "int8_t" => Self::I8,
            "uint8_t" => Self::U8,
            "int16_t" => Self::I16,
            "uint16_t" => Self::U16,
            "int32_t" | "int" => Self::I32,
            "uint32_t" | "VkSampleMask" => Self::U32,
            "int64_t" => Self::I64,
            "uint64_t" | "VkDeviceSize" | "VkDeviceAddress" => Self::U64,
            "size_t" => Self::Usize,
            "float" => Self::F32,
            "double" => Self::F64,
            "VkBool32" | "bool32" => Self::Bool32,
            _ => return None,
        })
    }

    /// The zero value of this scalar.
    pub fn zero(self) -> Value {
        match self {
            Self::I8 => Value::I8(0),
            Self::U8 => Value::U8(0),
            Self::I16 => Value::I16(0),
            Self::U16 => Value::U16(0),
            Self::I32 => Value::I32(0),
            Self::U32 => Value::U32(0),
            Self::I64 => Value::I64(0),
            Self::U64 => Value::U64(0),
            Self::Usize => Value::Usize(0),
            Self::F32 => Value::F32(0.0),
            Self::F64 => Value::F64(0.0),
            Self::Bool32 => Value::Bool(false),
        }
    }

    /// Write `value` at `offset`. The value variant must match the scalar.
    pub fn write(
        self,
        value: &Value,
        buffer: &mut [u8],
        offset: usize,
        field: &str,
    ) -> Result<(), MarshalError> {
        match (self, value) {
            (Self::I8, Value::I8(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::U8, Value::U8(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::I16, Value::I16(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::U16, Value::U16(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::I32, Value::I32(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::U32, Value::U32(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::I64, Value::I64(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::U64, Value::U64(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::Usize, Value::Usize(v)) => {
                write_slice(buffer, offset, &(*v as u64).to_ne_bytes())
            }
            (Self::F32, Value::F32(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::F64, Value::F64(v)) => write_slice(buffer, offset, &v.to_ne_bytes()),
            (Self::Bool32, Value::Bool(v)) => {
                write_slice(buffer, offset, &u32::from(*v).to_ne_bytes())
            }
            _ => Err(MarshalError::TypeMismatch {
                field: field.to_string(),
                expected: self.c_name().to_string(),
                got: value.kind_name().to_string(),
            }),
        }
    }

    /// Read a value of this scalar at `offset`.
    pub fn read(
        self,
        buffer: &[u8],
        offset: usize,
        options: &MarshalOptions,
    ) -> Result<Value, MarshalError> {
        Ok(match self {
            Self::I8 => Value::I8(i8::from_ne_bytes(read_array(buffer, offset)?)),
            Self::U8 => Value::U8(u8::from_ne_bytes(read_array(buffer, offset)?)),
            Self::I16 => Value::I16(i16::from_ne_bytes(read_array(buffer, offset)?)),
            Self::U16 => Value::U16(u16::from_ne_bytes(read_array(buffer, offset)?)),
            Self::I32 => Value::I32(i32::from_ne_bytes(read_array(buffer, offset)?)),
            Self::U32 => Value::U32(u32::from_ne_bytes(read_array(buffer, offset)?)),
            Self::I64 => Value::I64(i64::from_ne_bytes(read_array(buffer, offset)?)),
            Self::U64 => Value::U64(u64::from_ne_bytes(read_array(buffer, offset)?)),
            Self::Usize => Value::Usize(u64::from_ne_bytes(read_array(buffer, offset)?) as usize),
            Self::F32 => Value::F32(f32::from_ne_bytes(read_array(buffer, offset)?)),
            Self::F64 => Value::F64(f64::from_ne_bytes(read_array(buffer, offset)?)),
            Self::Bool32 => {
                let raw = u32::from_ne_bytes(read_array(buffer, offset)?);
                match raw {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    _ if options.strict_bools => return Err(MarshalError::InvalidBool(raw)),
                    _ => Value::Bool(true),
                }
            }
        })
    }

    /// Whether the scalar can hold an element count.
    pub const fn is_count(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64 | Self::Usize)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}
