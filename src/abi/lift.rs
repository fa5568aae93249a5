//! Decoding values out of native memory.

use super::buffer::{read_array, read_slice, read_uint};
use super::handle::POINTER_SIZE;
use super::{
    ComputedLayout, FieldDescriptor, FieldKind, MarshalError, NativeHandle, PointerKind,
    ScopedArena, StructMarshaller, StructValue, UnionValue, Value,
};

impl StructMarshaller {
    /// Decode the record at `base_offset` of `buffer`.
    ///
    /// Pointer fields are followed only into memory `arena` owns. A non-null
    /// address outside the arena comes back as [`Value::Handle`].
    pub fn decode(
        &self,
        buffer: &[u8],
        layout: &ComputedLayout,
        base_offset: usize,
        arena: &ScopedArena,
    ) -> Result<StructValue, MarshalError> {
        let needed = base_offset.saturating_add(layout.size());
        if buffer.len() < needed {
            return Err(MarshalError::BufferTooSmall {
                needed,
                available: buffer.len(),
            });
        }
        if layout.is_union() {
            return Err(MarshalError::TypeMismatch {
                field: layout.name().to_string(),
                expected: "struct".to_string(),
                got: "union".to_string(),
            });
        }

        let mut record = StructValue::new();
        for field in layout.members() {
            let name = field.label();
            let offset = base_offset + field.offset();
            let value = match (field.discriminant(), field.kind()) {
                (Some(expected), kind) => {
                    self.lift_discriminant(kind, buffer, offset, expected, name)?
                }
                (None, FieldKind::Pointer(pointer @ PointerKind::Array { count_field, .. }))
                | (None, FieldKind::Pointer(pointer @ PointerKind::Bytes { len_field: count_field })) => {
                    let count = self.read_count(layout, count_field, buffer, base_offset)?;
                    self.lift_pointer(pointer, buffer, offset, arena, name, Some(count))?
                }
                (None, kind) => self.lift_element(kind, buffer, offset, arena, name)?,
            };
            record.set(field.name.clone().unwrap_or_else(|| name.into()), value);
        }
        Ok(record)
    }

    fn lift_discriminant(
        &self,
        kind: &FieldKind,
        buffer: &[u8],
        offset: usize,
        expected: i32,
        field: &str,
    ) -> Result<Value, MarshalError> {
        let got = i32::from_ne_bytes(read_array(buffer, offset)?);
        if got != expected {
            return Err(MarshalError::DiscriminantMismatch {
                field: field.to_string(),
                expected,
                got,
            });
        }
        Ok(match kind {
            FieldKind::Enum(codec) => Value::Enum(codec.decode(got)),
            _ => Value::I32(got),
        })
    }

    fn read_count(
        &self,
        layout: &ComputedLayout,
        count_field: &str,
        buffer: &[u8],
        base_offset: usize,
    ) -> Result<usize, MarshalError> {
        let field: &FieldDescriptor =
            layout
                .field(count_field)
                .ok_or_else(|| MarshalError::UnknownField {
                    name: layout.name().to_string(),
                    field: count_field.to_string(),
                })?;
        let raw = read_uint(buffer, base_offset + field.offset(), field.width())?;
        usize::try_from(raw).map_err(|_| MarshalError::InvalidPointer {
            address: raw,
            len: 0,
        })
    }

    /// Decode one value of `kind` at `offset`.
    pub(crate) fn lift_element(
        &self,
        kind: &FieldKind,
        buffer: &[u8],
        offset: usize,
        arena: &ScopedArena,
        field: &str,
    ) -> Result<Value, MarshalError> {
        match kind {
            FieldKind::Padding => Ok(Value::Null),
            FieldKind::Scalar(scalar) => scalar.read(buffer, offset, &self.options),
            FieldKind::Enum(codec) => {
                let raw = i32::from_ne_bytes(read_array(buffer, offset)?);
                let value = if self.options.strict_enums {
                    codec.decode_strict(raw)?
                } else {
                    codec.decode(raw)
                };
                Ok(Value::Enum(value))
            }
            FieldKind::Bitmask(codec) => {
                let raw = read_uint(buffer, offset, codec.width().size())?;
                Ok(Value::Bitmask(codec.decode(raw)?))
            }
            FieldKind::Handle => Ok(Value::Handle(NativeHandle::from_raw(read_uint(
                buffer,
                offset,
                POINTER_SIZE,
            )?))),
            FieldKind::Pointer(pointer) => {
                self.lift_pointer(pointer, buffer, offset, arena, field, None)
            }
            FieldKind::Struct(layout) => {
                Ok(Value::Struct(self.decode(buffer, layout, offset, arena)?))
            }
            FieldKind::Union(layout) => Ok(Value::Union(UnionValue::from_bytes(
                read_slice(buffer, offset, layout.size())?.to_vec(),
            ))),
            FieldKind::Sequence { element, count } => {
                let stride = element.size();
                (0..*count)
                    .map(|i| self.lift_element(element, buffer, offset + i * stride, arena, field))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            FieldKind::Text { capacity } => {
                let bytes = read_slice(buffer, offset, *capacity)?;
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let text = bytes.get(..end).unwrap_or_default();
                String::from_utf8(text.to_vec())
                    .map(Value::Text)
                    .map_err(|_| MarshalError::InvalidText {
                        field: field.to_string(),
                    })
            }
        }
    }

    /// Follow the pointer at `offset`. Counted pointers without a known count
    /// cannot be followed and come back as handles.
    fn lift_pointer(
        &self,
        pointer: &PointerKind,
        buffer: &[u8],
        offset: usize,
        arena: &ScopedArena,
        field: &str,
        count: Option<usize>,
    ) -> Result<Value, MarshalError> {
        let address = read_uint(buffer, offset, POINTER_SIZE)?;
        if address == 0 {
            return Ok(Value::Null);
        }
        if !arena.owns(address) {
            return Ok(Value::Handle(NativeHandle::from_raw(address)));
        }
        match (pointer, count) {
            (PointerKind::CString, _) => String::from_utf8(arena.read_cstr(address)?.to_vec())
                .map(Value::Text)
                .map_err(|_| MarshalError::InvalidText {
                    field: field.to_string(),
                }),
            (PointerKind::Bytes { .. }, Some(len)) => {
                Ok(Value::Bytes(arena.read(address, len)?.to_vec()))
            }
            (PointerKind::Array { element, .. }, Some(len)) => {
                // The count was written by native code and is not trusted.
                let stride = element.size();
                let block = arena.read(address, stride.saturating_mul(len))?;
                let mut items = Vec::new();
                items
                    .try_reserve_exact(len)
                    .map_err(|_| MarshalError::AllocationFailed { size: len })?;
                for i in 0..len {
                    items.push(self.lift_element(element, block, i * stride, arena, field)?);
                }
                Ok(Value::Array(items))
            }
            (PointerKind::Struct(layout), _) => {
                let block = arena.read(address, layout.size())?;
                Ok(Value::Struct(self.decode(block, layout, 0, arena)?))
            }
            _ => Ok(Value::Handle(NativeHandle::from_raw(address))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::abi::{EnumCodec, EnumValue, LayoutBuilder, MarshalOptions, Scalar};

    fn format_codec() -> Result<Arc<EnumCodec>, MarshalError> {
        EnumCodec::builder("VkFormat")
            .variant("VK_FORMAT_UNDEFINED", 0)
            .variant("VK_FORMAT_R8G8B8A8_UNORM", 37)
            .build()
            .map(Arc::new)
    }

    fn surface_format() -> Result<ComputedLayout, MarshalError> {
        LayoutBuilder::structure("VkSurfaceFormatKHR")
            .field("format", FieldKind::Enum(format_codec()?))
            .field("supported", FieldKind::Scalar(Scalar::Bool32))
            .build()
    }

    fn raw(format: i32, supported: u32) -> Vec<u8> {
        let mut bytes = format.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&supported.to_ne_bytes());
        bytes
    }

    #[test]
    fn test_unknown_enum_value_is_lenient_by_default() -> Result<(), MarshalError> {
        let layout = surface_format()?;
        let arena = ScopedArena::new();
        let record =
            StructMarshaller::default().decode(&raw(1_000_156_000, 1), &layout, 0, &arena)?;
        assert_eq!(
            record.get("format"),
            Some(&Value::Enum(EnumValue::Raw(1_000_156_000)))
        );
        Ok(())
    }

    #[test]
    fn test_strict_enums_reject_unknown_values() -> Result<(), MarshalError> {
        let layout = surface_format()?;
        let arena = ScopedArena::new();
        let strict = StructMarshaller::new(MarshalOptions {
            strict_enums: true,
            ..MarshalOptions::default()
        });
        assert!(matches!(
            strict.decode(&raw(1_000_156_000, 1), &layout, 0, &arena),
            Err(MarshalError::UnknownEnumValue {
                value: 1_000_156_000,
                ..
            })
        ));
        let known = strict.decode(&raw(37, 1), &layout, 0, &arena)?;
        let format: EnumValue = known.field("format")?;
        assert_eq!(format.symbol(), Some("VK_FORMAT_R8G8B8A8_UNORM"));
        Ok(())
    }

    #[test]
    fn test_strict_bools_reject_other_values() -> Result<(), MarshalError> {
        let layout = surface_format()?;
        let arena = ScopedArena::new();
        let lenient = StructMarshaller::default().decode(&raw(0, 2), &layout, 0, &arena)?;
        assert_eq!(lenient.get("supported"), Some(&Value::Bool(true)));

        let strict = StructMarshaller::new(MarshalOptions::strict());
        assert!(matches!(
            strict.decode(&raw(0, 2), &layout, 0, &arena),
            Err(MarshalError::InvalidBool(2))
        ));
        Ok(())
    }

    #[test]
    fn test_text_stops_at_terminator() -> Result<(), MarshalError> {
        let layout = LayoutBuilder::structure("VkExtensionProperties")
            .field("extensionName", FieldKind::Text { capacity: 8 })
            .build()?;
        let arena = ScopedArena::new();
        let marshaller = StructMarshaller::default();

        let record = marshaller.decode(b"VK_KHR\0\xff", &layout, 0, &arena)?;
        assert_eq!(record.get("extensionName"), Some(&Value::from("VK_KHR")));

        // Unterminated text fills the whole field.
        let record = marshaller.decode(b"ABCDEFGH", &layout, 0, &arena)?;
        assert_eq!(record.get("extensionName"), Some(&Value::from("ABCDEFGH")));

        assert!(matches!(
            marshaller.decode(b"\xff\xfe\0\0\0\0\0\0", &layout, 0, &arena),
            Err(MarshalError::InvalidText { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_discriminant_is_verified() -> Result<(), MarshalError> {
        let codec = Arc::new(
            EnumCodec::builder("VkStructureType")
                .variant("VK_STRUCTURE_TYPE_APPLICATION_INFO", 0)
                .variant("VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO", 1)
                .build()?,
        );
        let layout = LayoutBuilder::structure("VkInstanceCreateInfo")
            .discriminant("sType", &codec, "VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO")
            .build()?;
        let arena = ScopedArena::new();
        let marshaller = StructMarshaller::default();
        assert!(matches!(
            marshaller.decode(&0i32.to_ne_bytes(), &layout, 0, &arena),
            Err(MarshalError::DiscriminantMismatch {
                expected: 1,
                got: 0,
                ..
            })
        ));
        assert_eq!(
            marshaller.decode(&1i32.to_ne_bytes(), &layout, 0, &arena)?,
            layout.default_value()
        );
        Ok(())
    }

    #[test]
    fn test_short_buffer_is_an_error() -> Result<(), MarshalError> {
        let layout = surface_format()?;
        let arena = ScopedArena::new();
        assert!(matches!(
            StructMarshaller::default().decode(&[0u8; 8], &layout, 4, &arena),
            Err(MarshalError::BufferTooSmall {
                needed: 12,
                available: 8
            })
        ));
        assert!(matches!(
            StructMarshaller::default().decode(&[0u8; 8], &layout, usize::MAX, &arena),
            Err(MarshalError::BufferTooSmall { .. })
        ));
        Ok(())
    }

    fn batch() -> Result<ComputedLayout, MarshalError> {
        LayoutBuilder::structure("Batch")
            .field("count", FieldKind::Scalar(Scalar::U64))
            .optional(
                "items",
                FieldKind::array_pointer(FieldKind::Scalar(Scalar::U64), "count"),
            )
            .build()
    }

    #[test]
    fn test_native_count_overflow_is_an_error() -> Result<(), MarshalError> {
        let layout = batch()?;
        let value = StructValue::new()
            .with("count", 2u64)
            .with("items", Value::Array(vec![Value::U64(1), Value::U64(2)]));

        let result = StructMarshaller::default().call(&value, &layout, |frame| {
            frame.buffer()[..8].copy_from_slice(&u64::MAX.to_ne_bytes());
            Ok(())
        });
        assert!(matches!(result, Err(MarshalError::InvalidPointer { .. })));

        // A count larger than the allocation is rejected the same way.
        let result = StructMarshaller::default().call(&value, &layout, |frame| {
            frame.buffer()[..8].copy_from_slice(&3u64.to_ne_bytes());
            Ok(())
        });
        assert!(matches!(result, Err(MarshalError::InvalidPointer { .. })));
        Ok(())
    }

    #[test]
    fn test_native_count_for_empty_elements_is_bounded() -> Result<(), MarshalError> {
        let empty = Arc::new(LayoutBuilder::structure("Empty").build()?);
        let layout = LayoutBuilder::structure("Batch")
            .field("count", FieldKind::Scalar(Scalar::U64))
            .optional(
                "items",
                FieldKind::array_pointer(FieldKind::Struct(empty), "count"),
            )
            .build()?;
        let value = StructValue::new()
            .with("count", 0u64)
            .with("items", Value::Array(Vec::new()));

        let result = StructMarshaller::default().call(&value, &layout, |frame| {
            frame.buffer()[..8].copy_from_slice(&u64::MAX.to_ne_bytes());
            Ok(())
        });
        assert!(matches!(result, Err(MarshalError::AllocationFailed { .. })));
        Ok(())
    }

    #[test]
    fn test_foreign_addresses_become_handles() -> Result<(), MarshalError> {
        let layout = batch()?;
        let mut buffer = 0u64.to_ne_bytes().to_vec();
        buffer.extend_from_slice(&0xdead_0000u64.to_ne_bytes());
        let arena = ScopedArena::new();
        let record = StructMarshaller::default().decode(&buffer, &layout, 0, &arena)?;
        assert_eq!(
            record.get("items"),
            Some(&Value::Handle(NativeHandle::from_raw(0xdead_0000)))
        );
        Ok(())
    }
}
