//! Encoding values into native memory.

use super::buffer::{write_slice, write_uint, zero_fill, zeroed};
use super::handle::POINTER_SIZE;
use super::{
    ComputedLayout, FieldDescriptor, FieldKind, MarshalError, PointerKind, ScopedArena,
    StructMarshaller, StructValue, Value,
};

impl StructMarshaller {
    /// Encode a record into a fresh buffer of `layout.size()` bytes.
    ///
    /// Data behind pointer fields is copied into `arena`, which must outlive
    /// any native call that receives the buffer.
    pub fn encode(
        &self,
        value: &StructValue,
        layout: &ComputedLayout,
        arena: &mut ScopedArena,
    ) -> Result<Vec<u8>, MarshalError> {
        let mut buffer = zeroed(layout.size())?;
        self.encode_into(value, layout, &mut buffer, 0, arena)?;
        Ok(buffer)
    }

    /// Encode a record into `buffer` at `base_offset`.
    ///
    /// Padding is zeroed, so a buffer can be reused across calls. For a union
    /// layout the record must hold exactly one member.
    pub fn encode_into(
        &self,
        value: &StructValue,
        layout: &ComputedLayout,
        buffer: &mut [u8],
        base_offset: usize,
        arena: &mut ScopedArena,
    ) -> Result<(), MarshalError> {
        for (name, _) in value.iter() {
            if layout.field(name).is_none() {
                return Err(MarshalError::UnknownField {
                    name: layout.name().to_string(),
                    field: name.to_string(),
                });
            }
        }

        if layout.is_union() {
            return self.encode_union(value, layout, buffer, base_offset, arena);
        }

        for field in layout.fields() {
            let offset = base_offset + field.offset();
            if field.is_padding() {
                zero_fill(buffer, offset, field.width())?;
                continue;
            }
            let name = field.label();
            if let Some(raw) = field.discriminant() {
                self.check_discriminant(field, value.get(name), raw)?;
                write_slice(buffer, offset, &raw.to_ne_bytes())?;
                continue;
            }
            let field_value = value.get(name).ok_or_else(|| MarshalError::MissingField {
                name: layout.name().to_string(),
                field: name.to_string(),
            })?;
            self.check_count(field, field_value, value)?;
            self.lower_element(
                field.kind(),
                field_value,
                buffer,
                offset,
                arena,
                name,
                field.is_optional(),
            )?;
        }
        Ok(())
    }

    fn encode_union(
        &self,
        value: &StructValue,
        layout: &ComputedLayout,
        buffer: &mut [u8],
        base_offset: usize,
        arena: &mut ScopedArena,
    ) -> Result<(), MarshalError> {
        let mut members = value.iter();
        let (Some((name, member_value)), None) = (members.next(), members.next()) else {
            return Err(MarshalError::TypeMismatch {
                field: layout.name().to_string(),
                expected: "exactly one union member".to_string(),
                got: format!("{} members", value.len()),
            });
        };
        let field = layout.field(name).ok_or_else(|| MarshalError::UnknownField {
            name: layout.name().to_string(),
            field: name.to_string(),
        })?;
        zero_fill(buffer, base_offset, layout.size())?;
        self.lower_element(
            field.kind(),
            member_value,
            buffer,
            base_offset + field.offset(),
            arena,
            name,
            field.is_optional(),
        )
    }

    fn check_discriminant(
        &self,
        field: &FieldDescriptor,
        value: Option<&Value>,
        expected: i32,
    ) -> Result<(), MarshalError> {
        let got = match (field.kind(), value) {
            (_, None) => return Ok(()),
            (FieldKind::Enum(codec), Some(Value::Enum(e))) => codec.encode_value(e)?,
            (_, Some(Value::I32(raw))) => *raw,
            (kind, Some(other)) => {
                return Err(MarshalError::TypeMismatch {
                    field: field.label().to_string(),
                    expected: kind.describe(),
                    got: other.kind_name().to_string(),
                });
            }
        };
        if got != expected {
            return Err(MarshalError::DiscriminantMismatch {
                field: field.label().to_string(),
                expected,
                got,
            });
        }
        Ok(())
    }

    /// A count field must not promise more elements than the pointer carries,
    /// or the callee reads past the end of the block.
    fn check_count(
        &self,
        field: &FieldDescriptor,
        value: &Value,
        record: &StructValue,
    ) -> Result<(), MarshalError> {
        let count_field = match field.kind() {
            FieldKind::Pointer(PointerKind::Array { count_field, .. }) => count_field,
            FieldKind::Pointer(PointerKind::Bytes { len_field }) => len_field,
            _ => return Ok(()),
        };
        let available = match value {
            Value::Array(items) => items.len(),
            Value::Bytes(bytes) => bytes.len(),
            _ => return Ok(()),
        };
        let count = record
            .get(count_field)
            .and_then(Value::as_count)
            .unwrap_or(0);
        if count > available {
            return Err(MarshalError::CountMismatch {
                field: field.label().to_string(),
                count_field: count_field.to_string(),
                count,
                available,
            });
        }
        Ok(())
    }

    /// Encode one value of `kind` at `offset`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn lower_element(
        &self,
        kind: &FieldKind,
        value: &Value,
        buffer: &mut [u8],
        offset: usize,
        arena: &mut ScopedArena,
        field: &str,
        optional: bool,
    ) -> Result<(), MarshalError> {
        match (kind, value) {
            (FieldKind::Padding, _) => Ok(()),
            (FieldKind::Scalar(scalar), _) => scalar.write(value, buffer, offset, field),
            (FieldKind::Enum(codec), Value::Enum(e)) => {
                write_slice(buffer, offset, &codec.encode_value(e)?.to_ne_bytes())
            }
            (FieldKind::Bitmask(codec), Value::Bitmask(bits)) => {
                let raw = codec.encode_value(bits)?;
                write_uint(buffer, offset, codec.width().size(), raw)
            }
            (FieldKind::Handle, Value::Handle(handle)) => {
                write_uint(buffer, offset, POINTER_SIZE, handle.as_raw())
            }
            (FieldKind::Handle, Value::Null) => write_uint(buffer, offset, POINTER_SIZE, 0),
            (FieldKind::Pointer(pointer), _) => {
                let address = self.lower_pointer(pointer, value, arena, field, optional)?;
                write_uint(buffer, offset, POINTER_SIZE, address)
            }
            (FieldKind::Struct(layout), Value::Struct(record)) => {
                self.encode_into(record, layout, buffer, offset, arena)
            }
            (FieldKind::Union(layout), Value::Union(union)) => {
                if union.as_bytes().len() != layout.size() {
                    return Err(MarshalError::TypeMismatch {
                        field: field.to_string(),
                        expected: format!("{} bytes", layout.size()),
                        got: format!("{} bytes", union.as_bytes().len()),
                    });
                }
                write_slice(buffer, offset, union.as_bytes())
            }
            (FieldKind::Sequence { element, count }, Value::Array(items)) => {
                if items.len() != *count {
                    return Err(MarshalError::SequenceLength {
                        field: field.to_string(),
                        expected: *count,
                        got: items.len(),
                    });
                }
                let stride = element.size();
                for (i, item) in items.iter().enumerate() {
                    self.lower_element(
                        element,
                        item,
                        buffer,
                        offset + i * stride,
                        arena,
                        field,
                        optional,
                    )?;
                }
                Ok(())
            }
            (FieldKind::Text { capacity }, Value::Text(text)) => {
                let bytes = text.as_bytes();
                if bytes.contains(&0) {
                    return Err(MarshalError::InvalidText {
                        field: field.to_string(),
                    });
                }
                if bytes.len() >= *capacity {
                    return Err(MarshalError::TextTooLong {
                        field: field.to_string(),
                        len: bytes.len(),
                        capacity: *capacity,
                    });
                }
                write_slice(buffer, offset, bytes)?;
                zero_fill(buffer, offset + bytes.len(), capacity - bytes.len())
            }
            (kind, value) => Err(MarshalError::TypeMismatch {
                field: field.to_string(),
                expected: kind.describe(),
                got: value.kind_name().to_string(),
            }),
        }
    }

    /// Copy the pointee into the arena and return its address.
    fn lower_pointer(
        &self,
        pointer: &PointerKind,
        value: &Value,
        arena: &mut ScopedArena,
        field: &str,
        optional: bool,
    ) -> Result<u64, MarshalError> {
        if value.is_null() {
            if !optional {
                return Err(MarshalError::NullPointer {
                    field: field.to_string(),
                });
            }
            return Ok(0);
        }
        match (pointer, value) {
            (_, Value::Handle(handle)) => Ok(handle.as_raw()),
            (PointerKind::CString, Value::Text(text)) => {
                if text.as_bytes().contains(&0) {
                    return Err(MarshalError::InvalidText {
                        field: field.to_string(),
                    });
                }
                arena.alloc_cstring(text)
            }
            (PointerKind::Bytes { .. }, Value::Bytes(bytes)) => {
                arena.alloc_bytes(bytes, POINTER_SIZE)
            }
            (PointerKind::Array { element, .. }, Value::Array(items)) => {
                let stride = element.size();
                let len = stride
                    .checked_mul(items.len())
                    .ok_or(MarshalError::AllocationFailed { size: usize::MAX })?;
                let mut block = zeroed(len)?;
                for (i, item) in items.iter().enumerate() {
                    self.lower_element(element, item, &mut block, i * stride, arena, field, false)?;
                }
                arena.alloc_bytes(&block, element.align())
            }
            (PointerKind::Struct(layout), Value::Struct(record)) => {
                let mut block = zeroed(layout.size())?;
                self.encode_into(record, layout, &mut block, 0, arena)?;
                arena.alloc_bytes(&block, layout.align())
            }
            (pointer, value) => Err(MarshalError::TypeMismatch {
                field: field.to_string(),
                expected: FieldKind::Pointer(pointer.clone()).describe(),
                got: value.kind_name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::abi::{LayoutBuilder, Scalar};

    const U32: FieldKind = FieldKind::Scalar(Scalar::U32);

    fn named(capacity: usize) -> Result<ComputedLayout, MarshalError> {
        LayoutBuilder::structure("VkLayerProperties")
            .field("layerName", FieldKind::Text { capacity })
            .field("specVersion", U32)
            .build()
    }

    fn encode(value: &StructValue, layout: &ComputedLayout) -> Result<Vec<u8>, MarshalError> {
        StructMarshaller::default().encode(value, layout, &mut ScopedArena::new())
    }

    #[test]
    fn test_text_must_leave_room_for_terminator() -> Result<(), MarshalError> {
        let layout = named(8)?;
        let fits = StructValue::new()
            .with("layerName", "1234567")
            .with("specVersion", 1u32);
        let bytes = encode(&fits, &layout)?;
        assert_eq!(bytes.get(..8), Some(&b"1234567\0"[..]));

        let full = fits.clone().with("layerName", "12345678");
        assert!(matches!(
            encode(&full, &layout),
            Err(MarshalError::TextTooLong {
                len: 8,
                capacity: 8,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_interior_nul_is_rejected() -> Result<(), MarshalError> {
        let layout = named(16)?;
        let value = StructValue::new()
            .with("layerName", "VK\0LAYER")
            .with("specVersion", 1u32);
        assert!(matches!(
            encode(&value, &layout),
            Err(MarshalError::InvalidText { ref field }) if field == "layerName"
        ));

        let pointer = LayoutBuilder::structure("VkApplicationInfo")
            .field("pApplicationName", FieldKind::Pointer(PointerKind::CString))
            .build()?;
        let value = StructValue::new().with("pApplicationName", "demo\0");
        assert!(matches!(
            encode(&value, &pointer),
            Err(MarshalError::InvalidText { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_sequence_length_must_match() -> Result<(), MarshalError> {
        let layout = LayoutBuilder::structure("VkPhysicalDeviceLimits")
            .field("maxComputeWorkGroupCount", FieldKind::sequence(U32, 3))
            .build()?;
        let short = StructValue::new().with(
            "maxComputeWorkGroupCount",
            Value::Array(vec![Value::U32(1), Value::U32(1)]),
        );
        assert!(matches!(
            encode(&short, &layout),
            Err(MarshalError::SequenceLength {
                expected: 3,
                got: 2,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_union_needs_exactly_one_member() -> Result<(), MarshalError> {
        let layout = LayoutBuilder::union("VkClearColorValue")
            .field("float32", FieldKind::sequence(FieldKind::Scalar(Scalar::F32), 4))
            .field("uint32", FieldKind::sequence(U32, 4))
            .build()?;
        let none = StructValue::new();
        assert!(matches!(
            encode(&none, &layout),
            Err(MarshalError::TypeMismatch { .. })
        ));

        let both = StructValue::new()
            .with("float32", Value::Array(vec![Value::F32(0.0); 4]))
            .with("uint32", Value::Array(vec![Value::U32(0); 4]));
        assert!(matches!(
            encode(&both, &layout),
            Err(MarshalError::TypeMismatch { .. })
        ));

        let one = StructValue::new().with("uint32", Value::Array(vec![Value::U32(7); 4]));
        assert_eq!(encode(&one, &layout)?.len(), 16);
        Ok(())
    }

    #[test]
    fn test_fields_must_match_layout() -> Result<(), MarshalError> {
        let layout = LayoutBuilder::structure("VkExtent2D")
            .field("width", U32)
            .field("height", U32)
            .build()?;

        let missing = StructValue::new().with("width", 1u32);
        assert!(matches!(
            encode(&missing, &layout),
            Err(MarshalError::MissingField { ref field, .. }) if field == "height"
        ));

        let extra = StructValue::new()
            .with("width", 1u32)
            .with("height", 2u32)
            .with("depth", 3u32);
        assert!(matches!(
            encode(&extra, &layout),
            Err(MarshalError::UnknownField { ref field, .. }) if field == "depth"
        ));

        let wrong = StructValue::new().with("width", 1u64).with("height", 2u32);
        assert!(matches!(
            encode(&wrong, &layout),
            Err(MarshalError::TypeMismatch { ref field, .. }) if field == "width"
        ));
        Ok(())
    }

    #[test]
    fn test_reused_buffer_padding_is_zeroed() -> Result<(), MarshalError> {
        let layout = LayoutBuilder::structure("Padded")
            .field("a", FieldKind::Scalar(Scalar::U8))
            .field("b", FieldKind::Scalar(Scalar::U64))
            .build()?;
        let value = StructValue::new().with("a", 1u8).with("b", 2u64);
        let mut buffer = vec![0xAA; layout.size()];
        StructMarshaller::default().encode_into(
            &value,
            &layout,
            &mut buffer,
            0,
            &mut ScopedArena::new(),
        )?;
        assert_eq!(buffer.get(1..8), Some(&[0u8; 7][..]));
        Ok(())
    }

    #[test]
    fn test_nested_struct_pointer_is_copied() -> Result<(), MarshalError> {
        let extent = Arc::new(
            LayoutBuilder::structure("VkExtent2D")
                .field("width", U32)
                .field("height", U32)
                .build()?,
        );
        let layout = LayoutBuilder::structure("Holder")
            .field("pExtent", FieldKind::Pointer(PointerKind::Struct(extent)))
            .build()?;
        let value = StructValue::new().with(
            "pExtent",
            StructValue::new().with("width", 3u32).with("height", 4u32),
        );
        let marshaller = StructMarshaller::default();
        let mut arena = ScopedArena::new();
        let bytes = marshaller.encode(&value, &layout, &mut arena)?;
        assert_eq!(arena.len(), 1);
        assert_eq!(marshaller.decode(&bytes, &layout, 0, &arena)?, value);
        Ok(())
    }
}
