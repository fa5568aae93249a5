//! Layout-driven marshaller and the scoped native call.
//!
//! Encoding lives in [`lower`](super::lower), decoding in [`lift`](super::lift).

use super::{ComputedLayout, MarshalError, MarshalOptions, ScopedArena, StructValue, UnionValue, Value};
use crate::logging::debug;

/// Walks a [`ComputedLayout`] to copy values to and from native memory.
///
/// # Example
///
/// ```ignore
/// use native_marshal::abi::{ScopedArena, StructMarshaller};
///
/// let marshaller = StructMarshaller::default();
/// let mut arena = ScopedArena::new();
/// let bytes = marshaller.encode(&value, &layout, &mut arena)?;
/// let back = marshaller.decode(&bytes, &layout, 0, &arena)?;
/// assert_eq!(back, value);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StructMarshaller {
    pub(crate) options: MarshalOptions,
}

/// The memory a native call sees: the encoded record and the arena holding
/// everything its pointers reference.
#[derive(Debug)]
pub struct NativeFrame<'a> {
    buffer: &'a mut [u8],
    arena: &'a mut ScopedArena,
}

impl<'a> NativeFrame<'a> {
    pub(crate) fn new(buffer: &'a mut [u8], arena: &'a mut ScopedArena) -> Self {
        Self { buffer, arena }
    }

    /// Address to pass as the structure pointer argument.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buffer.as_mut_ptr()
    }

    pub fn buffer(&mut self) -> &mut [u8] {
        self.buffer
    }

    pub fn arena(&mut self) -> &mut ScopedArena {
        self.arena
    }

    /// Both halves at once, for callees that fill pointed-to memory.
    pub fn parts(&mut self) -> (&mut [u8], &mut ScopedArena) {
        (self.buffer, self.arena)
    }
}

impl StructMarshaller {
    pub fn new(options: MarshalOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MarshalOptions {
        &self.options
    }

    /// Encode `value`, hand it to `native`, and decode the record it leaves
    /// behind.
    ///
    /// Nothing reaches `native` unless encoding succeeded. The arena backing
    /// pointer fields lives exactly as long as this call and is released on
    /// every exit path, including a failing `native`.
    pub fn call<F>(
        &self,
        value: &StructValue,
        layout: &ComputedLayout,
        native: F,
    ) -> Result<StructValue, MarshalError>
    where
        F: FnOnce(&mut NativeFrame<'_>) -> anyhow::Result<()>,
    {
        let mut arena = ScopedArena::new();
        let mut buffer = self.encode(value, layout, &mut arena)?;
        debug!(
            name = layout.name(),
            size = buffer.len(),
            blocks = arena.len(),
            "issuing native call"
        );
        native(&mut NativeFrame::new(&mut buffer, &mut arena)).map_err(MarshalError::NativeCall)?;
        self.decode(&buffer, layout, 0, &arena)
    }

    /// Encode one member of a union into the union's bytes.
    pub fn union_value(
        &self,
        layout: &ComputedLayout,
        member: &str,
        value: impl Into<Value>,
        arena: &mut ScopedArena,
    ) -> Result<UnionValue, MarshalError> {
        let record = StructValue::new().with(member, value);
        let bytes = self.encode(&record, layout, arena)?;
        Ok(UnionValue::from_bytes(bytes))
    }

    /// View a union's bytes through one of its members.
    pub fn union_member(
        &self,
        layout: &ComputedLayout,
        union: &UnionValue,
        member: &str,
        arena: &ScopedArena,
    ) -> Result<Value, MarshalError> {
        let field = layout
            .field(member)
            .ok_or_else(|| MarshalError::UnknownField {
                name: layout.name().to_string(),
                field: member.to_string(),
            })?;
        if union.as_bytes().len() != layout.size() {
            return Err(MarshalError::BufferTooSmall {
                needed: layout.size(),
                available: union.as_bytes().len(),
            });
        }
        self.lift_element(field.kind(), union.as_bytes(), field.offset(), arena, member)
    }
}
