//! Native structure layout and marshalling.
//!
//! This module computes C ABI layouts (64-bit pointers, natural alignment)
//! and copies values between an in-process object model and native memory
//! according to those layouts.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for layout and marshalling operations
//! - [`buffer`]: Low-level buffer read/write helpers
//! - [`primitive`]: Fixed-width scalar codecs
//! - [`enums`]: Enum codec with alias resolution
//! - [`bitmask`]: Bitmask codec with residual bits
//! - [`handle`]: Opaque native handles and typed handle newtypes
//! - [`layout`]: Field descriptors and computed layouts
//! - [`builder`]: Layout computation with padding insertion
//! - [`cache`]: Layout cache keyed by structure name
//! - [`value`]: The object side of marshalling
//! - [`arena`]: Memory pinned for the duration of a native call
//! - [`lower`]: Encoding values into native buffers
//! - [`lift`]: Decoding values out of native buffers
//! - [`query`]: The two-call enumerate protocol

mod arena;
mod bitmask;
mod buffer;
mod builder;
mod cache;
mod enums;
mod error;
mod handle;
mod layout;
mod lift;
mod lower;
mod marshal;
mod primitive;
mod query;
mod value;

use std::sync::Arc;

pub use arena::ScopedArena;
pub use bitmask::{BitmaskCodec, BitmaskCodecBuilder, BitmaskValue, FlagsWidth};
pub use buffer::align_to;
pub use builder::LayoutBuilder;
pub use cache::LayoutCache;
pub use enums::{EnumCodec, EnumCodecBuilder, EnumValue};
pub use error::MarshalError;
pub use handle::{NativeHandle, POINTER_SIZE};
pub use layout::{Composition, ComputedLayout, FieldDescriptor, FieldKind, PointerKind};
pub use marshal::{NativeFrame, StructMarshaller};
pub use primitive::Scalar;
pub use query::{MAX_QUERY_ATTEMPTS, QueryState, QueryStatus, TwoCallQuery};
pub use value::{StructValue, UnionValue, Value};

/// Decode strictness.
///
/// The defaults are lenient: unknown enum values come back as
/// [`EnumValue::Raw`] and any nonzero `bool32` reads as `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "schema", derive(serde::Deserialize))]
#[cfg_attr(feature = "schema", serde(default, deny_unknown_fields))]
pub struct MarshalOptions {
    /// Fail with [`MarshalError::UnknownEnumValue`] on undeclared enum values.
    pub strict_enums: bool,
    /// Fail with [`MarshalError::InvalidBool`] on `bool32` values other than 0 or 1.
    pub strict_bools: bool,
}

impl MarshalOptions {
    /// Both strict checks enabled.
    pub fn strict() -> Self {
        Self {
            strict_enums: true,
            strict_bools: true,
        }
    }
}

/// A Rust record that describes its own native layout.
///
/// Implementors list their fields once in [`describe`](Self::describe);
/// layouts of nested records are obtained through [`layout`](Self::layout)
/// so each is computed a single time per cache.
pub trait NativeStruct: Sized {
    /// Structure type name, the cache key.
    const NAME: &'static str;

    fn describe(cache: &LayoutCache) -> Result<ComputedLayout, MarshalError>;

    fn to_value(&self) -> StructValue;

    fn from_value(value: &StructValue) -> Result<Self, MarshalError>;

    /// The cached layout, computing it on first use.
    fn layout(cache: &LayoutCache) -> Result<Arc<ComputedLayout>, MarshalError> {
        cache.get_or_try_insert(Self::NAME, || Self::describe(cache))
    }
}

/// Layout cache plus marshaller: the surface a call dispatch layer uses.
///
/// # Example
///
/// ```ignore
/// use native_marshal::abi::{NativeAbi, ScopedArena};
///
/// let abi = NativeAbi::default();
/// assert_eq!(abi.size_of::<Extent2D>()?, 8);
///
/// let mut arena = ScopedArena::new();
/// let bytes = abi.encode(&extent, &mut arena)?;
/// let back: Extent2D = abi.decode(&bytes, &arena)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct NativeAbi {
    cache: Arc<LayoutCache>,
    marshaller: StructMarshaller,
}

impl NativeAbi {
    pub fn new(options: MarshalOptions) -> Self {
        Self::with_cache(Arc::new(LayoutCache::new()), options)
    }

    /// Share an existing cache, e.g. one populated from a schema.
    pub fn with_cache(cache: Arc<LayoutCache>, options: MarshalOptions) -> Self {
        Self {
            cache,
            marshaller: StructMarshaller::new(options),
        }
    }

    pub fn cache(&self) -> &Arc<LayoutCache> {
        &self.cache
    }

    pub fn marshaller(&self) -> &StructMarshaller {
        &self.marshaller
    }

    pub fn layout_of<T: NativeStruct>(&self) -> Result<Arc<ComputedLayout>, MarshalError> {
        T::layout(&self.cache)
    }

    pub fn size_of<T: NativeStruct>(&self) -> Result<usize, MarshalError> {
        self.layout_of::<T>().map(|l| l.size())
    }

    pub fn align_of<T: NativeStruct>(&self) -> Result<usize, MarshalError> {
        self.layout_of::<T>().map(|l| l.align())
    }

    /// Size of a layout already in the cache.
    pub fn size_of_named(&self, name: &str) -> Result<usize, MarshalError> {
        self.cache.size_of(name)
    }

    /// Alignment of a layout already in the cache.
    pub fn align_of_named(&self, name: &str) -> Result<usize, MarshalError> {
        self.cache.align_of(name)
    }

    pub fn encode<T: NativeStruct>(
        &self,
        value: &T,
        arena: &mut ScopedArena,
    ) -> Result<Vec<u8>, MarshalError> {
        let layout = self.layout_of::<T>()?;
        self.marshaller.encode(&value.to_value(), &layout, arena)
    }

    pub fn decode<T: NativeStruct>(
        &self,
        buffer: &[u8],
        arena: &ScopedArena,
    ) -> Result<T, MarshalError> {
        let layout = self.layout_of::<T>()?;
        T::from_value(&self.marshaller.decode(buffer, &layout, 0, arena)?)
    }

    /// Scoped native call on a typed record. See [`StructMarshaller::call`].
    pub fn call<T, F>(&self, value: &T, native: F) -> Result<T, MarshalError>
    where
        T: NativeStruct,
        F: FnOnce(&mut NativeFrame<'_>) -> anyhow::Result<()>,
    {
        let layout = self.layout_of::<T>()?;
        T::from_value(&self.marshaller.call(&value.to_value(), &layout, native)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Offset2D {
        x: i32,
        y: i32,
    }

    impl NativeStruct for Offset2D {
        const NAME: &'static str = "VkOffset2D";

        fn describe(_cache: &LayoutCache) -> Result<ComputedLayout, MarshalError> {
            LayoutBuilder::structure(Self::NAME)
                .field("x", FieldKind::Scalar(Scalar::I32))
                .field("y", FieldKind::Scalar(Scalar::I32))
                .expect_size(8)
                .build()
        }

        fn to_value(&self) -> StructValue {
            StructValue::new().with("x", self.x).with("y", self.y)
        }

        fn from_value(value: &StructValue) -> Result<Self, MarshalError> {
            Ok(Self {
                x: value.field("x")?,
                y: value.field("y")?,
            })
        }
    }

    #[test]
    fn test_typed_roundtrip() -> Result<(), MarshalError> {
        let abi = NativeAbi::default();
        let offset = Offset2D { x: -3, y: 7 };
        let mut arena = ScopedArena::new();
        let bytes = abi.encode(&offset, &mut arena)?;
        assert_eq!(bytes.len(), 8);
        assert_eq!(abi.decode::<Offset2D>(&bytes, &arena)?, offset);
        assert_eq!(abi.size_of_named("VkOffset2D")?, 8);
        assert_eq!(abi.align_of::<Offset2D>()?, 4);
        Ok(())
    }

    #[test]
    fn test_named_lookup_requires_cached_layout() {
        let abi = NativeAbi::new(MarshalOptions::strict());
        assert!(matches!(
            abi.size_of_named("VkOffset2D"),
            Err(MarshalError::UnresolvedType(_))
        ));
        assert!(abi.marshaller().options().strict_enums);
    }

    #[test]
    fn test_call_failure_propagates() {
        let abi = NativeAbi::default();
        let result = abi.call(&Offset2D { x: 1, y: 2 }, |_| anyhow::bail!("device lost"));
        assert!(matches!(result, Err(MarshalError::NativeCall(ref e)) if e.to_string() == "device lost"));
    }

    #[test]
    fn test_call_sees_native_writes() -> Result<(), MarshalError> {
        let abi = NativeAbi::default();
        let out = abi.call(&Offset2D { x: 1, y: 2 }, |frame| {
            frame.buffer()[4..8].copy_from_slice(&40i32.to_ne_bytes());
            Ok(())
        })?;
        assert_eq!(out, Offset2D { x: 1, y: 40 });
        Ok(())
    }
}
