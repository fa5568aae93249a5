//! Convenient re-exports for common usage patterns.
//!
//! # Example
//!
//! ```ignore
//! use native_marshal::prelude::*;
//!
//! let registry = Schema::from_file("vulkan.toml")?.build()?;
//! let abi = registry.abi();
//! let size = abi.size_of_named("VkApplicationInfo")?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Layout and marshalling
pub use crate::abi::{
    BitmaskCodec, BitmaskValue, ComputedLayout, EnumCodec, EnumValue, FieldKind, FlagsWidth,
    LayoutBuilder, LayoutCache, MarshalError, MarshalOptions, NativeAbi, NativeFrame,
    NativeHandle, NativeStruct, PointerKind, QueryState, QueryStatus, Scalar, ScopedArena,
    StructMarshaller, StructValue, TwoCallQuery, UnionValue, Value,
};

// Declarative schema (requires "schema" feature)
#[cfg(feature = "schema")]
pub use crate::schema::{Schema, SchemaError, TypeRegistry};

pub use crate::define_handle;
