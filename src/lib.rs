//! C ABI structure layout and marshalling.
//!
//! This library computes the memory layout a C compiler gives a native
//! structure on 64-bit targets and copies values into and out of buffers
//! with that layout, so they can cross a foreign function boundary.
//!
//! # Quick Start
//!
//! ```ignore
//! use native_marshal::prelude::*;
//!
//! let layout = LayoutBuilder::structure("Example")
//!     .field("a", FieldKind::Scalar(Scalar::I32))
//!     .optional("p", FieldKind::Pointer(PointerKind::Opaque))
//!     .field("b", FieldKind::Scalar(Scalar::I32))
//!     .expect_size(24)
//!     .build()?;
//!
//! let value = layout.default_value().with("a", 1i32).with("b", 2i32);
//! let marshaller = StructMarshaller::default();
//! let mut arena = ScopedArena::new();
//! let bytes = marshaller.encode(&value, &layout, &mut arena)?;
//! assert_eq!(marshaller.decode(&bytes, &layout, 0, &arena)?, value);
//! ```
//!
//! # Modules
//!
//! - [`abi`] - Layout computation, codecs and the marshaller (always available)
//! - [`schema`] - TOML declarations of enums, bitmasks and structures (requires `schema` feature)
//!
//! # Feature Flags
//!
//! - `schema` - Enable declarative schema loading (enabled by default)
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `full` - Enable all features

pub mod abi;
mod logging;
pub mod prelude;
#[cfg(feature = "schema")]
pub mod schema;

mod error;

// Re-export the unified error type
pub use error::{Error, Result};

// Re-export the core types at crate root for convenience
pub use abi::{
    ComputedLayout, LayoutBuilder, LayoutCache, MarshalError, MarshalOptions, NativeAbi,
    NativeHandle, NativeStruct, ScopedArena, StructMarshaller, StructValue, Value,
};

#[cfg(feature = "schema")]
pub use schema::{Schema, SchemaError, TypeRegistry};
