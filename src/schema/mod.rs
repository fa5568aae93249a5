//! Declarative structure, enum and bitmask definitions loaded from TOML.
//!
//! # Example
//!
//! ```toml
//! handles = ["VkInstance"]
//!
//! [options]
//! strict_enums = true
//!
//! [enums.VkStructureType]
//! variants = [
//!     { name = "VK_STRUCTURE_TYPE_APPLICATION_INFO", value = 0 },
//! ]
//!
//! [bitmasks.VkQueueFlags]
//! flags = [
//!     { name = "VK_QUEUE_GRAPHICS_BIT", value = 0x1 },
//!     { name = "VK_QUEUE_COMPUTE_BIT", value = 0x2 },
//! ]
//!
//! [structs.VkApplicationInfo]
//! expected_size = 48
//! fields = [
//!     { name = "sType", type = "VkStructureType", discriminant = "VK_STRUCTURE_TYPE_APPLICATION_INFO" },
//!     { name = "pNext", type = "const void*", optional = true },
//!     { name = "pApplicationName", type = "const char*", optional = true },
//!     { name = "applicationVersion", type = "uint32_t" },
//!     { name = "pEngineName", type = "const char*", optional = true },
//!     { name = "engineVersion", type = "uint32_t" },
//!     { name = "apiVersion", type = "uint32_t" },
//! ]
//! ```
//!
//! Field types are C type names with optional `const` qualifiers and up to
//! two trailing `*`. A pointer field with `count` points to that many
//! elements (or bytes, for `void*`); `len` declares a fixed array, or
//! embedded text for `char`.

mod error;
mod registry;

pub use error::SchemaError;
pub use registry::TypeRegistry;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::abi::MarshalOptions;

/// A parsed schema file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    /// Marshaller options.
    #[serde(default)]
    pub options: MarshalOptions,
    /// Opaque handle type names.
    #[serde(default)]
    pub handles: Vec<String>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDecl>,
    #[serde(default)]
    pub bitmasks: BTreeMap<String, BitmaskDecl>,
    #[serde(default)]
    pub structs: BTreeMap<String, StructDecl>,
    #[serde(default)]
    pub unions: BTreeMap<String, StructDecl>,
}

/// A symbol and its value. Declaration order is significant.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolDecl {
    pub name: String,
    pub value: i64,
    /// Prefer this symbol when decoding a value shared with earlier symbols.
    #[serde(default)]
    pub canonical: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDecl {
    pub variants: Vec<SymbolDecl>,
    /// Alias symbol to target symbol.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitmaskDecl {
    /// 32 or 64.
    #[serde(default = "default_width")]
    pub width: u32,
    pub flags: Vec<SymbolDecl>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

fn default_width() -> u32 {
    32
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructDecl {
    pub fields: Vec<FieldDecl>,
    pub expected_size: Option<usize>,
    pub expected_align: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Fixed array length.
    pub len: Option<usize>,
    /// Sibling field holding the element count of a pointer.
    pub count: Option<String>,
    #[serde(default)]
    pub optional: bool,
    /// Fixed enum symbol for `sType`-style fields.
    pub discriminant: Option<String>,
}

impl Schema {
    /// Load a schema from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SchemaError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_str(&content)
    }

    /// Parse a schema from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve every declaration into codecs and layouts.
    pub fn build(&self) -> Result<TypeRegistry, SchemaError> {
        registry::build(self)
    }
}
