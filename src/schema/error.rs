//! Error types for schema loading.

use thiserror::Error;

use crate::abi::MarshalError;

/// Errors that can occur while loading or resolving a schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown type '{ty}' for field '{field}' of '{owner}'")]
    UnknownType {
        owner: String,
        field: String,
        ty: String,
    },

    #[error("Type '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("Cyclic type reference: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Invalid declaration of '{name}': {reason}")]
    InvalidDeclaration { name: String, reason: String },

    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

impl SchemaError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
