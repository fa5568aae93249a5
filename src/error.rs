//! Unified error type for the native-marshal library.
//!
//! [`Error`] wraps the module-specific errors so application code can use a
//! single error type across layout, marshalling and schema operations.

use thiserror::Error;

use crate::abi::MarshalError;
#[cfg(feature = "schema")]
use crate::schema::SchemaError;

/// Unified error type for all native-marshal operations.
///
/// # Example
///
/// ```ignore
/// use native_marshal::{Result, schema::Schema};
///
/// fn load() -> Result<()> {
///     let registry = Schema::from_file("vulkan.toml")?.build()?;
///     let size = registry.abi().size_of_named("VkApplicationInfo")?;
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Layout computation or marshalling failed.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Schema loading or resolution failed.
    #[cfg(feature = "schema")]
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is a layout or marshalling error, including
    /// one raised while resolving a schema.
    pub fn is_marshal(&self) -> bool {
        self.as_marshal().is_some()
    }

    /// Returns `true` if this is a schema error.
    #[cfg(feature = "schema")]
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns `true` if this is an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// The underlying marshalling error, if any.
    pub fn as_marshal(&self) -> Option<&MarshalError> {
        match self {
            Self::Marshal(e) => Some(e),
            #[cfg(feature = "schema")]
            Self::Schema(SchemaError::Marshal(e)) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if repeating the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        self.as_marshal().is_some_and(MarshalError::is_retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let err = Error::from(MarshalError::NullHandle);
        assert!(err.is_marshal());
        assert!(!err.is_io());
        assert!(!err.is_retryable());

        let err = Error::from(MarshalError::AllocationFailed { size: 64 });
        assert!(err.is_retryable());

        let err = Error::from(std::io::Error::other("disk"));
        assert!(err.is_io());
        assert!(!err.is_marshal());
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_schema_wrapped_marshal_error() {
        let err = Error::from(SchemaError::from(MarshalError::UnresolvedType("VkFoo".into())));
        assert!(err.is_schema());
        assert!(err.is_marshal());
        assert!(err.to_string().contains("VkFoo"));
    }
}
