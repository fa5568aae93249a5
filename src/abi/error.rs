//! Error types for layout computation and marshalling.

use thiserror::Error;

/// Errors that can occur while computing layouts or marshalling values.
#[derive(Error, Debug)]
pub enum MarshalError {
    /// Computed layout disagrees with a platform-verified reference.
    #[error(
        "Layout mismatch for '{name}': expected size {expected_size} align {expected_align:?}, \
         computed size {actual_size} align {actual_align}"
    )]
    LayoutMismatch {
        name: String,
        expected_size: usize,
        expected_align: Option<usize>,
        actual_size: usize,
        actual_align: usize,
    },

    #[error("Layout of '{name}' overflows the address space at field '{field}'")]
    LayoutOverflow { name: String, field: String },

    #[error("Duplicate field '{field}' in '{name}'")]
    DuplicateField { name: String, field: String },

    #[error("Unknown value {value} for enum '{name}'")]
    UnknownEnumValue { name: String, value: i32 },

    #[error("Unknown symbol '{symbol}' for enum '{name}'")]
    UnknownEnumSymbol { name: String, symbol: String },

    #[error("Unknown flag '{flag}' for bitmask '{name}'")]
    UnknownFlag { name: String, flag: String },

    #[error("Bitmask '{name}' value {bits:#x} does not fit in {width} bytes")]
    FlagOverflow { name: String, bits: u64, width: usize },

    #[error("Null handle cannot be resolved")]
    NullHandle,

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Type mismatch for '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("Missing value for field '{field}' of '{name}'")]
    MissingField { name: String, field: String },

    #[error("Unknown field '{field}' in '{name}'")]
    UnknownField { name: String, field: String },

    #[error("Required pointer '{field}' is null")]
    NullPointer { field: String },

    #[error("Sequence '{field}' expects {expected} elements, got {got}")]
    SequenceLength {
        field: String,
        expected: usize,
        got: usize,
    },

    #[error("Count field '{count_field}' is {count} but '{field}' holds {available} elements")]
    CountMismatch {
        field: String,
        count_field: String,
        count: usize,
        available: usize,
    },

    #[error("Text for '{field}' needs {len} bytes plus terminator, capacity is {capacity}")]
    TextTooLong {
        field: String,
        len: usize,
        capacity: usize,
    },

    #[error("Text for '{field}' is not a valid C string")]
    InvalidText { field: String },

    #[error("Invalid bool32 value: {0}")]
    InvalidBool(u32),

    #[error("Discriminant '{field}' must be {expected}, got {got}")]
    DiscriminantMismatch {
        field: String,
        expected: i32,
        got: i32,
    },

    #[error("Invalid pointer {address:#x} with length {len}")]
    InvalidPointer { address: u64, len: usize },

    #[error("Cannot allocate {size} bytes of pinned memory")]
    AllocationFailed { size: usize },

    #[error("Unresolved type: {0}")]
    UnresolvedType(String),

    #[error("Invalid two-call query: {0}")]
    InvalidQuery(String),

    #[error("Native call failed: {0}")]
    NativeCall(#[source] anyhow::Error),
}

impl MarshalError {
    /// Returns `true` for errors that describe a wrong declaration rather
    /// than a bad value. These are configuration bugs and must not be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::LayoutMismatch { .. }
                | Self::LayoutOverflow { .. }
                | Self::DuplicateField { .. }
                | Self::UnresolvedType(_)
        )
    }

    /// Returns `true` if repeating the operation could succeed.
    ///
    /// Only resource acquisition and native call failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. } | Self::NativeCall(_))
    }
}
