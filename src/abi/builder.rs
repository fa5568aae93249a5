//! Layout computation.
//!
//! [`LayoutBuilder`] turns an ordered field declaration into a
//! [`ComputedLayout`] following the C rules for 64-bit targets: every field
//! starts at the next multiple of its alignment, the aggregate is aligned to
//! its most aligned member, and the size is rounded up to that alignment.
//! Nested structs, unions and sequences carry finished layouts, so
//! composition is bottom-up by construction.

use foldhash::HashSet;
use std::sync::Arc;

use super::buffer::checked_align_to;
use super::{
    Composition, ComputedLayout, EnumCodec, FieldDescriptor, FieldKind, MarshalError,
    PointerKind,
};
use crate::logging::{debug, error};

#[derive(Debug)]
struct FieldDecl {
    name: Arc<str>,
    kind: FieldKind,
    optional: bool,
    discriminant: Option<Arc<str>>,
}

/// Builder for [`ComputedLayout`].
///
/// # Example
///
/// ```ignore
/// use native_marshal::abi::{FieldKind, LayoutBuilder, Scalar};
///
/// let layout = LayoutBuilder::structure("Example")
///     .field("a", FieldKind::Scalar(Scalar::I32))
///     .field("p", FieldKind::Handle)
///     .field("b", FieldKind::Scalar(Scalar::I32))
///     .expect_size(24)
///     .build()?;
/// assert_eq!(layout.offset_of("p"), Some(8));
/// ```
#[derive(Debug)]
pub struct LayoutBuilder {
    name: Arc<str>,
    composition: Composition,
    fields: Vec<FieldDecl>,
    expected_size: Option<usize>,
    expected_align: Option<usize>,
}

impl LayoutBuilder {
    /// Start a struct layout.
    pub fn structure(name: impl Into<Arc<str>>) -> Self {
        Self::new(name.into(), Composition::Struct)
    }

    /// Start a union layout.
    pub fn union(name: impl Into<Arc<str>>) -> Self {
        Self::new(name.into(), Composition::Union)
    }

    pub fn new(name: Arc<str>, composition: Composition) -> Self {
        Self {
            name,
            composition,
            fields: Vec::new(),
            expected_size: None,
            expected_align: None,
        }
    }

    /// Append a field. Pointer fields declared here must not be null.
    pub fn field(mut self, name: impl Into<Arc<str>>, kind: FieldKind) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            kind,
            optional: false,
            discriminant: None,
        });
        self
    }

    /// Append a field that may hold a null pointer.
    pub fn optional(mut self, name: impl Into<Arc<str>>, kind: FieldKind) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            kind,
            optional: true,
            discriminant: None,
        });
        self
    }

    /// Append an enum field fixed to `symbol`, such as `sType`.
    pub fn discriminant(
        mut self,
        name: impl Into<Arc<str>>,
        codec: &Arc<EnumCodec>,
        symbol: impl Into<Arc<str>>,
    ) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            kind: FieldKind::Enum(codec.clone()),
            optional: false,
            discriminant: Some(symbol.into()),
        });
        self
    }

    /// Reference size measured on the platform; `build` fails on disagreement.
    pub fn expect_size(mut self, size: usize) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Reference alignment measured on the platform.
    pub fn expect_align(mut self, align: usize) -> Self {
        self.expected_align = Some(align);
        self
    }

    pub fn build(self) -> Result<ComputedLayout, MarshalError> {
        self.validate()?;

        let max_align = self.fields.iter().map(|f| f.kind.align()).fold(1, usize::max);
        let mut fields = Vec::with_capacity(self.fields.len() * 2);
        let mut cursor = 0usize;
        let name = self.name.clone();
        let overflow = |field: &str| MarshalError::LayoutOverflow {
            name: name.to_string(),
            field: field.to_string(),
        };

        for decl in self.fields {
            let align = decl.kind.align();
            let width = decl
                .kind
                .checked_size()
                .ok_or_else(|| overflow(&*decl.name))?;
            let offset = match self.composition {
                Composition::Struct => {
                    let aligned =
                        checked_align_to(cursor, align).ok_or_else(|| overflow(&*decl.name))?;
                    if aligned > cursor {
                        fields.push(FieldDescriptor::padding(cursor, aligned - cursor));
                    }
                    cursor = aligned
                        .checked_add(width)
                        .ok_or_else(|| overflow(&*decl.name))?;
                    aligned
                }
                Composition::Union => {
                    cursor = cursor.max(width);
                    0
                }
            };
            // No allocation, and so no native object, exceeds isize::MAX bytes.
            if isize::try_from(cursor).is_err() {
                return Err(overflow(&*decl.name));
            }
            let discriminant = match (&decl.kind, &decl.discriminant) {
                (FieldKind::Enum(codec), Some(symbol)) => Some(codec.encode(symbol)?),
                _ => None,
            };
            fields.push(FieldDescriptor {
                name: Some(decl.name),
                kind: decl.kind,
                offset,
                width,
                align,
                optional: decl.optional,
                discriminant,
            });
        }

        let size = checked_align_to(cursor, max_align)
            .filter(|&size| isize::try_from(size).is_ok())
            .ok_or_else(|| overflow("padding"))?;
        if size > cursor {
            fields.push(FieldDescriptor::padding(cursor, size - cursor));
        }

        let layout = ComputedLayout {
            name: self.name,
            composition: self.composition,
            fields,
            size,
            align: max_align,
        };

        let size_ok = self.expected_size.is_none_or(|s| s == layout.size);
        let align_ok = self.expected_align.is_none_or(|a| a == layout.align);
        if !(size_ok && align_ok) {
            let expected_size = self.expected_size.unwrap_or(layout.size);
            error!(
                name = %layout.name,
                expected_size,
                actual_size = layout.size,
                actual_align = layout.align,
                "layout disagrees with platform reference"
            );
            return Err(MarshalError::LayoutMismatch {
                name: layout.name.to_string(),
                expected_size,
                expected_align: self.expected_align,
                actual_size: layout.size,
                actual_align: layout.align,
            });
        }

        debug!(
            name = %layout.name,
            size = layout.size,
            align = layout.align,
            fields = layout.fields.len(),
            "layout computed"
        );
        Ok(layout)
    }

    fn validate(&self) -> Result<(), MarshalError> {
        let mut seen = HashSet::default();
        for decl in &self.fields {
            if !seen.insert(decl.name.clone()) {
                return Err(MarshalError::DuplicateField {
                    name: self.name.to_string(),
                    field: decl.name.to_string(),
                });
            }
            if matches!(decl.kind, FieldKind::Padding) {
                return Err(MarshalError::UnresolvedType(format!(
                    "{}.{}: padding is synthesized, not declared",
                    self.name, decl.name
                )));
            }
            if decl.discriminant.is_some() && !matches!(decl.kind, FieldKind::Enum(_)) {
                return Err(MarshalError::UnresolvedType(format!(
                    "{}.{}: discriminant must be an enum",
                    self.name, decl.name
                )));
            }
        }
        for decl in &self.fields {
            if let FieldKind::Pointer(PointerKind::Array { element, .. }) = &decl.kind {
                let fits = element
                    .checked_size()
                    .is_some_and(|size| isize::try_from(size).is_ok());
                if !fits {
                    return Err(MarshalError::LayoutOverflow {
                        name: self.name.to_string(),
                        field: decl.name.to_string(),
                    });
                }
            }
            let sibling = match &decl.kind {
                FieldKind::Pointer(PointerKind::Array { count_field, .. }) => count_field,
                FieldKind::Pointer(PointerKind::Bytes { len_field }) => len_field,
                _ => continue,
            };
            let is_count = self
                .fields
                .iter()
                .find(|f| f.name == *sibling)
                .is_some_and(|f| matches!(f.kind, FieldKind::Scalar(s) if s.is_count()));
            if !is_count {
                return Err(MarshalError::UnresolvedType(format!(
                    "{}.{}: count field '{}' must be an unsigned integer field",
                    self.name, decl.name, sibling
                )));
            }
        }
        Ok(())
    }
}
