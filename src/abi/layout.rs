//! Computed memory layouts.
//!
//! A [`ComputedLayout`] is the offset-annotated field table of one structure
//! or union, including synthetic padding. Layouts are immutable once built
//! and shared through `Arc`.

use std::fmt;
use std::sync::Arc;

use super::handle::POINTER_SIZE;
use super::{
    BitmaskCodec, BitmaskValue, EnumCodec, NativeHandle, Scalar, StructValue, UnionValue, Value,
};

/// How the fields of a layout share memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Composition {
    /// Fields follow each other with alignment padding.
    Struct,
    /// Every field starts at offset 0.
    Union,
}

/// What a pointer field points at.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerKind {
    /// `void*` or any address the caller manages, carried as a handle.
    Opaque,
    /// `const char*`, NUL-terminated.
    CString,
    /// `const void*` whose byte length lives in a sibling field.
    Bytes { len_field: Arc<str> },
    /// `const T*` whose element count lives in a sibling field.
    Array {
        element: Box<FieldKind>,
        count_field: Arc<str>,
    },
    /// `const T*` to a single structure.
    Struct(Arc<ComputedLayout>),
}

/// The semantic kind of a field, carrying everything needed to size it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Synthetic alignment bytes.
    Padding,
    Scalar(Scalar),
    /// 4-byte enum.
    Enum(Arc<EnumCodec>),
    Bitmask(Arc<BitmaskCodec>),
    /// Dispatchable or non-dispatchable handle.
    Handle,
    Pointer(PointerKind),
    Struct(Arc<ComputedLayout>),
    Union(Arc<ComputedLayout>),
    /// Fixed-length inline array `T field[count]`.
    Sequence { element: Box<FieldKind>, count: usize },
    /// Fixed-capacity inline string `char field[capacity]`.
    Text { capacity: usize },
}

impl FieldKind {
    /// Fixed-length inline array of `count` elements.
    pub fn sequence(element: FieldKind, count: usize) -> Self {
        Self::Sequence {
            element: Box::new(element),
            count,
        }
    }

    /// Pointer to `element`s counted by the sibling field `count_field`.
    pub fn array_pointer(element: FieldKind, count_field: impl Into<Arc<str>>) -> Self {
        Self::Pointer(PointerKind::Array {
            element: Box::new(element),
            count_field: count_field.into(),
        })
    }

    /// Pointer to bytes measured by the sibling field `len_field`.
    pub fn bytes_pointer(len_field: impl Into<Arc<str>>) -> Self {
        Self::Pointer(PointerKind::Bytes {
            len_field: len_field.into(),
        })
    }

    /// Width in bytes.
    ///
    /// Saturates for sequences too large for the address space;
    /// [`LayoutBuilder`](super::LayoutBuilder) rejects those, so any kind
    /// taken from a built layout has an exact width.
    pub fn size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }

    /// Width in bytes, or `None` if it does not fit in `usize`.
    pub fn checked_size(&self) -> Option<usize> {
        match self {
            Self::Padding => Some(0),
            Self::Scalar(s) => Some(s.size()),
            Self::Enum(_) => Some(4),
            Self::Bitmask(codec) => Some(codec.width().size()),
            Self::Handle | Self::Pointer(_) => Some(POINTER_SIZE),
            Self::Struct(layout) | Self::Union(layout) => Some(layout.size()),
            Self::Sequence { element, count } => element.checked_size()?.checked_mul(*count),
            Self::Text { capacity } => Some(*capacity),
        }
    }

    /// Required alignment in bytes.
    pub fn align(&self) -> usize {
        match self {
            Self::Padding | Self::Text { .. } => 1,
            Self::Scalar(s) => s.align(),
            Self::Enum(_) => 4,
            Self::Bitmask(codec) => codec.width().size(),
            Self::Handle | Self::Pointer(_) => POINTER_SIZE,
            Self::Struct(layout) | Self::Union(layout) => layout.align(),
            Self::Sequence { element, .. } => element.align(),
        }
    }

    /// Element count: the declared length for sequences, 1 otherwise.
    pub fn count(&self) -> usize {
        match self {
            Self::Sequence { count, .. } => *count,
            Self::Padding => 0,
            _ => 1,
        }
    }

    /// Layout of a nested struct or union, looking through sequences.
    pub fn nested(&self) -> Option<&Arc<ComputedLayout>> {
        match self {
            Self::Struct(layout) | Self::Union(layout) => Some(layout),
            Self::Sequence { element, .. } => element.nested(),
            _ => None,
        }
    }

    /// The zero-initialized value of this kind.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Padding => Value::Null,
            Self::Scalar(s) => s.zero(),
            Self::Enum(codec) => Value::Enum(codec.decode(0)),
            Self::Bitmask(_) => Value::Bitmask(BitmaskValue::empty()),
            Self::Handle => Value::Handle(NativeHandle::NULL),
            Self::Pointer(_) => Value::Null,
            Self::Struct(layout) => Value::Struct(layout.default_value()),
            Self::Union(layout) => Value::Union(UnionValue::from_bytes(vec![0; layout.size()])),
            Self::Sequence { element, count } => {
                Value::Array((0..*count).map(|_| element.default_value()).collect())
            }
            Self::Text { .. } => Value::Text(String::new()),
        }
    }

    /// Short description used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Padding => "padding".to_string(),
            Self::Scalar(s) => s.c_name().to_string(),
            Self::Enum(codec) => codec.name().to_string(),
            Self::Bitmask(codec) => codec.name().to_string(),
            Self::Handle => "handle".to_string(),
            Self::Pointer(PointerKind::Opaque) => "void*".to_string(),
            Self::Pointer(PointerKind::CString) => "const char*".to_string(),
            Self::Pointer(PointerKind::Bytes { .. }) => "const void*".to_string(),
            Self::Pointer(PointerKind::Array { element, .. }) => format!("{}*", element.describe()),
            Self::Pointer(PointerKind::Struct(layout)) => format!("{}*", layout.name()),
            Self::Struct(layout) | Self::Union(layout) => layout.name().to_string(),
            Self::Sequence { element, count } => format!("{}[{}]", element.describe(), count),
            Self::Text { capacity } => format!("char[{}]", capacity),
        }
    }
}

/// One entry of a computed layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) kind: FieldKind,
    pub(crate) offset: usize,
    pub(crate) width: usize,
    pub(crate) align: usize,
    pub(crate) optional: bool,
    pub(crate) discriminant: Option<i32>,
}

impl FieldDescriptor {
    pub(crate) fn padding(offset: usize, width: usize) -> Self {
        Self {
            name: None,
            kind: FieldKind::Padding,
            offset,
            width,
            align: 1,
            optional: true,
            discriminant: None,
        }
    }

    /// Field name, `None` for padding.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Byte offset within the owning layout.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Width in bytes; for sequences, `count * stride`.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Element count for sequences, 1 for other fields.
    pub fn count(&self) -> usize {
        self.kind.count()
    }

    /// Distance between consecutive sequence elements.
    pub fn stride(&self) -> usize {
        match &self.kind {
            FieldKind::Sequence { element, .. } => element.size(),
            _ => self.width,
        }
    }

    /// Nested struct or union layout.
    pub fn nested(&self) -> Option<&Arc<ComputedLayout>> {
        self.kind.nested()
    }

    pub fn is_padding(&self) -> bool {
        matches!(self.kind, FieldKind::Padding)
    }

    /// Whether a null pointer is acceptable for this field.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Fixed value of an `sType`-style discriminant field.
    pub fn discriminant(&self) -> Option<i32> {
        self.discriminant
    }

    /// Display name, with padding rendered as `<padding>`.
    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<padding>")
    }
}

/// Size, alignment and field offsets of one structure or union.
///
/// For structs, `offset(i + 1) >= offset(i) + width(i)` and every gap is a
/// padding descriptor. `size() % align() == 0` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedLayout {
    pub(crate) name: Arc<str>,
    pub(crate) composition: Composition,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) size: usize,
    pub(crate) align: usize,
}

impl ComputedLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn composition(&self) -> Composition {
        self.composition
    }

    pub fn is_union(&self) -> bool {
        self.composition == Composition::Union
    }

    /// Total size including trailing padding.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// All descriptors in memory order, padding included.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Declared fields only.
    pub fn members(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_padding())
    }

    /// Look up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.members().find(|f| f.name() == Some(name))
    }

    /// Byte offset of a declared field.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.field(name).map(FieldDescriptor::offset)
    }

    /// A zero-initialized record with discriminants already set.
    pub fn default_value(&self) -> StructValue {
        self.members()
            .filter_map(|f| {
                let name = f.name.clone()?;
                let value = match (f.discriminant, &f.kind) {
                    (Some(raw), FieldKind::Enum(codec)) => Value::Enum(codec.decode(raw)),
                    (Some(raw), _) => Value::I32(raw),
                    (None, kind) => kind.default_value(),
                };
                Some((name, value))
            })
            .collect()
    }
}

impl fmt::Display for ComputedLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.composition {
            Composition::Struct => "struct",
            Composition::Union => "union",
        };
        writeln!(
            f,
            "{} {} {{ size {}, align {} }}",
            keyword, self.name, self.size, self.align
        )?;
        for field in &self.fields {
            writeln!(
                f,
                "  {:>4} +{:<3} {} {}",
                field.offset,
                field.width,
                field.label(),
                field.kind.describe()
            )?;
        }
        Ok(())
    }
}
