//! Resolution of schema declarations into codecs and layouts.

use std::sync::Arc;

use foldhash::{HashMap, HashSet};

use super::{FieldDecl, Schema, SchemaError, StructDecl};
use crate::abi::{
    BitmaskCodec, Composition, ComputedLayout, EnumCodec, FieldKind, FlagsWidth, LayoutBuilder,
    LayoutCache, MarshalError, MarshalOptions, NativeAbi, PointerKind, Scalar,
};
use crate::logging::{debug, info};

/// Everything a schema declares, resolved and ready for marshalling.
#[derive(Debug)]
pub struct TypeRegistry {
    enums: HashMap<Arc<str>, Arc<EnumCodec>>,
    bitmasks: HashMap<Arc<str>, Arc<BitmaskCodec>>,
    handles: HashSet<Arc<str>>,
    cache: Arc<LayoutCache>,
    options: MarshalOptions,
}

impl TypeRegistry {
    pub fn enum_codec(&self, name: &str) -> Result<Arc<EnumCodec>, MarshalError> {
        self.enums
            .get(name)
            .cloned()
            .ok_or_else(|| MarshalError::UnresolvedType(name.to_string()))
    }

    pub fn bitmask_codec(&self, name: &str) -> Result<Arc<BitmaskCodec>, MarshalError> {
        self.bitmasks
            .get(name)
            .cloned()
            .ok_or_else(|| MarshalError::UnresolvedType(name.to_string()))
    }

    pub fn is_handle(&self, name: &str) -> bool {
        self.handles.contains(name)
    }

    /// Layout of a declared struct or union.
    pub fn layout(&self, name: &str) -> Result<Arc<ComputedLayout>, MarshalError> {
        self.cache.require(name)
    }

    pub fn cache(&self) -> &Arc<LayoutCache> {
        &self.cache
    }

    pub fn options(&self) -> MarshalOptions {
        self.options
    }

    /// A marshalling facade sharing this registry's layouts and options.
    pub fn abi(&self) -> NativeAbi {
        NativeAbi::with_cache(self.cache.clone(), self.options)
    }
}

pub(super) fn build(schema: &Schema) -> Result<TypeRegistry, SchemaError> {
    check_unique_names(schema)?;

    let mut registry = TypeRegistry {
        enums: HashMap::default(),
        bitmasks: HashMap::default(),
        handles: schema.handles.iter().map(|h| Arc::from(h.as_str())).collect(),
        cache: Arc::new(LayoutCache::new()),
        options: schema.options,
    };

    for (name, decl) in &schema.enums {
        let mut builder = EnumCodec::builder(name.as_str());
        for variant in &decl.variants {
            let value = i32::try_from(variant.value).map_err(|_| {
                SchemaError::invalid(name, format!("{} does not fit in int32", variant.name))
            })?;
            builder = if variant.canonical {
                builder.canonical(variant.name.as_str(), value)
            } else {
                builder.variant(variant.name.as_str(), value)
            };
        }
        for (alias, target) in &decl.aliases {
            builder = builder.alias(alias.as_str(), target.as_str());
        }
        registry
            .enums
            .insert(Arc::from(name.as_str()), Arc::new(builder.build()?));
    }

    for (name, decl) in &schema.bitmasks {
        let width = match decl.width {
            32 => FlagsWidth::Flags32,
            64 => FlagsWidth::Flags64,
            other => {
                return Err(SchemaError::invalid(
                    name,
                    format!("width must be 32 or 64, got {}", other),
                ));
            }
        };
        let mut builder = BitmaskCodec::builder(name.as_str()).width(width);
        for flag in &decl.flags {
            let bits = u64::try_from(flag.value).map_err(|_| {
                SchemaError::invalid(name, format!("{} must not be negative", flag.name))
            })?;
            builder = builder.flag(flag.name.as_str(), bits);
        }
        for (alias, target) in &decl.aliases {
            builder = builder.alias(alias.as_str(), target.as_str());
        }
        registry
            .bitmasks
            .insert(Arc::from(name.as_str()), Arc::new(builder.build()?));
    }

    let mut resolver = Resolver {
        schema,
        registry: &registry,
        stack: Vec::new(),
    };
    for name in schema.structs.keys().chain(schema.unions.keys()) {
        resolver.resolve(name)?;
    }

    info!(
        enums = registry.enums.len(),
        bitmasks = registry.bitmasks.len(),
        layouts = registry.cache.len(),
        "schema loaded"
    );
    Ok(registry)
}

fn check_unique_names(schema: &Schema) -> Result<(), SchemaError> {
    let mut seen = HashSet::default();
    let names = schema
        .handles
        .iter()
        .chain(schema.enums.keys())
        .chain(schema.bitmasks.keys())
        .chain(schema.structs.keys())
        .chain(schema.unions.keys());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(SchemaError::DuplicateType(name.clone()));
        }
    }
    Ok(())
}

/// A field type with `const` removed and pointer levels counted.
struct TypeExpr<'a> {
    base: &'a str,
    stars: usize,
}

impl<'a> TypeExpr<'a> {
    fn parse(ty: &'a str) -> Option<Self> {
        let stars = ty.matches('*').count();
        let mut words = ty
            .split(|c: char| c == '*' || c.is_whitespace())
            .filter(|w| !w.is_empty() && *w != "const");
        let base = words.next()?;
        match words.next() {
            Some(_) => None,
            None => Some(Self { base, stars }),
        }
    }
}

/// Depth-first layout resolution; `stack` holds the chain being resolved.
struct Resolver<'a> {
    schema: &'a Schema,
    registry: &'a TypeRegistry,
    stack: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn declaration(&self, name: &str) -> Option<(Composition, &'a StructDecl)> {
        self.schema
            .structs
            .get(name)
            .map(|d| (Composition::Struct, d))
            .or_else(|| self.schema.unions.get(name).map(|d| (Composition::Union, d)))
    }

    fn resolve(&mut self, name: &str) -> Result<Arc<ComputedLayout>, SchemaError> {
        if let Some(layout) = self.registry.cache.get(name) {
            return Ok(layout);
        }
        if let Some(start) = self.stack.iter().position(|n| n == name) {
            let mut path = self.stack.split_off(start);
            path.push(name.to_string());
            return Err(SchemaError::Cycle(path));
        }
        let Some((composition, decl)) = self.declaration(name) else {
            return Err(SchemaError::invalid(name, "not a struct or union"));
        };

        self.stack.push(name.to_string());
        let mut builder = LayoutBuilder::new(Arc::from(name), composition);
        for field in &decl.fields {
            builder = self.add_field(builder, name, field)?;
        }
        self.stack.pop();

        if let Some(size) = decl.expected_size {
            builder = builder.expect_size(size);
        }
        if let Some(align) = decl.expected_align {
            builder = builder.expect_align(align);
        }
        let layout = builder.build()?;
        debug!(name, size = layout.size(), "schema layout resolved");
        Ok(self.registry.cache.insert(layout))
    }

    fn add_field(
        &mut self,
        builder: LayoutBuilder,
        owner: &str,
        field: &FieldDecl,
    ) -> Result<LayoutBuilder, SchemaError> {
        let expr = TypeExpr::parse(&field.ty).ok_or_else(|| {
            SchemaError::invalid(
                owner,
                format!("cannot parse type '{}' of '{}'", field.ty, field.name),
            )
        })?;

        if let Some(symbol) = &field.discriminant {
            let codec = self.registry.enums.get(expr.base).filter(|_| expr.stars == 0);
            let Some(codec) = codec else {
                return Err(SchemaError::invalid(
                    owner,
                    format!("discriminant '{}' must have an enum type", field.name),
                ));
            };
            return Ok(builder.discriminant(field.name.as_str(), codec, symbol.as_str()));
        }

        let kind = match (expr.stars, &field.count, field.len) {
            (0, Some(_), _) => {
                return Err(SchemaError::invalid(
                    owner,
                    format!("'{}' has a count but is not a pointer", field.name),
                ));
            }
            (0, None, Some(len)) if expr.base == "char" => FieldKind::Text { capacity: len },
            (0, None, len) => {
                let kind = self.value_kind(owner, field, expr.base)?;
                match len {
                    Some(len) => FieldKind::sequence(kind, len),
                    None => kind,
                }
            }
            (stars, count, len) => {
                let pointer =
                    self.pointer_kind(owner, field, expr.base, stars, count.as_deref())?;
                let kind = FieldKind::Pointer(pointer);
                match len {
                    Some(len) => FieldKind::sequence(kind, len),
                    None => kind,
                }
            }
        };

        Ok(if field.optional {
            builder.optional(field.name.as_str(), kind)
        } else {
            builder.field(field.name.as_str(), kind)
        })
    }

    /// Kind of a field holding `base` by value.
    fn value_kind(
        &mut self,
        owner: &str,
        field: &FieldDecl,
        base: &str,
    ) -> Result<FieldKind, SchemaError> {
        if let Some(scalar) = Scalar::from_c_name(base) {
            return Ok(FieldKind::Scalar(scalar));
        }
        if let Some(codec) = self.registry.enums.get(base) {
            return Ok(FieldKind::Enum(codec.clone()));
        }
        if let Some(codec) = self.registry.bitmasks.get(base) {
            return Ok(FieldKind::Bitmask(codec.clone()));
        }
        if self.registry.is_handle(base) {
            return Ok(FieldKind::Handle);
        }
        match self.declaration(base) {
            Some((Composition::Struct, _)) => Ok(FieldKind::Struct(self.resolve(base)?)),
            Some((Composition::Union, _)) => Ok(FieldKind::Union(self.resolve(base)?)),
            None => Err(SchemaError::UnknownType {
                owner: owner.to_string(),
                field: field.name.clone(),
                ty: base.to_string(),
            }),
        }
    }

    /// Target of a pointer to `base` with `stars` levels of indirection.
    fn pointer_kind(
        &mut self,
        owner: &str,
        field: &FieldDecl,
        base: &str,
        stars: usize,
        count: Option<&str>,
    ) -> Result<PointerKind, SchemaError> {
        Ok(match (stars, count) {
            (1, Some(count)) if matches!(base, "void" | "char") => PointerKind::Bytes {
                len_field: Arc::from(count),
            },
            (1, Some(count)) => PointerKind::Array {
                element: Box::new(self.value_kind(owner, field, base)?),
                count_field: Arc::from(count),
            },
            (1, None) => match base {
                "char" => PointerKind::CString,
                "void" => PointerKind::Opaque,
                _ => match self.declaration(base) {
                    Some((Composition::Struct, _)) => PointerKind::Struct(self.resolve(base)?),
                    Some((Composition::Union, _)) => PointerKind::Opaque,
                    None => {
                        self.value_kind(owner, field, base)?;
                        PointerKind::Opaque
                    }
                },
            },
            (2, Some(count)) => PointerKind::Array {
                element: Box::new(FieldKind::Pointer(self.pointer_kind(
                    owner, field, base, 1, None,
                )?)),
                count_field: Arc::from(count),
            },
            (2, None) => PointerKind::Opaque,
            _ => {
                return Err(SchemaError::invalid(
                    owner,
                    format!("'{}' has too many levels of indirection", field.name),
                ));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_expressions() {
        let expr = TypeExpr::parse("const char* const*");
        assert!(matches!(expr, Some(TypeExpr { base: "char", stars: 2 })));
        let expr = TypeExpr::parse("VkExtent2D");
        assert!(matches!(expr, Some(TypeExpr { base: "VkExtent2D", stars: 0 })));
        assert!(TypeExpr::parse("unsigned int").is_none());
        assert!(TypeExpr::parse("*").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() -> Result<(), SchemaError> {
        let schema = Schema::from_str(
            r#"
handles = ["VkDevice"]

[structs.VkDevice]
fields = []
"#,
        )?;
        assert!(matches!(
            schema.build(),
            Err(SchemaError::DuplicateType(ref name)) if name == "VkDevice"
        ));
        Ok(())
    }

    #[test]
    fn test_bitmask_width() -> Result<(), SchemaError> {
        let schema = Schema::from_str(
            r#"
[bitmasks.VkPipelineStageFlags2]
width = 64
flags = [{ name = "VK_PIPELINE_STAGE_2_HOST_BIT", value = 0x4000 }]

[structs.Barrier]
fields = [
    { name = "srcStageMask", type = "VkPipelineStageFlags2" },
    { name = "dstAccess", type = "uint32_t" },
]
"#,
        )?;
        let registry = schema.build()?;
        assert_eq!(
            registry.bitmask_codec("VkPipelineStageFlags2")?.width(),
            FlagsWidth::Flags64
        );
        assert_eq!(registry.layout("Barrier")?.size(), 16);

        let bad = Schema::from_str(
            r#"
[bitmasks.Odd]
width = 16
flags = []
"#,
        )?;
        assert!(matches!(bad.build(), Err(SchemaError::InvalidDeclaration { .. })));
        Ok(())
    }

    #[test]
    fn test_discriminant_requires_enum() -> Result<(), SchemaError> {
        let schema = Schema::from_str(
            r#"
[structs.Bad]
fields = [{ name = "sType", type = "uint32_t", discriminant = "VK_STRUCTURE_TYPE_APPLICATION_INFO" }]
"#,
        )?;
        assert!(matches!(schema.build(), Err(SchemaError::InvalidDeclaration { .. })));
        Ok(())
    }

    #[test]
    fn test_count_requires_pointer() -> Result<(), SchemaError> {
        let schema = Schema::from_str(
            r#"
[structs.Bad]
fields = [
    { name = "n", type = "uint32_t" },
    { name = "items", type = "uint32_t", count = "n" },
]
"#,
        )?;
        assert!(matches!(schema.build(), Err(SchemaError::InvalidDeclaration { .. })));
        Ok(())
    }

    #[test]
    fn test_canonical_marker() -> Result<(), SchemaError> {
        let schema = Schema::from_str(
            r#"
[enums.VkResult]
variants = [
    { name = "VK_ERROR_OUT_OF_POOL_MEMORY_KHR", value = -1000069000 },
    { name = "VK_ERROR_OUT_OF_POOL_MEMORY", value = -1000069000, canonical = true },
]
"#,
        )?;
        let codec = schema.build()?.enum_codec("VkResult")?;
        assert_eq!(
            codec.decode(-1_000_069_000).symbol(),
            Some("VK_ERROR_OUT_OF_POOL_MEMORY")
        );
        Ok(())
    }
}
