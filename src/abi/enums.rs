//! Symbolic enumerator codec.
//!
//! Native headers accumulate aliases over time: an extension symbol keeps its
//! name after promotion to core, so several symbols share one integer. The
//! codec collapses every alias to one canonical symbol at construction, so
//! values produced by [`EnumCodec`] always carry the canonical name.

use foldhash::HashMap;
use std::fmt;
use std::sync::Arc;

use super::MarshalError;
use crate::logging::debug;

/// A decoded enum value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumValue {
    /// A known enumerator, always the canonical symbol.
    Known(Arc<str>),
    /// An integer with no declared symbol, kept verbatim.
    Raw(i32),
}

impl EnumValue {
    /// The symbol, if known.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Known(s) => Some(s),
            Self::Raw(_) => None,
        }
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(s) => f.write_str(s),
            Self::Raw(v) => write!(f, "{}", v),
        }
    }
}

/// Bidirectional symbol/integer table for one enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumCodec {
    name: Arc<str>,
    /// Canonical symbols in declaration order.
    variants: Vec<(Arc<str>, i32)>,
    /// Every accepted spelling, aliases included, mapped to its canonical symbol.
    symbols: HashMap<Arc<str>, Arc<str>>,
    values: HashMap<Arc<str>, i32>,
    canonical: HashMap<i32, Arc<str>>,
}

impl EnumCodec {
    /// Start building a codec for the enum `name`.
    pub fn builder(name: impl Into<Arc<str>>) -> EnumCodecBuilder {
        EnumCodecBuilder {
            name: name.into(),
            entries: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical symbols with their values, in declaration order.
    pub fn variants(&self) -> impl Iterator<Item = (&str, i32)> {
        self.variants.iter().map(|(s, v)| (s.as_ref(), *v))
    }

    /// Resolve any accepted spelling to its canonical [`EnumValue`].
    pub fn value(&self, symbol: &str) -> Result<EnumValue, MarshalError> {
        self.symbols
            .get(symbol)
            .map(|canonical| EnumValue::Known(canonical.clone()))
            .ok_or_else(|| MarshalError::UnknownEnumSymbol {
                name: self.name.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// Encode a symbol (canonical or alias) to its integer.
    pub fn encode(&self, symbol: &str) -> Result<i32, MarshalError> {
        let canonical = self
            .symbols
            .get(symbol)
            .ok_or_else(|| MarshalError::UnknownEnumSymbol {
                name: self.name.to_string(),
                symbol: symbol.to_string(),
            })?;
        self.values
            .get(canonical)
            .copied()
            .ok_or_else(|| MarshalError::UnknownEnumSymbol {
                name: self.name.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// Encode a decoded value. Raw values pass through unchanged.
    pub fn encode_value(&self, value: &EnumValue) -> Result<i32, MarshalError> {
        match value {
            EnumValue::Known(symbol) => self.encode(symbol),
            EnumValue::Raw(raw) => Ok(*raw),
        }
    }

    /// Decode an integer, returning [`EnumValue::Raw`] for unknown values.
    pub fn decode(&self, raw: i32) -> EnumValue {
        match self.canonical.get(&raw) {
            Some(symbol) => EnumValue::Known(symbol.clone()),
            None => {
                debug!(name = %self.name, value = raw, "unknown enum value kept raw");
                EnumValue::Raw(raw)
            }
        }
    }

    /// Decode an integer, failing on values with no declared symbol.
    pub fn decode_strict(&self, raw: i32) -> Result<EnumValue, MarshalError> {
        self.canonical
            .get(&raw)
            .map(|symbol| EnumValue::Known(symbol.clone()))
            .ok_or_else(|| MarshalError::UnknownEnumValue {
                name: self.name.to_string(),
                value: raw,
            })
    }
}

/// Builder for [`EnumCodec`].
#[derive(Debug)]
pub struct EnumCodecBuilder {
    name: Arc<str>,
    entries: Vec<(Arc<str>, i32, bool)>,
    aliases: Vec<(Arc<str>, Arc<str>)>,
}

impl EnumCodecBuilder {
    /// Declare a symbol. The first symbol declared for a value is canonical
    /// unless another is marked with [`canonical`](Self::canonical).
    pub fn variant(mut self, symbol: impl Into<Arc<str>>, value: i32) -> Self {
        self.entries.push((symbol.into(), value, false));
        self
    }

    /// Declare a symbol and make it the canonical name for its value.
    pub fn canonical(mut self, symbol: impl Into<Arc<str>>, value: i32) -> Self {
        self.entries.push((symbol.into(), value, true));
        self
    }

    /// Declare `alias` as another spelling of `target`.
    pub fn alias(mut self, alias: impl Into<Arc<str>>, target: impl Into<Arc<str>>) -> Self {
        self.aliases.push((alias.into(), target.into()));
        self
    }

    pub fn build(self) -> Result<EnumCodec, MarshalError> {
        let mut canonical: HashMap<i32, Arc<str>> = HashMap::default();
        let mut explicit: HashMap<i32, Arc<str>> = HashMap::default();
        let mut raw_values: HashMap<Arc<str>, i32> = HashMap::default();

        for (symbol, value, is_canonical) in &self.entries {
            if raw_values.insert(symbol.clone(), *value).is_some() {
                return Err(MarshalError::DuplicateField {
                    name: self.name.to_string(),
                    field: symbol.to_string(),
                });
            }
            canonical.entry(*value).or_insert_with(|| symbol.clone());
            if *is_canonical {
                explicit.insert(*value, symbol.clone());
            }
        }
        canonical.extend(explicit);

        let mut symbols: HashMap<Arc<str>, Arc<str>> = HashMap::default();
        let mut values: HashMap<Arc<str>, i32> = HashMap::default();
        for (symbol, value) in &raw_values {
            if let Some(target) = canonical.get(value) {
                symbols.insert(symbol.clone(), target.clone());
                values.insert(target.clone(), *value);
            }
        }

        for (alias, target) in &self.aliases {
            let resolved = symbols
                .get(target)
                .cloned()
                .ok_or_else(|| MarshalError::UnknownEnumSymbol {
                    name: self.name.to_string(),
                    symbol: target.to_string(),
                })?;
            if symbols.insert(alias.clone(), resolved).is_some() {
                return Err(MarshalError::DuplicateField {
                    name: self.name.to_string(),
                    field: alias.to_string(),
                });
            }
        }

        let variants = self
            .entries
            .iter()
            .filter(|(symbol, value, _)| canonical.get(value) == Some(symbol))
            .map(|(symbol, value, _)| (symbol.clone(), *value))
            .collect();

        Ok(EnumCodec {
            name: self.name,
            variants,
            symbols,
            values,
            canonical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_codec() -> Result<EnumCodec, MarshalError> {
        EnumCodec::builder("VkResult")
            .variant("VK_SUCCESS", 0)
            .variant("VK_NOT_READY", 1)
            .variant("VK_ERROR_OUT_OF_POOL_MEMORY", -1000069000)
            .variant("VK_ERROR_OUT_OF_POOL_MEMORY_KHR", -1000069000)
            .alias("VK_ERROR_OUT_OF_POOL_MEMORY_ALIAS", "VK_ERROR_OUT_OF_POOL_MEMORY_KHR")
            .build()
    }

    #[test]
    fn test_aliases_decode_to_first_registered() -> Result<(), MarshalError> {
        let codec = result_codec()?;
        assert_eq!(codec.encode("VK_ERROR_OUT_OF_POOL_MEMORY_KHR")?, -1000069000);
        assert_eq!(codec.encode("VK_ERROR_OUT_OF_POOL_MEMORY_ALIAS")?, -1000069000);
        assert_eq!(
            codec.decode(-1000069000),
            EnumValue::Known("VK_ERROR_OUT_OF_POOL_MEMORY".into())
        );
        assert_eq!(
            codec.value("VK_ERROR_OUT_OF_POOL_MEMORY_KHR")?,
            EnumValue::Known("VK_ERROR_OUT_OF_POOL_MEMORY".into())
        );
        assert_eq!(codec.variants().count(), 3);
        Ok(())
    }

    #[test]
    fn test_explicit_canonical_wins() -> Result<(), MarshalError> {
        let codec = EnumCodec::builder("VkPresentModeKHR")
            .variant("MODE_OLD", 2)
            .canonical("MODE_NEW", 2)
            .build()?;
        assert_eq!(codec.decode(2), EnumValue::Known("MODE_NEW".into()));
        assert_eq!(codec.value("MODE_OLD")?, EnumValue::Known("MODE_NEW".into()));
        Ok(())
    }

    #[test]
    fn test_unknown_values() -> Result<(), MarshalError> {
        let codec = result_codec()?;
        assert_eq!(codec.decode(42), EnumValue::Raw(42));
        assert_eq!(codec.encode_value(&codec.decode(42))?, 42);
        assert!(matches!(
            codec.decode_strict(42),
            Err(MarshalError::UnknownEnumValue { value: 42, .. })
        ));
        assert!(codec.encode("VK_NOPE").is_err());
        Ok(())
    }

    #[test]
    fn test_alias_to_unknown_target_fails() {
        let result = EnumCodec::builder("E").variant("A", 0).alias("B", "C").build();
        assert!(matches!(result, Err(MarshalError::UnknownEnumSymbol { .. })));
    }
}
