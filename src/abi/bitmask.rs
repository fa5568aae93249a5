//! Flag set codec.
//!
//! Decoding keeps every bit it cannot name in a residual, so
//! `encode(decode(x)) == x` holds for any `x`, including bits added by newer
//! native headers.

use foldhash::HashMap;
use std::fmt;
use std::sync::Arc;

use super::MarshalError;

/// Storage width of a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlagsWidth {
    /// `VkFlags`, 4 bytes.
    #[default]
    Flags32,
    /// `VkFlags64`, 8 bytes.
    Flags64,
}

impl FlagsWidth {
    pub const fn size(self) -> usize {
        match self {
            Self::Flags32 => 4,
            Self::Flags64 => 8,
        }
    }

    const fn mask(self) -> u64 {
        match self {
            Self::Flags32 => u32::MAX as u64,
            Self::Flags64 => u64::MAX,
        }
    }
}

/// A set of named flags plus the bits no flag accounts for.
///
/// Two values are equal when they describe the same bits.
#[derive(Debug, Clone, Default, Eq)]
pub struct BitmaskValue {
    flags: Vec<Arc<str>>,
    known: u64,
    residual: u64,
}

impl BitmaskValue {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Named flags, in declaration order.
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(|f| f.as_ref())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.as_ref() == flag)
    }

    /// Bits not covered by any declared flag.
    pub fn residual(&self) -> u64 {
        self.residual
    }

    /// All bits, named and residual.
    pub fn bits(&self) -> u64 {
        self.known | self.residual
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }
}

impl PartialEq for BitmaskValue {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl std::hash::Hash for BitmaskValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl fmt::Display for BitmaskValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for flag in &self.flags {
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(flag)?;
            first = false;
        }
        if self.residual != 0 || first {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{:#x}", self.residual)?;
        }
        Ok(())
    }
}

/// Symbol/bit table for one bitmask type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmaskCodec {
    name: Arc<str>,
    width: FlagsWidth,
    /// Canonical flags in declaration order.
    flags: Vec<(Arc<str>, u64)>,
    /// Every accepted spelling mapped to its bits.
    lookup: HashMap<Arc<str>, u64>,
}

impl BitmaskCodec {
    pub fn builder(name: impl Into<Arc<str>>) -> BitmaskCodecBuilder {
        BitmaskCodecBuilder {
            name: name.into(),
            width: FlagsWidth::Flags32,
            flags: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> FlagsWidth {
        self.width
    }

    /// Declared flags with their bits, in declaration order.
    pub fn flags(&self) -> impl Iterator<Item = (&str, u64)> {
        self.flags.iter().map(|(s, b)| (s.as_ref(), *b))
    }

    /// Bits of one flag (canonical name or alias).
    pub fn bit(&self, flag: &str) -> Result<u64, MarshalError> {
        self.lookup
            .get(flag)
            .copied()
            .ok_or_else(|| MarshalError::UnknownFlag {
                name: self.name.to_string(),
                flag: flag.to_string(),
            })
    }

    /// OR together the bits of every named flag.
    pub fn encode<'a>(&self, flags: impl IntoIterator<Item = &'a str>) -> Result<u64, MarshalError> {
        flags
            .into_iter()
            .try_fold(0u64, |acc, flag| Ok(acc | self.bit(flag)?))
    }

    /// Build a value from named flags.
    pub fn value<'a>(
        &self,
        flags: impl IntoIterator<Item = &'a str>,
    ) -> Result<BitmaskValue, MarshalError> {
        let bits = self.encode(flags)?;
        self.decode(bits)
    }

    /// Encode a value, checking it fits the declared width.
    pub fn encode_value(&self, value: &BitmaskValue) -> Result<u64, MarshalError> {
        let bits = value.bits();
        if bits & !self.width.mask() != 0 {
            return Err(MarshalError::FlagOverflow {
                name: self.name.to_string(),
                bits,
                width: self.width.size(),
            });
        }
        Ok(bits)
    }

    /// Split raw bits into declared flags and a residual.
    ///
    /// Flags are matched in declaration order; a flag whose bits are all
    /// covered by flags already matched is not reported again, so composite
    /// flags declared after their parts do not appear twice.
    pub fn decode(&self, raw: u64) -> Result<BitmaskValue, MarshalError> {
        if raw & !self.width.mask() != 0 {
            return Err(MarshalError::FlagOverflow {
                name: self.name.to_string(),
                bits: raw,
                width: self.width.size(),
            });
        }
        let mut flags = Vec::new();
        let mut known = 0u64;
        for (flag, bit) in &self.flags {
            if *bit == 0 || raw & bit != *bit || known & bit == *bit {
                continue;
            }
            known |= bit;
            flags.push(flag.clone());
        }
        Ok(BitmaskValue {
            flags,
            known,
            residual: raw & !known,
        })
    }
}

/// Builder for [`BitmaskCodec`].
#[derive(Debug)]
pub struct BitmaskCodecBuilder {
    name: Arc<str>,
    width: FlagsWidth,
    flags: Vec<(Arc<str>, u64)>,
    aliases: Vec<(Arc<str>, Arc<str>)>,
}

impl BitmaskCodecBuilder {
    pub fn width(mut self, width: FlagsWidth) -> Self {
        self.width = width;
        self
    }

    /// Declare a flag by its bit value (not its bit position).
    pub fn flag(mut self, name: impl Into<Arc<str>>, bits: u64) -> Self {
        self.flags.push((name.into(), bits));
        self
    }

    pub fn alias(mut self, alias: impl Into<Arc<str>>, target: impl Into<Arc<str>>) -> Self {
        self.aliases.push((alias.into(), target.into()));
        self
    }

    pub fn build(self) -> Result<BitmaskCodec, MarshalError> {
        let mut lookup: HashMap<Arc<str>, u64> = HashMap::default();
        for (flag, bits) in &self.flags {
            if bits & !self.width.mask() != 0 {
                return Err(MarshalError::FlagOverflow {
                    name: self.name.to_string(),
                    bits: *bits,
                    width: self.width.size(),
                });
            }
            if lookup.insert(flag.clone(), *bits).is_some() {
                return Err(MarshalError::DuplicateField {
                    name: self.name.to_string(),
                    field: flag.to_string(),
                });
            }
        }
        for (alias, target) in &self.aliases {
            let bits = lookup
                .get(target)
                .copied()
                .ok_or_else(|| MarshalError::UnknownFlag {
                    name: self.name.to_string(),
                    flag: target.to_string(),
                })?;
            if lookup.insert(alias.clone(), bits).is_some() {
                return Err(MarshalError::DuplicateField {
                    name: self.name.to_string(),
                    field: alias.to_string(),
                });
            }
        }
        Ok(BitmaskCodec {
            name: self.name,
            width: self.width,
            flags: self.flags,
            lookup,
        })
    }
}
