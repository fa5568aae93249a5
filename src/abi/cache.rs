//! Layout cache keyed by structure type name.

use std::sync::Arc;

use foldhash::HashMap;
use parking_lot::RwLock;

use super::{ComputedLayout, MarshalError};
use crate::logging::trace;

/// Process-lifetime store of computed layouts.
///
/// Readers never block each other, except when an entry is vacant. A vacant
/// entry is computed outside the lock; if two threads race, both compute an
/// equal layout and the first insertion wins. Entries are never replaced.
#[derive(Debug, Default)]
pub struct LayoutCache {
    inner: RwLock<HashMap<Arc<str>, Arc<ComputedLayout>>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the layout for `name`, if computed.
    pub fn get(&self, name: &str) -> Option<Arc<ComputedLayout>> {
        self.inner.read().get(name).cloned()
    }

    /// Returns the layout for `name`, computing it with `f` on first use. If
    /// `f` fails, the error is propagated and nothing is cached.
    pub fn get_or_try_insert(
        &self,
        name: &str,
        f: impl FnOnce() -> Result<ComputedLayout, MarshalError>,
    ) -> Result<Arc<ComputedLayout>, MarshalError> {
        if let Some(layout) = self.get(name) {
            trace!(name, "layout cache hit");
            return Ok(layout);
        }
        trace!(name, "layout cache miss");

        let layout = Arc::new(f()?);
        let key: Arc<str> = Arc::from(name);
        Ok(self
            .inner
            .write()
            .entry(key)
            .or_insert(layout)
            .clone())
    }

    /// Publish an already computed layout under its own name.
    ///
    /// Returns the cached entry, which is the existing one if the name was
    /// already taken.
    pub fn insert(&self, layout: ComputedLayout) -> Arc<ComputedLayout> {
        let key: Arc<str> = Arc::from(layout.name());
        self.inner
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(layout))
            .clone()
    }

    /// Size of a cached layout.
    pub fn size_of(&self, name: &str) -> Result<usize, MarshalError> {
        self.require(name).map(|l| l.size())
    }

    /// Alignment of a cached layout.
    pub fn align_of(&self, name: &str) -> Result<usize, MarshalError> {
        self.require(name).map(|l| l.align())
    }

    /// The layout for `name`, or [`MarshalError::UnresolvedType`].
    pub fn require(&self, name: &str) -> Result<Arc<ComputedLayout>, MarshalError> {
        self.get(name)
            .ok_or_else(|| MarshalError::UnresolvedType(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Names of all cached layouts, in no particular order.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.inner.read().keys().cloned().collect()
    }
}
