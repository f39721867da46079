//! Memo of the matcher's derived collections

use crate::MatchedPhoto;
use std::collections::HashMap;
use std::sync::Arc;

/// Identifies a derived value of a matching pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    LocalizedPhotos,
    GeotaggedCount,
    NotGeotaggedCount,
}

#[derive(Clone, Debug)]
pub enum CachedValue {
    Photos(Arc<[MatchedPhoto]>),
    Count(usize),
}

/// Cached values of one matcher, invalidated as a unit
#[derive(Clone, Debug, Default)]
pub struct MatchCache {
    entries: HashMap<CacheKey, CachedValue>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn photos(&self, key: CacheKey) -> Option<Arc<[MatchedPhoto]>> {
        match self.entries.get(&key)? {
            CachedValue::Photos(photos) => Some(Arc::clone(photos)),
            CachedValue::Count(_) => None,
        }
    }

    pub fn count(&self, key: CacheKey) -> Option<usize> {
        match self.entries.get(&key)? {
            CachedValue::Count(count) => Some(*count),
            CachedValue::Photos(_) => None,
        }
    }

    pub fn insert(&mut self, key: CacheKey, value: CachedValue) {
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Cached keys in a stable order
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
