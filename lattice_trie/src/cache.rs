//! A read-through cache of resolved artifacts keyed by digest.
//!
//! Content addressing means an entry never goes stale, so the cache only ever
//! grows. Concurrent populators race on "insert if absent": whichever value
//! lands first is the one every caller observes.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::digest::Digest;

/// A shared, insert-only map from digest to resolved value.
#[derive(Debug)]
pub struct DigestCache<T> {
    entries: RwLock<HashMap<Digest, Arc<T>>>,
}

impl<T> Default for DigestCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> DigestCache<T> {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value for `digest`, if any.
    pub fn get(&self, digest: &Digest) -> Option<Arc<T>> {
        self.entries.read().get(digest).cloned()
    }

    /// Returns the cached value for `digest`, resolving and inserting it
    /// first if needed.
    pub fn get_or_insert_with<F: FnOnce() -> T>(&self, digest: Digest, resolve: F) -> Arc<T> {
        if let Some(hit) = self.get(&digest) {
            return hit;
        }

        let value = Arc::new(resolve());
        self.entries.write().entry(digest).or_insert(value).clone()
    }

    /// Like [`DigestCache::get_or_insert_with`] for fallible resolution.
    /// Failures are not cached.
    pub fn try_get_or_insert_with<E, F>(&self, digest: Digest, resolve: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(hit) = self.get(&digest) {
            return Ok(hit);
        }

        let value = Arc::new(resolve()?);
        Ok(self.entries.write().entry(digest).or_insert(value).clone())
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn first_insert_wins() {
        let cache = DigestCache::new();
        let d = Digest::from(1);

        let first = cache.get_or_insert_with(d, || "first");
        let second = cache.get_or_insert_with(d, || "second");

        assert_eq!(*first, "first");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = DigestCache::<u32>::new();
        let d = Digest::from(2);

        assert_eq!(cache.try_get_or_insert_with(d, || Err("missing")), Err("missing"));
        assert!(cache.is_empty());
        assert_eq!(*cache.try_get_or_insert_with::<&str, _>(d, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn concurrent_population_converges() {
        let cache = Arc::new(DigestCache::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || *cache.get_or_insert_with(Digest::from(3), || i))
            })
            .collect();
        let seen: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }
}
