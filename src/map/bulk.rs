//! Convenience helpers
//!
//! Everything here is a composition of [`SyncMap::range`] and
//! [`SyncMap::store`]; none of it touches the map's internals. Results
//! follow the weak consistency of `range` when the map is mutated
//! concurrently.

use super::SyncMap;
use core::fmt;
use core::hash::Hash;
use std::collections::HashMap;

impl<K, V> SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Copy every entry into a standard `HashMap`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    /// use std::collections::HashMap;
    ///
    /// let map = SyncMap::new();
    /// map.store(1, "a");
    /// map.store(2, "b");
    /// assert_eq!(map.to_hash_map(), HashMap::from([(1, "a"), (2, "b")]));
    /// ```
    pub fn to_hash_map(&self) -> HashMap<K, V> {
        let mut snapshot = HashMap::new();
        self.range(|key, value| {
            snapshot.insert(key.clone(), value.clone());
            true
        });
        snapshot
    }

    /// Store every pair from `pairs`, overwriting existing keys
    pub fn store_all<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in pairs {
            self.store(key, value);
        }
    }

    /// Store every entry of `other` into this map
    pub fn copy_from(&self, other: &SyncMap<K, V>) {
        other.range(|key, value| {
            self.store(key.clone(), value.clone());
            true
        });
    }

    /// Store the entries of each map in turn; later maps win on shared keys
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let first: SyncMap<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
    /// let second: SyncMap<&str, i32> = [("b", 3), ("c", 4)].into_iter().collect();
    ///
    /// let merged = SyncMap::new();
    /// merged.copy_from_all([&first, &second]);
    /// assert_eq!(merged.load("b"), Some(3));
    /// assert_eq!(merged.count(), 3);
    /// ```
    pub fn copy_from_all<'a, I>(&self, maps: I)
    where
        I: IntoIterator<Item = &'a SyncMap<K, V>>,
    {
        for map in maps {
            self.copy_from(map);
        }
    }

    /// Number of entries, counted by walking the map
    pub fn count(&self) -> usize {
        let mut count = 0;
        self.range(|_, _| {
            count += 1;
            true
        });
        count
    }

    /// Check if the map has no entries
    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.range(|_, _| {
            empty = false;
            false
        });
        empty
    }

    /// Clone out every key, in no particular order
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        self.range(|key, _| {
            keys.push(key.clone());
            true
        });
        keys
    }

    /// Clone out every value, in no particular order
    pub fn values(&self) -> Vec<V> {
        let mut values = Vec::new();
        self.range(|_, value| {
            values.push(value.clone());
            true
        });
        values
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    /// Write every entry to the `debug` log
    pub fn log_entries(&self) {
        log::debug!("sync map entries:");
        self.range(|key, value| {
            log::debug!("  {:?} => {:?}", key, value);
            true
        });
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        let map = Self::with_config(self.config());
        map.copy_from(self);
        map
    }
}

impl<K, V> FromIterator<(K, V)> for SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        map.store_all(iter);
        map
    }
}

impl<K, V> Extend<(K, V)> for SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.store_all(iter);
    }
}

impl<K, V, S> From<HashMap<K, V, S>> for SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from(map: HashMap<K, V, S>) -> Self {
        map.into_iter().collect()
    }
}

impl<K, V> fmt::Debug for SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.range(|key, value| {
            map.entry(key, value);
            true
        });
        map.finish()
    }
}
