//! Concurrent Map Implementation
//!
//! This module implements a concurrent map tuned for keys that are written
//! once and read many times, or for workers that touch disjoint key sets.
//! Reads of settled keys never take a lock; only the first write of a new key
//! and structural changes go through a short critical section.
//!
//! ## Design
//!
//! The map keeps two tiers of `key -> Arc<Entry>` tables:
//!
//! - **read tier**: an immutable table published through an epoch-protected
//!   atomic pointer. Lookups and value updates for keys in this tier are
//!   lock-free; updates CAS the entry's value slot.
//! - **dirty tier**: a mutable table behind a mutex holding every live entry
//!   of the read tier plus keys inserted since the last promotion. The read
//!   tier is flagged *amended* while the dirty tier holds keys it lacks.
//!
//! Each lookup that misses the read tier while it is amended counts a miss.
//! Once misses catch up with the size of the dirty tier, the dirty table is
//! promoted to become the new read tier, so the cost of copying is amortised
//! over the lookups that paid for the slow path.
//!
//! Deleted entries stay in the read tier with an empty slot. When the dirty
//! tier is rebuilt they are marked *expunged* and left out; a later store to
//! such a key takes the lock to re-add it.
//!
//! ## Memory Ordering
//!
//! - Value slots and the read-tier pointer are loaded with `Acquire`
//! - Every slot transition is an `AcqRel` CAS or swap
//! - Retired values and read tables are destroyed only after all pinned
//!   threads have moved past the epoch in which they were unlinked
//!
//! ## Iteration
//!
//! [`SyncMap::range`] first promotes pending keys, then walks the read tier it
//! promoted. Keys inserted for the first time after that point are not
//! visited. A visited key's value is read at the moment of the visit, so
//! concurrent updates may or may not be seen and keys deleted before their
//! visit are skipped. A value handed to the visitor was always stored for
//! that key, and a key left untouched for the whole walk is visited exactly
//! once.
//!
//! The walk holds a reference to the promoted table rather than a pinned
//! epoch, and re-pins its guard every few dozen entries. A slow visitor
//! therefore delays reclamation only of values retired while it runs on the
//! current stretch of entries, not for the whole walk.
//!
//! ## Example
//!
//! ```rust
//! use syncmap::SyncMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(SyncMap::new());
//!
//! let writers: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..250u64 {
//!                 map.store(t * 250 + i, i * 2);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for writer in writers {
//!     writer.join().unwrap();
//! }
//!
//! let mut sum = 0;
//! map.range(|_, value| {
//!     sum += *value;
//!     true
//! });
//! assert_eq!(sum, 4 * 249 * 250);
//! ```

use super::config::MapConfig;
use super::entry::Entry;
use crate::metrics::{AtomicMetrics, MapMetrics, MetricsCollector};
use crate::util::CachePadded;
use core::borrow::Borrow;
use core::hash::Hash;
use core::ops::Deref;
use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use fxhash::FxBuildHasher;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

type Table<K, V> = HashMap<K, Arc<Entry<V>>, FxBuildHasher>;

/// Entries visited by `range` between two re-pins of its epoch guard
const REPIN_INTERVAL: usize = 64;

/// The lock-free tier
struct ReadOnly<K, V> {
    entries: Arc<Table<K, V>>,
    // Set while the dirty tier holds keys missing here
    amended: bool,
}

impl<K, V> ReadOnly<K, V> {
    fn empty() -> Self {
        Self {
            entries: Arc::new(HashMap::default()),
            amended: false,
        }
    }
}

/// The locked tier
struct DirtyState<K, V> {
    // `None` until the first new key after a promotion
    entries: Option<Table<K, V>>,
    misses: usize,
}

impl<K: Hash + Eq, V> DirtyState<K, V> {
    fn table_mut(&mut self) -> &mut Table<K, V> {
        // Callers build the table with `dirty_locked` first; an entry can
        // only be expunged while a dirty table exists.
        debug_assert!(self.entries.is_some());
        self.entries.get_or_insert_with(Default::default)
    }
}

/// An entry found either in the read tier or, under the lock, in the dirty tier
enum EntryRef<'g, V> {
    Read(&'g Arc<Entry<V>>),
    Dirty(Arc<Entry<V>>),
}

impl<V> Deref for EntryRef<'_, V> {
    type Target = Entry<V>;

    fn deref(&self) -> &Entry<V> {
        match self {
            EntryRef::Read(entry) => entry,
            EntryRef::Dirty(entry) => entry,
        }
    }
}

/// A concurrent map with lock-free reads and atomic compound operations
///
/// All operations take `&self`; share the map between threads with an `Arc`
/// or a scoped borrow. Reads return clones of the stored values.
///
/// # Type Parameters
///
/// * `K` - The key type, must implement `Hash + Eq + Clone + Send + Sync`
/// * `V` - The value type, must implement `Clone + Send + Sync`; the compare
///   operations additionally need `PartialEq`
///
/// # Examples
///
/// ```rust
/// use syncmap::SyncMap;
///
/// let map: SyncMap<&str, u32> = SyncMap::new();
/// map.store("answer", 42);
/// assert_eq!(map.load("answer"), Some(42));
///
/// assert_eq!(map.load_or_store("answer", 7), (42, true));
/// assert!(map.compare_and_swap("answer", &42, 43));
/// assert_eq!(map.swap("answer", 44), Some(43));
/// assert_eq!(map.load_and_delete("answer"), Some(44));
/// assert_eq!(map.load("answer"), None);
/// ```
pub struct SyncMap<K, V> {
    // Current read tier, never null
    read: CachePadded<Atomic<ReadOnly<K, V>>>,

    // Dirty tier and its miss counter
    dirty: CachePadded<Mutex<DirtyState<K, V>>>,

    // Lower bound for the dirty table's first allocation
    capacity: usize,

    metrics: AtomicMetrics,
    metrics_enabled: AtomicBool,
}

impl<K, V> SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map with the default configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map: SyncMap<String, u64> = SyncMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    /// Create an empty map sized for `capacity` keys
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(MapConfig::default().with_initial_capacity(capacity))
    }

    /// Create an empty map from explicit options
    pub fn with_config(config: MapConfig) -> Self {
        Self {
            read: CachePadded::new(Atomic::new(ReadOnly::empty())),
            dirty: CachePadded::new(Mutex::new(DirtyState {
                entries: None,
                misses: 0,
            })),
            capacity: config.initial_capacity,
            metrics: AtomicMetrics::default(),
            metrics_enabled: AtomicBool::new(config.metrics_enabled),
        }
    }

    /// Get a clone of the value stored for `key`
    ///
    /// Lock-free for keys in the read tier. A load racing a write returns
    /// either the old or the new value, never anything else.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// assert_eq!(map.load(&1), None);
    /// map.store(1, "one");
    /// assert_eq!(map.load(&1), Some("one"));
    /// ```
    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let timer = self.timer();
        let guard = &epoch::pin();
        let value = self
            .find(key, guard)
            .and_then(|entry| entry.load(guard).cloned());
        self.record(timer, value.is_some());
        value
    }

    /// Set the value for `key`, replacing any previous value
    pub fn store(&self, key: K, value: V) {
        let timer = self.timer();
        let guard = &epoch::pin();
        self.swap_in(key, value, guard);
        self.record(timer, true);
    }

    /// Remove `key` if present
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let timer = self.timer();
        let guard = &epoch::pin();
        let removed = self.remove(key, guard).is_some();
        self.record(timer, removed);
    }

    /// Remove `key` and return the value it held
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.store("k", 1);
    /// assert_eq!(map.load_and_delete("k"), Some(1));
    /// assert_eq!(map.load_and_delete("k"), None);
    /// ```
    pub fn load_and_delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let timer = self.timer();
        let guard = &epoch::pin();
        let value = self.remove(key, guard).cloned();
        self.record(timer, value.is_some());
        value
    }

    /// Return the existing value for `key`, or store `value`
    ///
    /// The flag is `true` if the value was loaded and `false` if `value` was
    /// stored. When several threads race on an absent key exactly one of them
    /// stores; every other racer gets the winner's value back.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// assert_eq!(map.load_or_store("k", 1), (1, false));
    /// assert_eq!(map.load_or_store("k", 2), (1, true));
    /// ```
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool) {
        let timer = self.timer();
        let guard = &epoch::pin();

        let read = self.read_only(guard);
        let value = match read.entries.get(&key) {
            Some(entry) => match entry.try_load_or_store(value, guard) {
                Ok((actual, loaded)) => {
                    let actual = actual.clone();
                    self.record(timer, loaded);
                    return (actual, loaded);
                }
                Err(value) => value,
            },
            None => value,
        };

        let mut dirty = self.lock_dirty();
        let read = self.read_only(guard);
        let (actual, loaded) = if let Some(entry) = read.entries.get(&key) {
            if entry.unexpunge_locked(guard) {
                dirty.table_mut().insert(key, Arc::clone(entry));
            }
            Self::load_or_store_locked(entry, value, guard)
        } else if let Some(entry) = dirty
            .entries
            .as_ref()
            .and_then(|table| table.get(&key))
            .cloned()
        {
            let result = Self::load_or_store_locked(&entry, value, guard);
            self.miss_locked(&mut dirty, guard);
            result
        } else {
            let actual = value.clone();
            self.insert_locked(&mut dirty, read, key, Entry::new(value), guard);
            (actual, false)
        };
        drop(dirty);

        self.record(timer, loaded);
        (actual, loaded)
    }

    /// Set the value for `key` and return the previous one
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// assert_eq!(map.swap("k", 1), None);
    /// assert_eq!(map.swap("k", 2), Some(1));
    /// assert_eq!(map.load("k"), Some(2));
    /// ```
    pub fn swap(&self, key: K, value: V) -> Option<V> {
        let timer = self.timer();
        let guard = &epoch::pin();
        let previous = self.swap_in(key, value, guard).cloned();
        self.record(timer, previous.is_some());
        previous
    }

    /// Visit every entry until `visit` returns `false`
    ///
    /// Order is unspecified. See the [module documentation](self) for what a
    /// walk observes under concurrent mutation. The visitor runs without any
    /// internal lock held and may itself operate on the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.store("a", 1);
    /// map.store("b", 2);
    ///
    /// let mut visited = 0;
    /// map.range(|_, _| {
    ///     visited += 1;
    ///     false
    /// });
    /// assert_eq!(visited, 1);
    /// ```
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let timer = self.timer();
        let entries = {
            let guard = &epoch::pin();
            let mut read = self.read_only(guard);
            if read.amended {
                let mut dirty = self.lock_dirty();
                read = self.read_only(guard);
                if read.amended {
                    read = self.promote_locked(&mut dirty, guard);
                }
            }
            // Owning the table keeps every entry alive without a pinned epoch
            Arc::clone(&read.entries)
        };

        let mut guard = epoch::pin();
        for (visited, (key, entry)) in entries.iter().enumerate() {
            if visited % REPIN_INTERVAL == 0 {
                guard.repin();
            }
            if let Some(value) = entry.load(&guard) {
                if !visit(key, value) {
                    break;
                }
            }
        }
        self.record(timer, true);
    }

    /// Remove every entry
    pub fn clear(&self) {
        let timer = self.timer();
        let guard = &epoch::pin();
        let mut dirty = self.lock_dirty();
        self.publish(ReadOnly::empty(), guard);
        dirty.entries = None;
        dirty.misses = 0;
        drop(dirty);
        log::debug!("cleared sync map");
        self.record(timer, true);
    }

    /// The options this map was created with, with the current metrics switch
    pub fn config(&self) -> MapConfig {
        MapConfig {
            initial_capacity: self.capacity,
            metrics_enabled: self.metrics_on(),
        }
    }

    // Private helper methods

    fn read_only<'g>(&self, guard: &'g Guard) -> &'g ReadOnly<K, V> {
        // SAFETY: the pointer is never null, and replaced tables are only
        // destroyed after every guard pinned before the replacement is gone.
        unsafe { self.read.get().load(Ordering::Acquire, guard).deref() }
    }

    fn publish<'g>(&self, read: ReadOnly<K, V>, guard: &'g Guard) -> &'g ReadOnly<K, V> {
        let new = Owned::new(read).into_shared(guard);
        let old = self.read.get().swap(new, Ordering::AcqRel, guard);
        // SAFETY: `old` is unreachable for threads pinning after the swap.
        unsafe {
            guard.defer_destroy(old);
            new.deref()
        }
    }

    fn lock_dirty(&self) -> MutexGuard<'_, DirtyState<K, V>> {
        if self.metrics_on() {
            self.metrics.record_slow_path();
        }
        self.dirty.get().lock()
    }

    fn find<'g, Q>(&self, key: &Q, guard: &'g Guard) -> Option<EntryRef<'g, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            return Some(EntryRef::Read(entry));
        }
        if !read.amended {
            return None;
        }

        let mut dirty = self.lock_dirty();
        // The read tier may have been promoted while we waited
        let read = self.read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            return Some(EntryRef::Read(entry));
        }
        if !read.amended {
            return None;
        }
        let entry = dirty
            .entries
            .as_ref()
            .and_then(|table| table.get(key))
            .cloned();
        self.miss_locked(&mut dirty, guard);
        entry.map(EntryRef::Dirty)
    }

    fn remove<'g, Q>(&self, key: &Q, guard: &'g Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            return entry.delete(guard);
        }
        if !read.amended {
            return None;
        }

        let mut dirty = self.lock_dirty();
        let read = self.read_only(guard);
        let entry = match read.entries.get(key) {
            Some(entry) => EntryRef::Read(entry),
            None if read.amended => {
                let entry = dirty.entries.as_mut().and_then(|table| table.remove(key));
                self.miss_locked(&mut dirty, guard);
                EntryRef::Dirty(entry?)
            }
            None => return None,
        };
        drop(dirty);

        entry.delete(guard)
    }

    fn swap_in<'g>(&self, key: K, value: V, guard: &'g Guard) -> Option<&'g V> {
        let read = self.read_only(guard);
        let value = match read.entries.get(&key) {
            Some(entry) => match entry.try_swap(value, guard) {
                Ok(previous) => return previous,
                Err(value) => value,
            },
            None => value,
        };

        let mut dirty = self.lock_dirty();
        let read = self.read_only(guard);
        if let Some(entry) = read.entries.get(&key) {
            if entry.unexpunge_locked(guard) {
                dirty.table_mut().insert(key, Arc::clone(entry));
            }
            entry.swap_locked(value, guard)
        } else if let Some(entry) = dirty.entries.as_ref().and_then(|table| table.get(&key)) {
            entry.swap_locked(value, guard)
        } else {
            self.insert_locked(&mut dirty, read, key, Entry::new(value), guard);
            None
        }
    }

    fn load_or_store_locked(entry: &Entry<V>, value: V, guard: &Guard) -> (V, bool) {
        match entry.try_load_or_store(value, guard) {
            Ok((actual, loaded)) => (actual.clone(), loaded),
            // Expunging needs the lock our caller holds
            Err(_) => unreachable!("entry expunged while the map lock is held"),
        }
    }

    /// Add a brand-new key to the dirty tier, building it first if needed.
    fn insert_locked(
        &self,
        dirty: &mut DirtyState<K, V>,
        read: &ReadOnly<K, V>,
        key: K,
        entry: Entry<V>,
        guard: &Guard,
    ) {
        if !read.amended {
            self.dirty_locked(dirty, read, guard);
            self.publish(
                ReadOnly {
                    entries: Arc::clone(&read.entries),
                    amended: true,
                },
                guard,
            );
        }
        dirty.table_mut().insert(key, Arc::new(entry));
    }

    /// Rebuild the dirty tier from the read tier, expunging deleted entries.
    fn dirty_locked(&self, dirty: &mut DirtyState<K, V>, read: &ReadOnly<K, V>, guard: &Guard) {
        if dirty.entries.is_some() {
            return;
        }

        let capacity = read.entries.len().max(self.capacity);
        let mut entries: Table<K, V> =
            HashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default());
        let mut expunged = 0usize;
        for (key, entry) in read.entries.iter() {
            if entry.try_expunge_locked(guard) {
                expunged += 1;
            } else {
                entries.insert(key.clone(), Arc::clone(entry));
            }
        }

        log::trace!(
            "rebuilt dirty tier with {} live entries ({} expunged)",
            entries.len(),
            expunged
        );
        dirty.entries = Some(entries);
    }

    fn miss_locked(&self, dirty: &mut DirtyState<K, V>, guard: &Guard) {
        dirty.misses += 1;
        let pending = dirty.entries.as_ref().map_or(0, |table| table.len());
        if dirty.misses < pending {
            return;
        }
        self.promote_locked(dirty, guard);
    }

    /// Publish the dirty tier as the new read tier.
    fn promote_locked<'g>(
        &self,
        dirty: &mut DirtyState<K, V>,
        guard: &'g Guard,
    ) -> &'g ReadOnly<K, V> {
        let entries = dirty.entries.take().unwrap_or_default();
        dirty.misses = 0;

        log::trace!("promoting dirty tier with {} entries", entries.len());
        if self.metrics_on() {
            self.metrics.record_promotion();
        }

        self.publish(
            ReadOnly {
                entries: Arc::new(entries),
                amended: false,
            },
            guard,
        )
    }

    #[inline]
    fn metrics_on(&self) -> bool {
        self.metrics_enabled.load(Ordering::Relaxed)
    }

    #[inline]
    fn timer(&self) -> Option<Instant> {
        self.metrics_on().then(Instant::now)
    }

    #[inline]
    fn record(&self, timer: Option<Instant>, hit: bool) {
        if let Some(start) = timer {
            self.metrics.record_operation(hit, start.elapsed());
        }
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Replace the value for `key` with `new` if it currently equals `old`
    ///
    /// Fails if the key is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// assert!(!map.compare_and_swap("k", &1, 2));
    /// map.store("k", 1);
    /// assert!(!map.compare_and_swap("k", &0, 2));
    /// assert!(map.compare_and_swap("k", &1, 2));
    /// assert_eq!(map.load("k"), Some(2));
    /// ```
    pub fn compare_and_swap<Q>(&self, key: &Q, old: &V, new: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let timer = self.timer();
        let guard = &epoch::pin();
        let swapped = self.compare_and_swap_in(key, old, new, guard);
        self.record(timer, swapped);
        swapped
    }

    /// Remove `key` if its value currently equals `old`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.store("k", 1);
    /// assert!(!map.compare_and_delete("k", &2));
    /// assert!(map.compare_and_delete("k", &1));
    /// assert_eq!(map.load("k"), None);
    /// ```
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let timer = self.timer();
        let guard = &epoch::pin();
        let deleted = self
            .find(key, guard)
            .map_or(false, |entry| entry.try_compare_and_delete(old, guard));
        self.record(timer, deleted);
        deleted
    }

    fn compare_and_swap_in<Q>(&self, key: &Q, old: &V, new: V, guard: &Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            return entry.try_compare_and_swap(old, new, guard);
        }
        if !read.amended {
            return false;
        }

        let mut dirty = self.lock_dirty();
        let read = self.read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            entry.try_compare_and_swap(old, new, guard)
        } else if let Some(entry) = dirty
            .entries
            .as_ref()
            .and_then(|table| table.get(key))
            .cloned()
        {
            let swapped = entry.try_compare_and_swap(old, new, guard);
            // The key set did not change, but the lookup still paid for the lock
            self.miss_locked(&mut dirty, guard);
            swapped
        } else {
            false
        }
    }
}

impl<K, V> MetricsCollector for SyncMap<K, V> {
    fn metrics(&self) -> MapMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn set_metrics_enabled(&self, enabled: bool) {
        self.metrics_enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_metrics_enabled(&self) -> bool {
        self.metrics_enabled.load(Ordering::Relaxed)
    }
}

impl<K, V> Drop for SyncMap<K, V> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent access; tables retired
        // earlier are owned by the collector.
        unsafe {
            let guard = epoch::unprotected();
            let read = self.read.get().load(Ordering::Relaxed, guard);
            if !read.is_null() {
                drop(read.into_owned());
            }
        }
    }
}
