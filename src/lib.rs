//! # syncmap
//!
//! A concurrent map for sharing key/value state between threads without
//! external locking, with static typing all the way through.
//!
//! ## Features
//!
//! - **Lock-free reads**: lookups of settled keys never touch a lock
//! - **Atomic compound operations**: `load_or_store`, `swap`,
//!   `compare_and_swap`, `compare_and_delete` and `load_and_delete`
//! - **Weakly consistent iteration**: `range` walks the map without blocking
//!   writers and never reports a value that was not stored
//! - **Optional metrics**: hit, slow-path and promotion counters
//!
//! ## Quick Start
//!
//! ```rust
//! use syncmap::SyncMap;
//!
//! let map = SyncMap::new();
//! map.store("hits", 1u64);
//!
//! // Optimistic increment
//! loop {
//!     let current = map.load("hits").unwrap_or(0);
//!     if map.compare_and_swap("hits", &current, current + 1) {
//!         break;
//!     }
//! }
//! assert_eq!(map.load("hits"), Some(2));
//! ```
//!
//! ## Thread Safety
//!
//! Every operation takes `&self`. Wrap the map in an `Arc`, or borrow it into
//! scoped threads, and call it from as many threads as needed; the map does
//! all of its own synchronization.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod map;
pub mod metrics;

pub use crate::map::{MapConfig, SyncMap};
pub use crate::metrics::{MapMetrics, MetricsCollector};

/// Common utilities and helper types
pub mod util {
    use core::fmt;

    /// Cache line size for alignment purposes
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Pad a value to its own cache line
    #[repr(align(64))]
    #[derive(Default)]
    pub struct CachePadded<T> {
        value: T,
    }

    impl<T> CachePadded<T> {
        /// Create a new cache-padded value
        #[inline]
        pub const fn new(value: T) -> Self {
            Self { value }
        }

        /// Get a reference to the inner value
        #[inline]
        pub const fn get(&self) -> &T {
            &self.value
        }

        /// Get a mutable reference to the inner value
        #[inline]
        pub fn get_mut(&mut self) -> &mut T {
            &mut self.value
        }

        /// Get the inner value
        #[inline]
        pub fn into_inner(self) -> T {
            self.value
        }
    }

    impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(&self.value, f)
        }
    }
}
