//! Map implementations
//!
//! This module provides [`SyncMap`], a concurrent map built from a lock-free
//! read tier and a mutex-guarded dirty tier.
//!
//! ## Choosing a Map
//!
//! - Use `SyncMap` when keys are mostly written once and then read many
//!   times, or when threads work on disjoint key sets
//! - Workloads that keep inserting new keys pay for the locked dirty tier;
//!   watch `slow_path_rate` in the map's metrics
//! - The compound operations (`load_or_store`, `swap`, `compare_and_swap`,
//!   `compare_and_delete`, `load_and_delete`) replace external locking for
//!   once-only initialization, reference counting and optimistic updates

pub mod bulk;
pub mod config;
mod entry;
pub mod sync_map;

pub use self::config::MapConfig;
pub use self::sync_map::SyncMap;


#[cfg(test)]
mod proptests;
