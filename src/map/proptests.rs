//! Property-based tests for SyncMap using proptest
//!
//! Random operation sequences are applied to a `SyncMap` and to a plain
//! `HashMap` model; every result and the final contents must agree.

use crate::map::SyncMap;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Debug, Clone)]
enum Op {
    Load(u8),
    Store(u8, u16),
    Delete(u8),
    LoadAndDelete(u8),
    LoadOrStore(u8, u16),
    Swap(u8, u16),
    CompareAndSwap(u8, u16, u16),
    CompareAndDelete(u8, u16),
    Range,
    Clear,
}

// A small key and value space makes hits, expunges and promotions common
fn op_strategy() -> impl Strategy<Value = Op> {
    let key = 0u8..8;
    let value = 0u16..4;
    prop_oneof![
        4 => key.clone().prop_map(Op::Load),
        4 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Store(k, v)),
        2 => key.clone().prop_map(Op::Delete),
        2 => key.clone().prop_map(Op::LoadAndDelete),
        3 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::LoadOrStore(k, v)),
        2 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Swap(k, v)),
        3 => (key.clone(), value.clone(), value.clone())
            .prop_map(|(k, old, new)| Op::CompareAndSwap(k, old, new)),
        2 => (key, value).prop_map(|(k, v)| Op::CompareAndDelete(k, v)),
        1 => Just(Op::Range),
        1 => Just(Op::Clear),
    ]
}

#[cfg(test)]
mod sequential_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_matches_hash_map_model(
            ops in prop::collection::vec(op_strategy(), 1..200)
        ) {
            let map: SyncMap<u8, u16> = SyncMap::new();
            let mut model: HashMap<u8, u16> = HashMap::new();

            for op in ops {
                match op {
                    Op::Load(k) => {
                        prop_assert_eq!(map.load(&k), model.get(&k).copied());
                    }
                    Op::Store(k, v) => {
                        map.store(k, v);
                        model.insert(k, v);
                    }
                    Op::Delete(k) => {
                        map.delete(&k);
                        model.remove(&k);
                    }
                    Op::LoadAndDelete(k) => {
                        prop_assert_eq!(map.load_and_delete(&k), model.remove(&k));
                    }
                    Op::LoadOrStore(k, v) => {
                        let expected = match model.get(&k) {
                            Some(&existing) => (existing, true),
                            None => {
                                model.insert(k, v);
                                (v, false)
                            }
                        };
                        prop_assert_eq!(map.load_or_store(k, v), expected);
                    }
                    Op::Swap(k, v) => {
                        prop_assert_eq!(map.swap(k, v), model.insert(k, v));
                    }
                    Op::CompareAndSwap(k, old, new) => {
                        let expected = model.get(&k) == Some(&old);
                        if expected {
                            model.insert(k, new);
                        }
                        prop_assert_eq!(map.compare_and_swap(&k, &old, new), expected);
                    }
                    Op::CompareAndDelete(k, old) => {
                        let expected = model.get(&k) == Some(&old);
                        if expected {
                            model.remove(&k);
                        }
                        prop_assert_eq!(map.compare_and_delete(&k, &old), expected);
                    }
                    Op::Range => {
                        let mut visited = HashMap::new();
                        map.range(|k, v| {
                            assert!(visited.insert(*k, *v).is_none(), "key {} visited twice", k);
                            true
                        });
                        prop_assert_eq!(&visited, &model);
                    }
                    Op::Clear => {
                        map.clear();
                        model.clear();
                    }
                }
            }

            prop_assert_eq!(map.to_hash_map(), model);
        }

        #[test]
        fn test_round_trip_through_hash_map(
            entries in prop::collection::hash_map(any::<u32>(), any::<i64>(), 0..100)
        ) {
            let map = SyncMap::from(entries.clone());
            let exported = map.to_hash_map();
            prop_assert_eq!(&exported, &entries);

            let reimported = SyncMap::from(exported);
            prop_assert_eq!(reimported.to_hash_map(), entries);
        }

        #[test]
        fn test_range_stops_after_false(
            keys in prop::collection::hash_set(any::<u16>(), 1..50),
            stop_after in 1usize..50
        ) {
            let map: SyncMap<u16, ()> = keys.iter().map(|&k| (k, ())).collect();
            let mut calls = 0;
            map.range(|_, _| {
                calls += 1;
                calls < stop_after
            });
            prop_assert_eq!(calls, stop_after.min(keys.len()));
        }
    }
}

#[cfg(test)]
mod concurrent_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_one_load_or_store_survives(
            candidates in prop::collection::hash_set(any::<u32>(), 2..8)
        ) {
            let candidates: Vec<u32> = candidates.into_iter().collect();
            let map = Arc::new(SyncMap::new());
            let barrier = Arc::new(Barrier::new(candidates.len()));

            let handles: Vec<_> = candidates
                .iter()
                .map(|&candidate| {
                    let map = Arc::clone(&map);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        (candidate, map.load_or_store("key", candidate))
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let survivor = map.load("key").unwrap();

            let mut stored = 0;
            for (candidate, (value, loaded)) in results {
                if loaded {
                    prop_assert_eq!(value, survivor);
                } else {
                    stored += 1;
                    prop_assert_eq!(value, candidate);
                    prop_assert_eq!(candidate, survivor);
                }
            }
            prop_assert_eq!(stored, 1);
        }

        #[test]
        fn test_disjoint_writers_preserve_all_keys(
            batches in prop::collection::vec(
                prop::collection::hash_map(any::<u16>(), any::<u32>(), 1..40),
                2..5
            )
        ) {
            // Tag keys with their batch so writers never collide
            let map = Arc::new(SyncMap::new());
            let handles: Vec<_> = batches
                .iter()
                .cloned()
                .enumerate()
                .map(|(batch, entries)| {
                    let map = Arc::clone(&map);
                    thread::spawn(move || {
                        for (k, v) in entries {
                            map.store((batch, k), v);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let expected: HashMap<(usize, u16), u32> = batches
                .into_iter()
                .enumerate()
                .flat_map(|(batch, entries)| entries.into_iter().map(move |(k, v)| ((batch, k), v)))
                .collect();
            prop_assert_eq!(map.to_hash_map(), expected);
        }
    }
}
