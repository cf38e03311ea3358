//! Benchmarks for SyncMap
//!
//! Compares `SyncMap` against `Mutex<HashMap>` and `RwLock<HashMap>` on the
//! workloads the map is tuned for (read-mostly, disjoint writers) and on a
//! write-heavy workload where it is expected to lose.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex, RwLock};
use std::thread;
use std::time::Duration;
use syncmap::SyncMap;

const KEY_SPACE: usize = 1_024;
const OPERATIONS_PER_THREAD: usize = 50_000;

fn warm_sync_map() -> SyncMap<usize, usize> {
    let map = SyncMap::with_capacity(KEY_SPACE);
    for i in 0..KEY_SPACE {
        map.store(i, i * 2);
    }
    // Enough misses to move everything into the read tier
    for i in 0..KEY_SPACE {
        black_box(map.load(&i));
    }
    map
}

fn filled_hash_map() -> HashMap<usize, usize> {
    (0..KEY_SPACE).map(|i| (i, i * 2)).collect()
}

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_map_single_thread");

    let map = warm_sync_map();
    group.bench_function("sync_map_load", |b| {
        b.iter(|| {
            for i in 0..KEY_SPACE {
                black_box(map.load(black_box(&i)));
            }
        })
    });

    let locked = Mutex::new(filled_hash_map());
    group.bench_function("mutex_hashmap_get", |b| {
        b.iter(|| {
            for i in 0..KEY_SPACE {
                black_box(locked.lock().unwrap().get(black_box(&i)).copied());
            }
        })
    });

    group.bench_function("sync_map_store_new_keys", |b| {
        b.iter(|| {
            let map = SyncMap::new();
            for i in 0..KEY_SPACE {
                map.store(black_box(i), i);
            }
            map
        })
    });

    group.bench_function("sync_map_compare_and_swap", |b| {
        let map = warm_sync_map();
        b.iter(|| {
            for i in 0..KEY_SPACE {
                let current = map.load(&i).unwrap_or(0);
                black_box(map.compare_and_swap(&i, &current, current + 1));
            }
        })
    });

    let map = warm_sync_map();
    group.bench_function("sync_map_range", |b| {
        b.iter(|| {
            let mut sum = 0;
            map.range(|_, v| {
                sum += *v;
                true
            });
            black_box(sum)
        })
    });

    group.finish();
}

fn bench_read_mostly(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_map_read_mostly");
    group.measurement_time(Duration::from_secs(10));

    for &num_threads in [2, 4, 8].iter() {
        let operations_per_thread = OPERATIONS_PER_THREAD / num_threads;

        group.bench_with_input(
            BenchmarkId::new("sync_map", num_threads),
            &num_threads,
            |b, &num_threads| {
                let map = Arc::new(warm_sync_map());
                b.iter(|| {
                    let barrier = Arc::new(Barrier::new(num_threads));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let map = Arc::clone(&map);
                            let barrier = Arc::clone(&barrier);
                            thread::spawn(move || {
                                barrier.wait();
                                for i in 0..operations_per_thread {
                                    let key = (thread_id + i) % KEY_SPACE;
                                    // One write in a hundred
                                    if i % 100 == 0 {
                                        map.store(key, i);
                                    } else {
                                        black_box(map.load(&key));
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("rwlock_hashmap", num_threads),
            &num_threads,
            |b, &num_threads| {
                let map = Arc::new(RwLock::new(filled_hash_map()));
                b.iter(|| {
                    let barrier = Arc::new(Barrier::new(num_threads));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let map = Arc::clone(&map);
                            let barrier = Arc::clone(&barrier);
                            thread::spawn(move || {
                                barrier.wait();
                                for i in 0..operations_per_thread {
                                    let key = (thread_id + i) % KEY_SPACE;
                                    if i % 100 == 0 {
                                        map.write().unwrap().insert(key, i);
                                    } else {
                                        black_box(map.read().unwrap().get(&key).copied());
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_disjoint_writers(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_map_disjoint_writers");
    group.measurement_time(Duration::from_secs(10));

    for &num_threads in [2, 4, 8].iter() {
        let keys_per_thread = KEY_SPACE / num_threads;

        group.bench_with_input(
            BenchmarkId::new("sync_map", num_threads),
            &num_threads,
            |b, &num_threads| {
                let map = Arc::new(warm_sync_map());
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let base = thread_id * keys_per_thread;
                                for round in 0..50 {
                                    for key in base..base + keys_per_thread {
                                        map.store(key, round);
                                        black_box(map.load(&key));
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex_hashmap", num_threads),
            &num_threads,
            |b, &num_threads| {
                let map = Arc::new(Mutex::new(filled_hash_map()));
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let base = thread_id * keys_per_thread;
                                for round in 0..50 {
                                    for key in base..base + keys_per_thread {
                                        map.lock().unwrap().insert(key, round);
                                        black_box(map.lock().unwrap().get(&key).copied());
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    // Fresh keys on every iteration keep the map on its locked path
    let mut group = c.benchmark_group("sync_map_churn");

    for &num_threads in [2, 4].iter() {
        let operations_per_thread = OPERATIONS_PER_THREAD / 10 / num_threads;

        group.bench_with_input(
            BenchmarkId::new("sync_map", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let map = Arc::new(SyncMap::new());
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..operations_per_thread {
                                    let key = thread_id * operations_per_thread + i;
                                    black_box(map.load_or_store(key, i));
                                    black_box(map.load_and_delete(&key));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex_hashmap", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let map = Arc::new(Mutex::new(HashMap::new()));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..operations_per_thread {
                                    let key = thread_id * operations_per_thread + i;
                                    black_box(*map.lock().unwrap().entry(key).or_insert(i));
                                    black_box(map.lock().unwrap().remove(&key));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread,
    bench_read_mostly,
    bench_disjoint_writers,
    bench_churn
);

criterion_main!(benches);
