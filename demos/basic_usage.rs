//! Basic usage example for syncmap
//!
//! Walks through every operation of `SyncMap`, then shares one map between
//! several threads.

use std::sync::Arc;
use std::thread;
use syncmap::{MapConfig, MetricsCollector, SyncMap};

fn main() {
    env_logger::init();

    println!("syncmap Basic Usage Example");
    println!("===========================");

    let map: SyncMap<String, i32> = SyncMap::new();

    println!("\n1. Store and Load:");
    map.store("apples".to_string(), 3);
    map.store("pears".to_string(), 5);
    println!("   apples = {:?}", map.load("apples"));
    println!("   plums = {:?}", map.load("plums"));

    println!("\n2. LoadOrStore:");
    let (value, loaded) = map.load_or_store("apples".to_string(), 100);
    println!("   apples -> ({}, loaded: {})", value, loaded);
    let (value, loaded) = map.load_or_store("plums".to_string(), 7);
    println!("   plums -> ({}, loaded: {})", value, loaded);

    println!("\n3. Swap:");
    let previous = map.swap("pears".to_string(), 6);
    println!("   pears swapped, previous = {:?}", previous);

    println!("\n4. CompareAndSwap / CompareAndDelete:");
    println!(
        "   CAS pears 5 -> 9: {}",
        map.compare_and_swap("pears", &5, 9)
    );
    println!(
        "   CAS pears 6 -> 9: {}",
        map.compare_and_swap("pears", &6, 9)
    );
    println!(
        "   CAD plums if 8: {}",
        map.compare_and_delete("plums", &8)
    );
    println!(
        "   CAD plums if 7: {}",
        map.compare_and_delete("plums", &7)
    );

    println!("\n5. LoadAndDelete / Delete:");
    println!("   take apples = {:?}", map.load_and_delete("apples"));
    println!("   take apples again = {:?}", map.load_and_delete("apples"));
    map.delete("nothing here");

    println!("\n6. Range:");
    for (fruit, count) in [("kiwis", 2), ("limes", 4), ("mangos", 8)] {
        map.store(fruit.to_string(), count);
    }
    map.range(|key, value| {
        println!("   {} => {}", key, value);
        true
    });
    println!("   {:?}", map);

    println!("\n7. Shared Between Threads:");
    let counters = Arc::new(SyncMap::with_config(MapConfig::default().with_metrics(true)));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let counters = Arc::clone(&counters);
            thread::spawn(move || {
                for i in 0..1000 {
                    let bucket = i % 10;
                    loop {
                        let (current, _) = counters.load_or_store(bucket, 0u64);
                        if counters.compare_and_swap(&bucket, &current, current + 1) {
                            break;
                        }
                    }
                }
                println!("   worker {} done", worker);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let total: u64 = counters.values().iter().sum();
    println!("   buckets: {}", counters.count());
    println!("   total increments: {}", total);

    let metrics = counters.metrics();
    println!("   operations: {}", metrics.total_operations);
    println!("   hit rate: {:.2}%", metrics.hit_rate());
    println!("   slow path rate: {:.2}%", metrics.slow_path_rate());
    println!("   promotions: {}", metrics.promotions);
}
