//! Session registry example
//!
//! A read-mostly registry of user sessions shared by request handlers and a
//! background sweeper. Handlers create sessions with `load_or_store`, bump
//! their request counters with `compare_and_swap`, and the sweeper evicts
//! idle sessions with `compare_and_delete` so a session touched in the
//! meantime is never lost.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use syncmap::{MapConfig, MetricsCollector, SyncMap};

#[derive(Debug, Clone, PartialEq)]
struct Session {
    user: String,
    requests: u64,
    last_seen: Instant,
}

impl Session {
    fn new(user: String) -> Self {
        Self {
            user,
            requests: 0,
            last_seen: Instant::now(),
        }
    }

    fn touched(&self) -> Self {
        Self {
            user: self.user.clone(),
            requests: self.requests + 1,
            last_seen: Instant::now(),
        }
    }

    fn is_idle(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() > ttl
    }
}

#[derive(Debug, Default)]
struct HandlerStats {
    created: AtomicU64,
    resumed: AtomicU64,
    retries: AtomicU64,
}

struct SessionRegistry {
    sessions: SyncMap<u64, Session>,
    stats: HandlerStats,
    ttl: Duration,
}

impl SessionRegistry {
    fn new(ttl: Duration) -> Self {
        Self {
            sessions: SyncMap::with_config(
                MapConfig::default()
                    .with_initial_capacity(256)
                    .with_metrics(true),
            ),
            stats: HandlerStats::default(),
            ttl,
        }
    }

    /// Record one request for `session_id`, creating the session if needed
    fn handle_request(&self, session_id: u64) -> u64 {
        loop {
            let fresh = Session::new(format!("user-{}", session_id % 97));
            let (current, loaded) = self.sessions.load_or_store(session_id, fresh);
            if loaded {
                self.stats.resumed.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
            }

            let next = current.touched();
            if self.sessions.compare_and_swap(&session_id, &current, next.clone()) {
                return next.requests;
            }
            // Touched by another handler or evicted by the sweeper
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evict sessions that have been idle longer than the TTL
    fn sweep(&self) -> usize {
        let mut idle = Vec::new();
        self.sessions.range(|id, session| {
            if session.is_idle(self.ttl) {
                idle.push((*id, session.clone()));
            }
            true
        });

        idle.into_iter()
            .filter(|(id, session)| {
                let evicted = self.sessions.compare_and_delete(id, session);
                if evicted {
                    debug!("evicted session {} of {}", id, session.user);
                }
                evicted
            })
            .count()
    }

    fn start_sweeper(registry: &Arc<Self>, running: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
        let registry = Arc::clone(registry);
        thread::spawn(move || {
            let mut evicted = 0;
            while running.load(Ordering::Relaxed) {
                evicted += registry.sweep();
                thread::sleep(registry.ttl / 2);
            }
            evicted
        })
    }
}

fn main() {
    env_logger::init();

    println!("Session Registry Example");
    println!("========================");

    let num_handlers = 4;
    let requests_per_handler = 20_000;
    let active_sessions = 512u64;
    let ttl = Duration::from_millis(20);

    println!("Configuration:");
    println!("  Handler threads: {}", num_handlers);
    println!("  Requests per handler: {}", requests_per_handler);
    println!("  Active sessions: {}", active_sessions);
    println!("  Session TTL: {:?}\n", ttl);

    let registry = Arc::new(SessionRegistry::new(ttl));
    let running = Arc::new(AtomicBool::new(true));
    let sweeper = SessionRegistry::start_sweeper(&registry, Arc::clone(&running));

    let start = Instant::now();
    let handlers: Vec<_> = (0..num_handlers)
        .map(|handler| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut busiest = 0;
                for i in 0..requests_per_handler {
                    // Most traffic goes to a small set of hot sessions
                    let session_id = if i % 10 == 0 {
                        (handler * requests_per_handler + i) as u64 % (active_sessions * 8)
                    } else {
                        i as u64 % active_sessions
                    };
                    busiest = busiest.max(registry.handle_request(session_id));
                }
                busiest
            })
        })
        .collect();

    let busiest = handlers
        .into_iter()
        .map(|h| h.join().expect("handler panicked"))
        .max()
        .unwrap_or(0);
    let elapsed = start.elapsed();

    running.store(false, Ordering::Relaxed);
    let evicted = sweeper.join().expect("sweeper panicked");
    info!("sweeper stopped after evicting {} sessions", evicted);

    let total_requests = num_handlers * requests_per_handler;
    println!("Results:");
    println!("  Total requests: {}", total_requests);
    println!("  Elapsed time: {:?}", elapsed);
    println!(
        "  Requests per second: {:.0}",
        total_requests as f64 / elapsed.as_secs_f64()
    );

    println!("\nRegistry:");
    println!("  Sessions created: {}", registry.stats.created.load(Ordering::Relaxed));
    println!("  Sessions resumed: {}", registry.stats.resumed.load(Ordering::Relaxed));
    println!("  Update retries: {}", registry.stats.retries.load(Ordering::Relaxed));
    println!("  Sessions evicted: {}", evicted);
    println!("  Live sessions: {}", registry.sessions.count());
    println!("  Busiest session: {} requests", busiest);

    let metrics = registry.sessions.metrics();
    println!("\nMap Metrics:");
    println!("  Operations: {}", metrics.total_operations);
    println!("  Hit rate: {:.2}%", metrics.hit_rate());
    println!("  Slow path rate: {:.2}%", metrics.slow_path_rate());
    println!("  Promotions: {}", metrics.promotions);
    println!("  Average operation time: {:?}", metrics.avg_operation_time());
    println!("  Max operation time: {:?}", metrics.max_operation_time());
}
