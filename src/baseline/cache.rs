//! Baseline result cache: keyed by `(repo_id, canonical_path,
//! graph_generation)` so a cached result is automatically invalidated the
//! moment the graph changes underneath it, with a wall-clock TTL on top for
//! long-lived generations. The `repo_id` component keeps two repositories
//! that happen to reuse the same canonical path (and the same starting
//! generation counter, since every fresh `PropertyGraph` starts at 0) from
//! reading each other's cached result. `dashmap` gives lock-free concurrent
//! reads across however many parallel investigations are running; `lru-mem`
//! bounds the cache by memory rather than entry count, since `BaselineResult`
//! sizes vary with a file's metric evidence.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru_mem::LruCache;
use std::sync::Mutex;

use super::BaselineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub repo_id: i64,
    pub graph_generation: u64,
}

struct Entry {
    result: BaselineResult,
    inserted_at: Instant,
}

/// Per-generation LRU of path → result, behind a `DashMap` so distinct
/// generations (rare — one per graph rebuild) don't contend with each
/// other, while reads/writes within a generation go through the LRU's own
/// lock.
pub struct BaselineCache {
    ttl: Duration,
    generations: DashMap<(i64, u64), Mutex<LruCache<String, Entry>>>,
    max_bytes_per_generation: usize,
}

impl BaselineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generations: DashMap::new(),
            max_bytes_per_generation: 16 * 1024 * 1024,
        }
    }

    pub fn get(&self, key: CacheKey, canonical_path: &str) -> Option<BaselineResult> {
        let generation = self.generations.get(&(key.repo_id, key.graph_generation))?;
        let mut lru = generation.lock().expect("baseline cache lock poisoned");
        let entry = lru.get(canonical_path)?;
        if entry.inserted_at.elapsed() > self.ttl {
            lru.remove(canonical_path);
            return None;
        }
        Some(entry.result.clone())
    }

    pub fn put(&self, key: CacheKey, canonical_path: String, result: BaselineResult) {
        let generation = self
            .generations
            .entry((key.repo_id, key.graph_generation))
            .or_insert_with(|| Mutex::new(LruCache::new(self.max_bytes_per_generation)));
        let mut lru = generation.lock().expect("baseline cache lock poisoned");
        let _ = lru.insert(
            canonical_path,
            Entry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }
}

impl lru_mem::HeapSize for Entry {
    fn heap_size(&self) -> usize {
        self.result.metrics.len() * std::mem::size_of::<super::MetricEvidence>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::RiskLevel;

    fn sample() -> BaselineResult {
        BaselineResult {
            canonical_path: "a.go".into(),
            metrics: Vec::new(),
            risk_level: RiskLevel::Low,
            confidence: 0.8,
            escalate_to_agent: false,
        }
    }

    #[test]
    fn put_then_get_returns_the_same_generation_entry() {
        let cache = BaselineCache::new(Duration::from_secs(60));
        let key = CacheKey { repo_id: 1, graph_generation: 1 };
        cache.put(key, "a.go".into(), sample());
        let hit = cache.get(key, "a.go");
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().canonical_path, "a.go");
    }

    #[test]
    fn different_generation_is_a_miss() {
        let cache = BaselineCache::new(Duration::from_secs(60));
        cache.put(CacheKey { repo_id: 1, graph_generation: 1 }, "a.go".into(), sample());
        let miss = cache.get(CacheKey { repo_id: 1, graph_generation: 2 }, "a.go");
        assert!(miss.is_none());
    }

    #[test]
    fn same_generation_different_repo_is_a_miss() {
        let cache = BaselineCache::new(Duration::from_secs(60));
        cache.put(CacheKey { repo_id: 1, graph_generation: 0 }, "a.go".into(), sample());
        let miss = cache.get(CacheKey { repo_id: 2, graph_generation: 0 }, "a.go");
        assert!(miss.is_none());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = BaselineCache::new(Duration::from_millis(1));
        let key = CacheKey { repo_id: 1, graph_generation: 1 };
        cache.put(key, "a.go".into(), sample());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(key, "a.go").is_none());
    }
}
