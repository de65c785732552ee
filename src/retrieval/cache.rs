//! TTL and size bounded cache of retrieval results.

use super::retriever::{RetrievalOptions, RetrievedContext};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: RetrievedContext,
    inserted: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

pub struct RetrievalCache {
    state: RwLock<CacheState>,
    ttl: Duration,
    capacity: usize,
}

impl RetrievalCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
            capacity,
        }
    }

    /// Key over the quantized query vector and every option that shapes the result.
    pub fn fingerprint(query: &[f32], max_chunks: usize, options: &RetrievalOptions) -> String {
        let mut hasher = Sha256::new();
        for x in query {
            hasher.update(((x * 10_000.0).round() as i32).to_le_bytes());
        }
        hasher.update((max_chunks as u64).to_le_bytes());
        hasher.update(options.score_threshold.to_bits().to_le_bytes());
        hasher.update(options.diversity_factor.to_bits().to_le_bytes());
        hasher.update([options.multi_domain as u8]);
        for index in &options.indices {
            hasher.update(index.as_str().as_bytes());
            hasher.update([0]);
        }
        if let Some(query) = &options.query {
            hasher.update(query.complexity.to_bits().to_le_bytes());
            hasher.update(format!("{:?}", query.intent).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<RetrievedContext> {
        let state = self.state.read().ok()?;
        let entry = state.entries.get(key)?;
        if entry.inserted.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: String, value: RetrievedContext) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut state) = self.state.write() else {
            return;
        };

        let ttl = self.ttl;
        let CacheState { entries, order } = &mut *state;
        order.retain(|k| entries.get(k).is_some_and(|e| e.inserted.elapsed() <= ttl) && k != &key);
        entries.retain(|_, e| e.inserted.elapsed() <= ttl);

        entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted: Instant::now(),
            },
        );
        order.push_back(key);

        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                entries.remove(&oldest);
            }
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut state) = self.state.write() {
            state.entries.clear();
            state.order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievalStrategy;

    fn context(tag: f32) -> RetrievedContext {
        RetrievedContext {
            chunks: Vec::new(),
            aggregate_score: tag,
            elapsed: Duration::ZERO,
            query_vector: vec![tag],
            strategy: RetrievalStrategy::Balanced,
            cache_hit: false,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 4);
        assert!(cache.is_empty());
        cache.insert("k".to_string(), context(0.5));
        assert_eq!(cache.get("k").unwrap().aggregate_score, 0.5);
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), context(1.0));
        cache.insert("b".to_string(), context(2.0));
        cache.insert("c".to_string(), context(3.0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), context(1.0));
        cache.insert("b".to_string(), context(2.0));
        cache.insert("a".to_string(), context(1.5));
        cache.insert("c".to_string(), context(3.0));

        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").unwrap().aggregate_score, 1.5);
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache = RetrievalCache::new(Duration::ZERO, 4);
        cache.insert("a".to_string(), context(1.0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_fingerprint_depends_on_options() {
        let options = RetrievalOptions::default();
        let a = RetrievalCache::fingerprint(&[0.1, 0.2], 5, &options);
        let b = RetrievalCache::fingerprint(&[0.1, 0.2], 6, &options);
        let c = RetrievalCache::fingerprint(
            &[0.1, 0.2],
            5,
            &RetrievalOptions {
                score_threshold: 0.9,
                ..options.clone()
            },
        );
        assert_eq!(a, RetrievalCache::fingerprint(&[0.1, 0.2], 5, &options));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_invalidate_all() {
        let cache = RetrievalCache::new(Duration::from_secs(60), 4);
        cache.insert("a".to_string(), context(1.0));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
