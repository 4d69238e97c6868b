//! C4 - Switch-In Cache (spec §4.4).
//!
//! A bounded associative cache from a 64-bit FNV-1a fingerprint of the
//! trimmed input text to its analysis result. Capacity 64, oldest-first
//! eviction. Fingerprint collisions are accepted (spec: "a stale hit only
//! costs a slightly off-suggestion") - the production constructor uses
//! `Instant::now()`, the `_at` variant takes an explicit clock for tests,
//! following the same split the `venue-cache.rs` reference uses.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::model::AnalysisResult;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// 64-bit FNV-1a over the UTF-8 bytes of the trimmed text.
pub fn fingerprint(text: &str) -> u64 {
    let trimmed = text.trim();
    let mut hash = FNV_OFFSET_BASIS;
    for byte in trimmed.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

struct Entry {
    fingerprint: u64,
    result: AnalysisResult,
    #[allow(dead_code)] // kept for parity with spec §3's CacheEntry shape / future TTL use
    inserted_at: Instant,
}

/// Bounded cache keyed by text fingerprint.
pub struct SwitchInCache {
    capacity: usize,
    entries: HashMap<u64, Entry>,
    // Insertion order, for oldest-first eviction.
    order: VecDeque<u64>,
}

impl SwitchInCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn lookup(&self, text: &str) -> Option<AnalysisResult> {
        let fp = fingerprint(text);
        self.entries.get(&fp).map(|e| e.result.clone())
    }

    pub fn insert(&mut self, text: &str, result: AnalysisResult) {
        self.insert_at(text, result, Instant::now());
    }

    pub fn insert_at(&mut self, text: &str, result: AnalysisResult, now: Instant) {
        let fp = fingerprint(text);

        if self.entries.contains_key(&fp) {
            self.entries.insert(
                fp,
                Entry {
                    fingerprint: fp,
                    result,
                    inserted_at: now,
                },
            );
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(fp);
        self.entries.insert(
            fp,
            Entry {
                fingerprint: fp,
                result,
                inserted_at: now,
            },
        );
    }

    /// Force initialization of any lazy tables. A no-op placeholder here
    /// since the cache has no lazy internals, kept to satisfy the documented
    /// contract (spec §4.4) for callers that always prewarm on startup.
    pub fn prewarm(&mut self) {
        if self.entries.is_empty() {
            self.insert_at(
                "",
                AnalysisResult::default(),
                Instant::now(),
            );
            self.entries.remove(&fingerprint(""));
            self.order.retain(|fp| *fp != fingerprint(""));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(tag: &str) -> AnalysisResult {
        AnalysisResult {
            suggestion: Some(tag.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn fingerprint_is_deterministic_and_trims_whitespace() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_eq!(fingerprint("  hello  "), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("world"));
    }

    #[test]
    fn lookup_is_idempotent_between_inserts() {
        let mut cache = SwitchInCache::new(4);
        cache.insert("hi there", result("a"));
        let first = cache.lookup("hi there");
        let second = cache.lookup("hi there");
        assert_eq!(first.unwrap().suggestion, second.unwrap().suggestion);
    }

    #[test]
    fn capacity_overflow_evicts_oldest() {
        let mut cache = SwitchInCache::new(2);
        cache.insert("one", result("1"));
        cache.insert("two", result("2"));
        cache.insert("three", result("3"));
        assert!(cache.lookup("one").is_none());
        assert!(cache.lookup("two").is_some());
        assert!(cache.lookup("three").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinserting_existing_key_does_not_evict() {
        let mut cache = SwitchInCache::new(2);
        cache.insert("one", result("1"));
        cache.insert("two", result("2"));
        cache.insert("one", result("1-updated"));
        assert_eq!(cache.lookup("one").unwrap().suggestion, Some("1-updated".to_string()));
        assert_eq!(cache.lookup("two").unwrap().suggestion, Some("2".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn miss_returns_none() {
        let cache = SwitchInCache::new(4);
        assert!(cache.lookup("nothing here").is_none());
    }
}
