//! Result cache for completion sources
//!
//! Successful source results are remembered per lookup context so that a
//! source that fails or misses its deadline can still contribute what it
//! produced for a similar prefix. Keys are request scoped, so writes are plain
//! last-write-wins replacements and reads never block each other.

use crate::settings::CacheOptions;
use crate::types::Completion;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lookup context of a cached result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: String,
    /// Leading characters of the normalized prefix
    pub prefix: String,
    /// Present only for sources caching per filetype
    pub filetype: Option<String>,
}

impl CacheKey {
    pub fn new(source: &str, normalized_prefix: &str, filetype: Option<&str>, prefix_matches: usize) -> Self {
        Self {
            source: source.to_string(),
            prefix: normalized_prefix.chars().take(prefix_matches).collect(),
            filetype: filetype.map(str::to_string),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent completion cache
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<CacheKey, Vec<Completion>>,
    limit: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// `limit` bounds the completions kept per key
    pub fn new(limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_options(options: &CacheOptions) -> Self {
        Self::new(options.limit)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Completion>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `completions` under `key`, replacing any previous entry
    pub fn put(&self, key: CacheKey, mut completions: Vec<Completion>) {
        completions.truncate(self.limit);
        self.entries.insert(key, completions);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Vec<Completion>> {
        self.entries.remove(key).map(|(_, completions)| completions)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completions(words: &[&str]) -> Vec<Completion> {
        words.iter().map(|w| Completion::new(*w)).collect()
    }

    #[test]
    fn test_key_keeps_prefix_head() {
        let key = CacheKey::new("lsp", "printl", Some("rust"), 3);
        assert_eq!(key.prefix, "pri");
        assert_eq!(key, CacheKey::new("lsp", "prim", Some("rust"), 3));
        assert_ne!(key, CacheKey::new("lsp", "prim", Some("python"), 3));
        assert_ne!(key, CacheKey::new("lsp", "prim", None, 3));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = ResultCache::new(10);
        let key = CacheKey::new("lsp", "pri", None, 3);
        cache.put(key.clone(), completions(&["print"]));
        cache.put(key.clone(), completions(&["private"]));
        assert_eq!(cache.get(&key).unwrap(), completions(&["private"]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_limit_truncates() {
        let cache = ResultCache::new(2);
        let key = CacheKey::new("lsp", "p", None, 3);
        cache.put(key.clone(), completions(&["a", "b", "c"]));
        assert_eq!(cache.get(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_stats() {
        let cache = ResultCache::new(2);
        let key = CacheKey::new("lsp", "p", None, 3);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), completions(&["a"]));
        assert!(cache.get(&key).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_clear() {
        let cache = ResultCache::new(2);
        cache.put(CacheKey::new("lsp", "p", None, 3), completions(&["a"]));
        cache.clear();
        assert!(cache.is_empty());
    }
}
