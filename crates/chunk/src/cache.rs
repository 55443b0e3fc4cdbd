// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Parsed-template caching.
//!
//! [`TemplateCache`] keeps parsed templates keyed by a SHA-256 digest of
//! their source and the parse options, so unchanged sources are parsed
//! once.
//!
//! # Eviction
//!
//! Entries are bounded by an LRU capacity and carry a last-access time.
//! There is no background thread: every `sweep_every` misses the cache runs
//! [`TemplateCache::maybe_evict`], which drops entries idle for longer than
//! the configured TTL. Callers may also run it themselves.

use crate::ast::Template;
use crate::config::{CacheConfig, ParseOptions};
use crate::error::{ChunkError, Result};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CacheEntry {
    template: Arc<Template>,
    last_access: Instant,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, CacheEntry>,
    misses: u64,
}

/// Thread-safe LRU cache of parsed templates.
///
/// Clones share the same storage.
///
/// # Examples
///
/// ```rust
/// use chunk::{CacheConfig, ParseOptions, TemplateCache};
///
/// let cache = TemplateCache::new(&CacheConfig::default());
/// let options = ParseOptions::default();
/// let first = cache.get_or_parse("Hi {~name}", &options).unwrap();
/// let second = cache.get_or_parse("Hi {~name}", &options).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
#[derive(Debug, Clone)]
pub struct TemplateCache {
    state: Arc<Mutex<CacheState>>,
    ttl: Duration,
    sweep_every: u64,
}

impl TemplateCache {
    /// Creates a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                misses: 0,
            })),
            ttl: config.ttl(),
            sweep_every: config.sweep_every,
        }
    }

    /// Creates a cache with the given capacity and default eviction settings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(&CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| ChunkError::CacheError("Failed to acquire cache lock".to_string()))
    }

    /// Returns the cached template for `source`, parsing it on a miss.
    pub fn get_or_parse(&self, source: &str, options: &ParseOptions) -> Result<Arc<Template>> {
        let key = cache_key(source, options);
        if let Some(template) = self.get(&key)? {
            tracing::trace!("template cache hit {}", &key[..12]);
            return Ok(template);
        }

        let template = Arc::new(Template::parse_with(source, options));
        let mut state = self.lock()?;
        state.misses += 1;
        tracing::debug!("template cache miss {} ({} misses)", &key[..12], state.misses);
        state.entries.put(
            key,
            CacheEntry {
                template: Arc::clone(&template),
                last_access: Instant::now(),
            },
        );
        if self.sweep_every > 0 && state.misses % self.sweep_every == 0 {
            evict_idle(&mut state, Instant::now(), self.ttl);
        }
        Ok(template)
    }

    /// Looks up a template by cache key, refreshing its access time.
    pub fn get(&self, key: &str) -> Result<Option<Arc<Template>>> {
        let mut state = self.lock()?;
        Ok(state.entries.get_mut(key).map(|entry| {
            entry.last_access = Instant::now();
            Arc::clone(&entry.template)
        }))
    }

    /// Stores a template under a cache key.
    pub fn insert(&self, key: &str, template: Arc<Template>) -> Result<()> {
        let mut state = self.lock()?;
        state.entries.put(
            key.to_string(),
            CacheEntry {
                template,
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    /// Removes an entry.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.entries.pop(key);
        Ok(())
    }

    /// Drops every entry.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.entries.clear();
        state.misses = 0;
        Ok(())
    }

    /// Checks if a key exists in the cache.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().map_or(false, |state| state.entries.contains(key))
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.entries.len())
    }

    /// Whether the cache holds no templates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries idle for longer than the TTL as of `now`.
    ///
    /// Returns the number of evicted entries.
    pub fn maybe_evict(&self, now: Instant) -> Result<usize> {
        let mut state = self.lock()?;
        Ok(evict_idle(&mut state, now, self.ttl))
    }
}

fn evict_idle(state: &mut CacheState, now: Instant, ttl: Duration) -> usize {
    let stale: Vec<String> = state
        .entries
        .iter()
        .filter(|(_, entry)| now.saturating_duration_since(entry.last_access) > ttl)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &stale {
        state.entries.pop(key);
    }
    if !stale.is_empty() {
        tracing::debug!("evicted {} idle templates", stale.len());
    }
    stale.len()
}

/// Cache key for a source string parsed with `options`.
pub fn cache_key(source: &str, options: &ParseOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(format!("trim={};depth={}", options.smart_trim, options.max_depth).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_cache() {
        let cache = TemplateCache::with_capacity(10);
        let template = Arc::new(Template::parse("{~x}"));

        cache.insert("test", template.clone()).unwrap();
        let retrieved = cache.get("test").unwrap().unwrap();
        assert_eq!(*retrieved, *template);

        assert!(cache.contains_key("test"));
        assert!(!cache.contains_key("nonexistent"));

        cache.remove("test").unwrap();
        assert!(!cache.contains_key("test"));
        assert!(cache.get("test").unwrap().is_none());
    }

    #[test]
    fn test_get_or_parse_reuses_entries() {
        let cache = TemplateCache::with_capacity(10);
        let options = ParseOptions::default();
        let a = cache.get_or_parse("{^if (~a)}x{/if}", &options).unwrap();
        let b = cache.get_or_parse("{^if (~a)}x{/if}", &options).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let untrimmed = ParseOptions {
            smart_trim: false,
            ..ParseOptions::default()
        };
        let c = cache.get_or_parse("{^if (~a)}x{/if}", &untrimmed).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_capacity() {
        let cache = TemplateCache::with_capacity(2);
        let options = ParseOptions::default();
        for source in ["a", "b", "c"] {
            cache.get_or_parse(source, &options).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key(&cache_key("a", &options)));
    }

    #[test]
    fn test_maybe_evict_drops_idle_entries() {
        let cache = TemplateCache::new(&CacheConfig {
            ttl_secs: 60,
            ..CacheConfig::default()
        });
        let options = ParseOptions::default();
        cache.get_or_parse("one", &options).unwrap();
        cache.get_or_parse("two", &options).unwrap();

        assert_eq!(cache.maybe_evict(Instant::now()).unwrap(), 0);
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(cache.maybe_evict(later).unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_runs_on_misses() {
        let cache = TemplateCache::new(&CacheConfig {
            ttl_secs: 0,
            sweep_every: 2,
            ..CacheConfig::default()
        });
        let options = ParseOptions::default();
        cache.get_or_parse("one", &options).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.get_or_parse("two", &options).unwrap();
        assert!(!cache.contains_key(&cache_key("one", &options)));
    }

    #[test]
    fn test_cache_key_generation() {
        let options = ParseOptions::default();
        let key1 = cache_key("hello", &options);
        let key2 = cache_key("hello", &options);
        let key3 = cache_key("world", &options);

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert_eq!(key1.len(), 64);

        let key4 = cache_key(
            "hello",
            &ParseOptions {
                max_depth: 4,
                ..ParseOptions::default()
            },
        );
        assert_ne!(key1, key4);
    }

    #[test]
    fn test_shared_between_threads() {
        let cache = TemplateCache::with_capacity(8);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let source = format!("{{~v{}}}", i % 2);
                    cache.get_or_parse(&source, &ParseOptions::default()).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
