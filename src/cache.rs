//! Snapshot cache.
//!
//! [`Cache`] is the collaborator interface the aggregator stores snapshots
//! in; [`MemoryCache`] is the in-process implementation. Entries carry a
//! TTL given as a duration string (`"1h"`, `"30m"`, `"1h30m"`, `"250ms"`)
//! and expire lazily: an expired entry is dropped when it is read, or by an
//! explicit [`MemoryCache::cleanup`] pass. There is no background sweeper.
//!
//! When an insert would exceed capacity, expired entries are dropped first;
//! if the cache is still full, one entry is evicted according to the
//! [`EvictionPolicy`].

use crate::error::StatError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache collaborator used by the aggregator.
pub trait Cache<V>: Send + Sync {
    /// Return a live entry, counting a hit or a miss.
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace an entry that expires after `ttl`.
    fn set(&self, key: &str, value: V, ttl: &str) -> Result<(), StatError>;

    /// Remove an entry. Missing keys are an error.
    fn delete(&self, key: &str) -> Result<(), StatError>;

    /// Remove every entry and reset statistics.
    fn clear(&self);

    fn stats(&self) -> CacheStats;
}

/// Which entry to drop when the cache is full.
///
/// Every entry in [`MemoryCache`] has a TTL, so every entry is "volatile":
/// `VolatileLru` and `VolatileLfu` behave exactly like `AllKeysLru` and
/// `AllKeysLfu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Least recently accessed entry.
    #[default]
    AllkeysLru,
    /// Least frequently accessed entry, then least recently accessed.
    AllkeysLfu,
    VolatileLru,
    VolatileLfu,
    /// Entry closest to expiry.
    VolatileTtl,
    /// Refuse inserts with `StatError::CacheFull`.
    #[serde(rename = "noeviction")]
    NoEviction,
}

impl EvictionPolicy {
    pub const ALL: [EvictionPolicy; 6] = [
        EvictionPolicy::AllkeysLru,
        EvictionPolicy::AllkeysLfu,
        EvictionPolicy::VolatileLru,
        EvictionPolicy::VolatileLfu,
        EvictionPolicy::VolatileTtl,
        EvictionPolicy::NoEviction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EvictionPolicy::AllkeysLru => "allkeys-lru",
            EvictionPolicy::AllkeysLfu => "allkeys-lfu",
            EvictionPolicy::VolatileLru => "volatile-lru",
            EvictionPolicy::VolatileLfu => "volatile-lfu",
            EvictionPolicy::VolatileTtl => "volatile-ttl",
            EvictionPolicy::NoEviction => "noeviction",
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lru" => Ok(EvictionPolicy::AllkeysLru),
            "lfu" => Ok(EvictionPolicy::AllkeysLfu),
            other => EvictionPolicy::ALL
                .into_iter()
                .find(|policy| policy.as_str() == other)
                .ok_or_else(|| StatError::unknown("eviction policy", other)),
        }
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
    /// Rough estimate in bytes of keys plus entry slots.
    pub memory_usage: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Occupancy as a percentage of `max_size`.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        self.size as f64 / self.max_size as f64 * 100.0
    }
}

/// Parse a duration string such as `"1h"`, `"1h30m"`, `"1.5s"` or `"250ms"`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. The duration must be
/// positive.
///
/// # Examples
///
/// ```rust
/// use actorstat::cache::parse_ttl;
/// use std::time::Duration;
///
/// assert_eq!(parse_ttl("1h").unwrap(), Duration::from_secs(3600));
/// assert_eq!(parse_ttl("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_ttl("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_ttl("1.5s").unwrap(), Duration::from_millis(1500));
/// assert!(parse_ttl("10").is_err());
/// assert!(parse_ttl("-5s").is_err());
/// ```
pub fn parse_ttl(ttl: &str) -> Result<Duration, StatError> {
    let invalid = || StatError::InvalidTtl(ttl.to_string());
    let mut rest = ttl.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let amount: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += amount * nanos_per_unit;
    }

    if !(total_nanos >= 1.0 && total_nanos < u64::MAX as f64) {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_access: AtomicU64,
    access_count: AtomicU64,
}

impl<V> Entry<V> {
    fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process TTL cache with a fixed capacity.
///
/// # Examples
///
/// ```rust
/// use actorstat::cache::{Cache, EvictionPolicy, MemoryCache};
///
/// let cache: MemoryCache<u32> = MemoryCache::new(2, EvictionPolicy::AllkeysLru);
/// cache.set("a", 1, "1h").unwrap();
/// cache.set("b", 2, "1h").unwrap();
/// assert_eq!(cache.get("a"), Some(1));
///
/// // "b" is now the least recently used entry.
/// cache.set("c", 3, "1h").unwrap();
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.stats().evictions, 1);
/// ```
pub struct MemoryCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    max_size: usize,
    policy: EvictionPolicy,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone + Send + Sync> MemoryCache<V> {
    /// Create a cache holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
            policy,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// `true` if a live entry exists. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Keys of live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "cache cleanup");
        }
        removed
    }

    /// Zero the hit, miss and eviction counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    fn select_victim(&self, entries: &HashMap<String, Entry<V>>) -> Option<String> {
        let recency = |entry: &Entry<V>| entry.last_access.load(Ordering::Relaxed);
        let frequency = |entry: &Entry<V>| entry.access_count.load(Ordering::Relaxed);
        let victim = match self.policy {
            EvictionPolicy::NoEviction => None,
            EvictionPolicy::AllkeysLru | EvictionPolicy::VolatileLru => {
                entries.iter().min_by_key(|(_, entry)| recency(entry))
            }
            EvictionPolicy::AllkeysLfu | EvictionPolicy::VolatileLfu => entries
                .iter()
                .min_by_key(|(_, entry)| (frequency(entry), recency(entry))),
            EvictionPolicy::VolatileTtl => entries
                .iter()
                .min_by_key(|(_, entry)| (entry.expires_at, recency(entry))),
        };
        victim.map(|(key, _)| key.clone())
    }

    fn make_room(&self, entries: &mut HashMap<String, Entry<V>>) -> Result<(), StatError> {
        if entries.len() < self.max_size {
            return Ok(());
        }
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        if entries.len() < self.max_size {
            return Ok(());
        }
        match self.select_victim(entries) {
            Some(key) => {
                entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, policy = %self.policy, "evicted cache entry");
                Ok(())
            }
            None => Err(StatError::CacheFull {
                max_size: self.max_size,
            }),
        }
    }
}

impl<V: Clone + Send + Sync> Cache<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    entry.touch(self.tick());
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn set(&self, key: &str, value: V, ttl: &str) -> Result<(), StatError> {
        if key.is_empty() {
            return Err(StatError::InvalidInput(
                "cache key cannot be empty".to_string(),
            ));
        }
        let ttl = parse_ttl(ttl)?;

        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            self.make_room(&mut entries)?;
        }
        let tick = self.tick();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                last_access: AtomicU64::new(tick),
                access_count: AtomicU64::new(0),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StatError> {
        match self.entries.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(StatError::CacheKeyNotFound(key.to_string())),
        }
    }

    fn clear(&self) {
        self.entries.write().clear();
        self.reset_stats();
    }

    fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let key_bytes: usize = entries.keys().map(String::len).sum();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: entries.len(),
            max_size: self.max_size,
            memory_usage: key_bytes + entries.len() * std::mem::size_of::<Entry<V>>(),
        }
    }
}
