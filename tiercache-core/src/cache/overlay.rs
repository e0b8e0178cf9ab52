//! In-memory overlay holding decoded values
//!
//! The overlay is a pure cache of the persistent store: entries can be
//! evicted or cleared at any time without losing data.

use crate::cache::eviction::{EvictionCandidate, EvictionPolicy};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct OverlayEntry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
    last_access: u64,
    access_count: u64,
}

impl<V> OverlayEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    fn candidate(&self) -> EvictionCandidate {
        EvictionCandidate {
            last_access: self.last_access,
            access_count: self.access_count,
            expires_at: self.expires_at,
        }
    }
}

/// Bounded overlay using DashMap for concurrent access
pub struct MemoryOverlay<V> {
    entries: DashMap<String, OverlayEntry<V>>,
    /// Maximum number of entries (0 disables the overlay)
    capacity: usize,
    policy: EvictionPolicy,
    /// Logical clock for recency
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> MemoryOverlay<V> {
    /// Create a new overlay
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            policy,
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Get a live value
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();

        let expired = match self.entries.get_mut(key) {
            None => return None,
            Some(mut entry) => {
                if entry.is_expired(now) {
                    true
                } else {
                    entry.last_access = self.tick();
                    entry.access_count += 1;
                    return Some(entry.value.clone());
                }
            }
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    /// Check for a live value without touching recency
    pub fn contains(&self, key: &str) -> bool {
        let now = Utc::now();
        self.entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired(now))
    }

    /// Insert or replace a value
    pub fn insert(&self, key: String, value: V, expires_at: Option<DateTime<Utc>>) {
        if self.capacity == 0 {
            return;
        }

        if self.policy == EvictionPolicy::NoEviction
            && self.entries.len() >= self.capacity
            && !self.entries.contains_key(&key)
        {
            return;
        }

        let entry = OverlayEntry {
            value,
            expires_at,
            last_access: self.tick(),
            access_count: 1,
        };
        self.entries.insert(key, entry);

        if self.entries.len() > self.capacity {
            self.evict_overflow();
        }
    }

    /// Remove a value
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired entries, returning how many were dropped
    pub fn remove_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including expired ones not yet dropped
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted by the policy so far
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn evict_overflow(&self) {
        self.remove_expired();

        let len = self.entries.len();
        if len <= self.capacity {
            return;
        }

        // Evict a little past the bound so a full overlay does not rescan on every insert
        let count = (len - self.capacity + self.capacity / 16).min(len);
        let candidates: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().candidate()))
            .collect();

        let victims = self.policy.select_victims(candidates, count);
        let mut evicted = 0u64;
        for key in victims {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        tracing::trace!(evicted, capacity = self.capacity, "Overlay evicted entries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_insert_get_remove() {
        let overlay = MemoryOverlay::new(8, EvictionPolicy::LRU);

        overlay.insert("key".to_string(), 1u32, None);
        assert_eq!(overlay.get("key"), Some(1));
        assert!(overlay.contains("key"));

        overlay.insert("key".to_string(), 2u32, None);
        assert_eq!(overlay.get("key"), Some(2));
        assert_eq!(overlay.len(), 1);

        assert!(overlay.remove("key"));
        assert!(!overlay.remove("key"));
        assert_eq!(overlay.get("key"), None);
    }

    #[test]
    fn test_lru_keeps_recently_read_entries() {
        let overlay = MemoryOverlay::new(3, EvictionPolicy::LRU);

        overlay.insert("a".to_string(), 1u32, None);
        overlay.insert("b".to_string(), 2u32, None);
        overlay.insert("c".to_string(), 3u32, None);
        assert_eq!(overlay.get("a"), Some(1));

        overlay.insert("d".to_string(), 4u32, None);

        assert_eq!(overlay.len(), 3);
        assert_eq!(overlay.get("b"), None);
        assert_eq!(overlay.get("a"), Some(1));
        assert_eq!(overlay.get("d"), Some(4));
        assert_eq!(overlay.evictions(), 1);
    }

    #[test]
    fn test_expired_entries_are_not_returned() {
        let overlay = MemoryOverlay::new(8, EvictionPolicy::LRU);

        overlay.insert("gone".to_string(), 1u32, Some(Utc::now() - Duration::seconds(1)));
        overlay.insert("live".to_string(), 2u32, Some(Utc::now() + Duration::seconds(60)));

        assert!(!overlay.contains("gone"));
        assert_eq!(overlay.get("gone"), None);
        assert_eq!(overlay.get("live"), Some(2));
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_remove_expired() {
        let overlay = MemoryOverlay::new(8, EvictionPolicy::TTL);

        overlay.insert("a".to_string(), 1u32, Some(Utc::now() - Duration::seconds(1)));
        overlay.insert("b".to_string(), 2u32, Some(Utc::now() - Duration::seconds(1)));
        overlay.insert("c".to_string(), 3u32, None);

        assert_eq!(overlay.remove_expired(), 2);
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_no_eviction_skips_new_keys_when_full() {
        let overlay = MemoryOverlay::new(2, EvictionPolicy::NoEviction);

        overlay.insert("a".to_string(), 1u32, None);
        overlay.insert("b".to_string(), 2u32, None);
        overlay.insert("c".to_string(), 3u32, None);
        assert_eq!(overlay.get("c"), None);

        // Replacing an existing key is still allowed
        overlay.insert("a".to_string(), 10u32, None);
        assert_eq!(overlay.get("a"), Some(10));
    }

    #[test]
    fn test_zero_capacity_disables_overlay() {
        let overlay = MemoryOverlay::new(0, EvictionPolicy::LRU);
        overlay.insert("a".to_string(), 1u32, None);
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_clear() {
        let overlay = MemoryOverlay::new(8, EvictionPolicy::LFU);
        for i in 0..5u32 {
            overlay.insert(format!("key_{}", i), i, None);
        }
        overlay.clear();
        assert!(overlay.is_empty());
    }
}
