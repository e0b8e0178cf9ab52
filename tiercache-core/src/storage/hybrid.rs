//! Hybrid cache coordinating the memory overlay and the persistent store
//!
//! Reads go to the overlay first and fall through to the store. Writes go
//! through to the store and then update the overlay. Store access is always
//! funneled through the store's single worker, and every
//! "queue a store mutation, then touch the overlay" pair runs under one lock,
//! so the two tiers apply writes to a key in the same order.

use crate::cache::overlay::MemoryOverlay;
use crate::codec::Codable;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult, CodecError, StoreError};
use crate::monitoring::stats::CacheStats;
use crate::storage::persistent::{Pending, PersistentStore, StoreStats};
use crate::storage::record::{RecordOptions, StoredRecord};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// File extension of the backing database
pub const STORE_EXTENSION: &str = "sqlite";

/// Two-tier cache of `V` values
pub struct HybridCache<V> {
    name: String,
    /// Decoded values, never authoritative
    overlay: MemoryOverlay<V>,
    /// Durable rows behind a single worker
    store: PersistentStore,
    record_options: RecordOptions,
    /// Orders store mutations with their overlay updates
    write_order: Mutex<()>,
    /// Bumped by every mutation; read-through only fills the overlay if unchanged
    write_epoch: AtomicU64,
    stats: CacheStats,
}

impl<V> HybridCache<V>
where
    V: Codable + Clone + Send + Sync + 'static,
{
    /// Open the cache `name` stored under `base_dir` with default settings
    pub fn open<P: AsRef<Path>>(name: &str, base_dir: P) -> CacheResult<Self> {
        Self::open_with_config(name, base_dir, &CacheConfig::default())
    }

    /// Open the cache `name` stored under `base_dir`
    ///
    /// Opening the same name and directory again, in this process or a later
    /// one, sees the same data. Two live instances over the same file do not
    /// coordinate their writes.
    pub fn open_with_config<P: AsRef<Path>>(
        name: &str,
        base_dir: P,
        config: &CacheConfig,
    ) -> CacheResult<Self> {
        validate_name(name)?;
        config.validate()?;

        let path = base_dir
            .as_ref()
            .join(format!("{}.{}", name, STORE_EXTENSION));
        let store = PersistentStore::open(&path, &config.storage)?;

        debug!(
            name,
            capacity = config.overlay.capacity,
            policy = ?config.overlay.eviction_policy,
            "Opened hybrid cache"
        );

        Ok(Self {
            name: name.to_string(),
            overlay: MemoryOverlay::new(config.overlay.capacity, config.overlay.eviction_policy),
            store,
            record_options: RecordOptions {
                compression_threshold: config.storage.compression_threshold_bytes,
                compression_level: config.storage.compression_level,
            },
            write_order: Mutex::new(()),
            write_epoch: AtomicU64::new(0),
            stats: CacheStats::default(),
        })
    }

    /// Get a value
    ///
    /// A row that can no longer be decoded, or whose columns are corrupt, is
    /// treated as absent and purged.
    pub fn get(&self, key: &str) -> CacheResult<Option<V>> {
        validate_key(key)?;

        if let Some(value) = self.overlay.get(key) {
            self.stats.record_overlay_hit();
            return Ok(Some(value));
        }
        self.stats.record_overlay_miss();

        self.read_through(key)
    }

    /// Check whether `get` would return a value
    ///
    /// On an overlay miss the row is read and decoded, so an undecodable row
    /// reports `false` and is purged just as `get` would.
    pub fn contains(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;

        if self.overlay.contains(key) {
            return Ok(true);
        }
        Ok(self.read_through(key)?.is_some())
    }

    /// Store a value without expiration
    pub fn set(&self, key: &str, value: V) -> CacheResult<()> {
        self.write(key, value, None)
    }

    /// Store a value that expires after `ttl`
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) -> CacheResult<()> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| CacheError::InvalidTtl(format!("{:?} is out of range", ttl)))?;
        self.write(key, value, Some(expires_at))
    }

    /// Store a value that expires at `expires_at`
    pub fn set_expiring_at(
        &self,
        key: &str,
        value: V,
        expires_at: DateTime<Utc>,
    ) -> CacheResult<()> {
        self.write(key, value, Some(expires_at))
    }

    /// Get a value, computing and storing it on a miss
    ///
    /// Not atomic: concurrent callers that miss on the same key may each run
    /// `f`, and the last write wins.
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: Option<Duration>, f: F) -> CacheResult<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }

        let value = f();
        match ttl {
            Some(ttl) => self.set_with_ttl(key, value.clone(), ttl)?,
            None => self.set(key, value.clone())?,
        }
        Ok(value)
    }

    /// Remove a value from both tiers; removing an absent key is a no-op
    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;

        let pending = {
            let _order = self.write_order.lock();
            let pending = self
                .store
                .submit_delete(key.to_string())
                .map_err(|e| self.store_failure(e))?;
            self.write_epoch.fetch_add(1, Ordering::AcqRel);
            self.overlay.remove(key);
            pending
        };

        let removed = self.wait(Ok(pending))?;
        if removed {
            self.stats.record_removals(1);
        }
        Ok(removed)
    }

    /// Remove every value from both tiers
    pub fn clear(&self) -> CacheResult<usize> {
        let pending = {
            let _order = self.write_order.lock();
            let pending = self
                .store
                .submit_delete_all()
                .map_err(|e| self.store_failure(e))?;
            self.write_epoch.fetch_add(1, Ordering::AcqRel);
            self.overlay.clear();
            pending
        };

        let removed = self.wait(Ok(pending))?;
        self.stats.record_removals(removed as u64);
        debug!(name = %self.name, removed, "Cleared cache");
        Ok(removed)
    }

    /// Delete expired rows from the store and expired entries from the overlay
    pub fn purge_expired(&self) -> CacheResult<usize> {
        self.overlay.remove_expired();
        let removed = self.store.delete_expired().map_err(|e| self.store_failure(e))?;
        self.stats.record_removals(removed as u64);
        Ok(removed)
    }

    /// Live keys in ascending order
    pub fn keys(&self) -> CacheResult<Vec<String>> {
        self.store.keys().map_err(|e| self.store_failure(e))
    }

    /// Drop every overlay entry; the store is untouched
    pub fn clear_internal_cache(&self) {
        self.overlay.clear();
    }

    /// Cache name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Get statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get persistent store statistics
    pub fn store_stats(&self) -> CacheResult<StoreStats> {
        self.store.stats().map_err(|e| self.store_failure(e))
    }

    /// Number of values currently held in memory
    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }

    fn write(&self, key: &str, value: V, expires_at: Option<DateTime<Utc>>) -> CacheResult<()> {
        validate_key(key)?;

        let encoded = value.encode().map_err(CacheError::Encoding)?;
        let record = StoredRecord::seal(encoded, expires_at, &self.record_options)
            .map_err(CacheError::Encoding)?;

        let pending = {
            let _order = self.write_order.lock();
            let pending = self
                .store
                .submit_upsert(key.to_string(), record)
                .map_err(|e| self.store_failure(e))?;
            self.write_epoch.fetch_add(1, Ordering::AcqRel);
            self.overlay.insert(key.to_string(), value, expires_at);
            pending
        };

        match pending.wait() {
            Ok(()) => {
                self.stats.record_store_write();
                Ok(())
            }
            Err(e) => {
                // The overlay must not keep a value the store rejected
                self.overlay.remove(key);
                Err(self.store_failure(e))
            }
        }
    }

    /// Load a value from the store and cache it in the overlay
    fn read_through(&self, key: &str) -> CacheResult<Option<V>> {
        // Read before fetching: a write queued after this point changes it
        let epoch = self.write_epoch.load(Ordering::Acquire);
        let fetched = self.wait(self.store.submit_fetch(key.to_string()))?;
        self.stats.record_store_read();

        let record = match fetched {
            None => return Ok(None),
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                self.discard(key, e, || self.store.delete_if_malformed(key));
                return Ok(None);
            }
        };

        match record.open().and_then(|bytes| V::decode(&bytes)) {
            Ok(value) => {
                self.populate(key, value.clone(), record.expires_at, epoch);
                Ok(Some(value))
            }
            Err(e) => {
                self.discard(key, e, || self.store.delete_if_unchanged(key, &record));
                Ok(None)
            }
        }
    }

    /// Fill the overlay after a read-through unless a write happened meanwhile
    fn populate(&self, key: &str, value: V, expires_at: Option<DateTime<Utc>>, epoch: u64) {
        let _order = self.write_order.lock();
        if self.write_epoch.load(Ordering::Acquire) == epoch {
            self.overlay.insert(key.to_string(), value, expires_at);
        }
    }

    /// Count and purge a row that cannot be turned back into a value
    ///
    /// `purge` only deletes the row if nobody replaced it in the meantime.
    fn discard<F>(&self, key: &str, error: CodecError, purge: F)
    where
        F: FnOnce() -> Result<bool, StoreError>,
    {
        self.stats.record_decode_failure();
        warn!(name = %self.name, key, error = %error, "Discarding undecodable cache entry");

        match purge() {
            Ok(true) => self.stats.record_removals(1),
            Ok(false) => {}
            Err(e) => {
                self.stats.record_store_error();
                warn!(name = %self.name, key, error = %e, "Failed to purge undecodable entry");
            }
        }
    }

    fn wait<R>(&self, pending: Result<Pending<R>, StoreError>) -> CacheResult<R> {
        pending
            .and_then(Pending::wait)
            .map_err(|e| self.store_failure(e))
    }

    fn store_failure(&self, error: StoreError) -> CacheError {
        self.stats.record_store_error();
        warn!(name = %self.name, error = %error, "Store operation failed");
        CacheError::StoreUnavailable(error)
    }
}

fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

fn validate_name(name: &str) -> CacheResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(CacheError::InvalidName(format!("'{}' is not a usable name", name)));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(CacheError::InvalidName(format!(
            "'{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    fn user(name: &str, age: u32) -> User {
        User {
            name: name.to_string(),
            age,
        }
    }

    fn create_test_cache() -> (HybridCache<User>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = HybridCache::open("users", temp_dir.path()).unwrap();
        (cache, temp_dir)
    }

    #[test]
    fn test_cache_creation() {
        let (cache, temp_dir) = create_test_cache();
        assert_eq!(cache.name(), "users");
        assert_eq!(cache.path(), temp_dir.path().join("users.sqlite"));
        assert_eq!(cache.stats().store_writes(), 0);
    }

    #[test]
    fn test_set_then_get_hits_overlay() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("user:1", user("John", 30)).unwrap();
        assert_eq!(cache.stats().store_writes(), 1);

        assert_eq!(cache.get("user:1").unwrap(), Some(user("John", 30)));
        assert_eq!(cache.stats().overlay_hits(), 1);
        assert_eq!(cache.stats().store_reads(), 0);
    }

    #[test]
    fn test_get_with_overlay_miss() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("user:1", user("John", 30)).unwrap();
        cache.clear_internal_cache();

        // Miss, then read-through populates the overlay
        assert_eq!(cache.get("user:1").unwrap(), Some(user("John", 30)));
        assert_eq!(cache.stats().overlay_misses(), 1);
        assert_eq!(cache.stats().store_reads(), 1);

        assert_eq!(cache.get("user:1").unwrap(), Some(user("John", 30)));
        assert_eq!(cache.stats().overlay_hits(), 1);
        assert_eq!(cache.stats().store_reads(), 1);
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(matches!(cache.get(""), Err(CacheError::InvalidKey(_))));
        assert!(matches!(
            cache.set("", user("John", 30)),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(cache.remove(""), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["", ".", "..", "a/b", "a\\b"] {
            let result = HybridCache::<User>::open(name, temp_dir.path());
            assert!(matches!(result, Err(CacheError::InvalidName(_))), "{}", name);
        }
    }

    #[test]
    fn test_remove() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("user:1", user("John", 30)).unwrap();
        assert!(cache.remove("user:1").unwrap());
        assert_eq!(cache.get("user:1").unwrap(), None);
        assert!(!cache.remove("user:1").unwrap());
        assert_eq!(cache.stats().removals(), 1);
    }

    #[test]
    fn test_contains() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(!cache.contains("user:1").unwrap());
        cache.set("user:1", user("John", 30)).unwrap();
        assert!(cache.contains("user:1").unwrap());

        cache.clear_internal_cache();
        assert!(cache.contains("user:1").unwrap());
    }

    #[test]
    fn test_clear_removes_both_tiers() {
        let (cache, _temp_dir) = create_test_cache();

        for i in 0..4 {
            cache.set(&format!("user:{}", i), user("John", i)).unwrap();
        }
        assert_eq!(cache.clear().unwrap(), 4);
        assert_eq!(cache.overlay_len(), 0);
        assert!(cache.keys().unwrap().is_empty());
        assert_eq!(cache.get("user:0").unwrap(), None);
    }

    #[test]
    fn test_get_or_insert_with() {
        let (cache, _temp_dir) = create_test_cache();

        let first = cache
            .get_or_insert_with("user:1", None, || user("John", 30))
            .unwrap();
        assert_eq!(first, user("John", 30));

        let second = cache
            .get_or_insert_with("user:1", None, || user("Jane", 25))
            .unwrap();
        assert_eq!(second, user("John", 30));
        assert_eq!(cache.stats().store_writes(), 1);
    }

    #[test]
    fn test_expiry() {
        let (cache, _temp_dir) = create_test_cache();

        cache
            .set_expiring_at("old", user("John", 30), Utc::now() - chrono::Duration::seconds(1))
            .unwrap();
        cache
            .set_with_ttl("new", user("Jane", 25), Duration::from_secs(60))
            .unwrap();

        assert_eq!(cache.get("old").unwrap(), None);
        assert_eq!(cache.keys().unwrap(), vec!["new".to_string()]);
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.store_stats().unwrap().entries, 1);
    }

    #[test]
    fn test_statistics() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("user:1", user("John", 30)).unwrap();
        cache.get("user:1").unwrap();
        cache.get("user:2").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.overlay_hits(), 1);
        assert_eq!(stats.overlay_misses(), 1);
        assert!(stats.hit_rate() > 0.0 && stats.hit_rate() < 1.0);
    }
}
