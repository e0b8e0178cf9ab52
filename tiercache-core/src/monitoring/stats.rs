//! Operation counters for a cache instance

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics, updated lock-free from any caller thread
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads answered by the memory overlay
    overlay_hits: AtomicU64,
    /// Reads that had to go to the persistent store
    overlay_misses: AtomicU64,
    /// Rows read from the persistent store
    store_reads: AtomicU64,
    /// Rows written to the persistent store
    store_writes: AtomicU64,
    /// Rows removed from the persistent store
    removals: AtomicU64,
    /// Stored payloads that failed to decode
    decode_failures: AtomicU64,
    /// Store operations that returned an error
    store_errors: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_overlay_hit(&self) {
        self.overlay_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overlay_miss(&self) {
        self.overlay_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_read(&self) {
        self.store_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_write(&self) {
        self.store_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removals(&self, count: u64) {
        self.removals.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overlay_hits(&self) -> u64 {
        self.overlay_hits.load(Ordering::Relaxed)
    }

    pub fn overlay_misses(&self) -> u64 {
        self.overlay_misses.load(Ordering::Relaxed)
    }

    pub fn store_reads(&self) -> u64 {
        self.store_reads.load(Ordering::Relaxed)
    }

    pub fn store_writes(&self) -> u64 {
        self.store_writes.load(Ordering::Relaxed)
    }

    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn store_errors(&self) -> u64 {
        self.store_errors.load(Ordering::Relaxed)
    }

    /// Fraction of reads served by the overlay
    pub fn hit_rate(&self) -> f64 {
        let hits = self.overlay_hits();
        let total = hits + self.overlay_misses();

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Point-in-time copy suitable for serialization
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            overlay_hits: self.overlay_hits(),
            overlay_misses: self.overlay_misses(),
            store_reads: self.store_reads(),
            store_writes: self.store_writes(),
            removals: self.removals(),
            decode_failures: self.decode_failures(),
            store_errors: self.store_errors(),
            hit_rate: self.hit_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub overlay_hits: u64,
    pub overlay_misses: u64,
    pub store_reads: u64,
    pub store_writes: u64,
    pub removals: u64,
    pub decode_failures: u64,
    pub store_errors: u64,
    pub hit_rate: f64,
}
