//! Overlay eviction policies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Overlay eviction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Least Recently Used
    LRU,
    /// Least Frequently Used
    LFU,
    /// Soonest expiration first, entries without expiry last
    TTL,
    /// No eviction (new entries are not cached once full)
    NoEviction,
}

/// What the policy needs to know about an overlay entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionCandidate {
    /// Logical clock value of the last access
    pub last_access: u64,
    /// Number of reads and writes of the entry
    pub access_count: u64,
    /// Absolute expiration time, if any
    pub expires_at: Option<DateTime<Utc>>,
}

impl EvictionPolicy {
    /// Order two candidates; `Less` means evict first
    fn compare(&self, a: &EvictionCandidate, b: &EvictionCandidate) -> Ordering {
        let by_recency = a.last_access.cmp(&b.last_access);

        match self {
            EvictionPolicy::LRU | EvictionPolicy::NoEviction => by_recency,
            EvictionPolicy::LFU => a.access_count.cmp(&b.access_count).then(by_recency),
            EvictionPolicy::TTL => match (a.expires_at, b.expires_at) {
                (Some(x), Some(y)) => x.cmp(&y).then(by_recency),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => by_recency,
            },
        }
    }

    /// Select keys to evict from a set of candidates
    pub fn select_victims(
        &self,
        mut candidates: Vec<(String, EvictionCandidate)>,
        count: usize,
    ) -> Vec<String> {
        if *self == EvictionPolicy::NoEviction || count == 0 {
            return Vec::new();
        }

        candidates.sort_by(|(_, a), (_, b)| self.compare(a, b));
        candidates.into_iter().take(count).map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(last_access: u64, access_count: u64, expires_in: Option<i64>) -> EvictionCandidate {
        EvictionCandidate {
            last_access,
            access_count,
            expires_at: expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        }
    }

    fn candidates() -> Vec<(String, EvictionCandidate)> {
        vec![
            ("recent".to_string(), candidate(30, 1, None)),
            ("old".to_string(), candidate(10, 9, Some(600))),
            ("popular".to_string(), candidate(20, 50, Some(5))),
        ]
    }

    #[test]
    fn test_lru_evicts_oldest_access() {
        let victims = EvictionPolicy::LRU.select_victims(candidates(), 2);
        assert_eq!(victims, vec!["old", "popular"]);
    }

    #[test]
    fn test_lfu_evicts_least_used() {
        let victims = EvictionPolicy::LFU.select_victims(candidates(), 1);
        assert_eq!(victims, vec!["recent"]);
    }

    #[test]
    fn test_ttl_evicts_soonest_expiry_first() {
        let victims = EvictionPolicy::TTL.select_victims(candidates(), 3);
        assert_eq!(victims, vec!["popular", "old", "recent"]);
    }

    #[test]
    fn test_no_eviction_selects_nothing() {
        assert!(EvictionPolicy::NoEviction.select_victims(candidates(), 2).is_empty());
    }
}
