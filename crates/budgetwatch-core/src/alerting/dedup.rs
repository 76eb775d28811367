//! Bounded recently-seen event id cache
//!
//! At-least-once delivery means the same `event_id` can arrive more than
//! once. Each partition worker owns one `DedupCache`; ownership is exclusive,
//! so no locking is needed.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Insertion-ordered id set bounded by capacity and entry age
pub struct DedupCache {
    capacity: usize,
    ttl: Duration,
    seen: HashMap<Uuid, DateTime<Utc>>,
    order: VecDeque<(Uuid, DateTime<Utc>)>,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` ids, each for at most `ttl`
    pub fn new(capacity: usize, ttl: std::time::Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record an id. Returns `true` if the id was not already present, i.e.
    /// the event should be processed.
    pub fn insert(&mut self, id: Uuid) -> bool {
        self.insert_at(id, Utc::now())
    }

    fn insert_at(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        self.evict(now);

        if self.seen.contains_key(&id) {
            return false;
        }

        self.seen.insert(id, now);
        self.order.push_back((id, now));
        true
    }

    /// Number of ids currently tracked
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        // Expired entries first, then overflow beyond capacity. `order` is
        // append-only per id, so the front is always the oldest.
        while let Some((id, inserted_at)) = self.order.front().copied() {
            let expired = inserted_at
                .checked_add_signed(self.ttl)
                .is_some_and(|deadline| deadline <= now);
            let over_capacity = self.order.len() >= self.capacity;
            if !expired && !over_capacity {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn first_insert_is_fresh_second_is_duplicate() {
        let mut cache = DedupCache::new(16, StdDuration::from_secs(60));
        let id = Uuid::new_v4();

        assert!(cache.insert(id));
        assert!(!cache.insert(id));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut cache = DedupCache::new(2, StdDuration::from_secs(60));
        let oldest = Uuid::new_v4();

        assert!(cache.insert(oldest));
        assert!(cache.insert(Uuid::new_v4()));
        assert!(cache.insert(Uuid::new_v4()));

        // The oldest id fell out, so a redelivery would pass again. The
        // bound trades memory for a dedup window instead.
        assert!(cache.insert(oldest));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expired_entries_stop_suppressing() {
        let mut cache = DedupCache::new(16, StdDuration::from_secs(10));
        let id = Uuid::new_v4();
        let start = Utc::now();

        assert!(cache.insert_at(id, start));
        assert!(!cache.insert_at(id, start + Duration::seconds(5)));
        assert!(cache.insert_at(id, start + Duration::seconds(11)));
    }

    #[test]
    fn eviction_keeps_unexpired_entries() {
        let mut cache = DedupCache::new(16, StdDuration::from_secs(10));
        let old = Uuid::new_v4();
        let recent = Uuid::new_v4();
        let start = Utc::now();

        cache.insert_at(old, start);
        cache.insert_at(recent, start + Duration::seconds(9));

        assert!(!cache.insert_at(recent, start + Duration::seconds(12)));
        assert!(cache.insert_at(old, start + Duration::seconds(12)));
    }
}
