//! Frame cache
//!
//! Memoizes snapshot payloads by scene and date so that rebuilding an
//! overlapping range does not fetch the same frames again. Least recently
//! used entries are evicted first. Image payloads share their bytes, so a
//! hit is a cheap clone.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::trace;

use super::frame::FramePayload;

/// Cache key: what was rendered and for which day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub scene: String,
    pub date: NaiveDate,
}

impl FrameKey {
    pub fn new(scene: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            scene: scene.into(),
            date,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    payload: FramePayload,
    last_used: u64,
}

#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    entries: HashMap<FrameKey, CacheEntry>,
    clock: u64,
    stats: CacheStats,
}

impl FrameCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &FrameKey) -> Option<FramePayload> {
        self.clock += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.clock;
                self.stats.hits += 1;
                Some(entry.payload.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: FrameKey, payload: FramePayload) {
        if self.capacity == 0 {
            return;
        }
        self.clock += 1;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                last_used: self.clock,
            },
        );
    }

    /// Drop every entry of `scene`; returns how many were removed.
    pub fn invalidate_scene(&mut self, scene: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.scene != scene);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            trace!(scene = %key.scene, date = %key.date, "evicting cached frame");
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::frame::ImageBlob;
    use crate::sequence::range::parse_date;

    fn key(day: &str) -> FrameKey {
        FrameKey::new("tiles:sst", parse_date(day).unwrap())
    }

    fn payload(byte: u8) -> FramePayload {
        FramePayload::Image(ImageBlob::new("image/png", vec![byte; 4]))
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = FrameCache::new(4);
        cache.insert(key("2024-09-09"), payload(1));

        assert_eq!(cache.get(&key("2024-09-09")), Some(payload(1)));
        assert!(cache.get(&key("2024-09-10")).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn test_least_recently_used_evicted() {
        let mut cache = FrameCache::new(2);
        cache.insert(key("2024-09-09"), payload(1));
        cache.insert(key("2024-09-10"), payload(2));
        cache.get(&key("2024-09-09"));
        cache.insert(key("2024-09-11"), payload(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("2024-09-10")).is_none());
        assert!(cache.get(&key("2024-09-09")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = FrameCache::new(0);
        cache.insert(key("2024-09-09"), payload(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_scene() {
        let mut cache = FrameCache::new(8);
        cache.insert(key("2024-09-09"), payload(1));
        cache.insert(
            FrameKey::new("tiles:avhrr_sst", parse_date("2024-09-09").unwrap()),
            payload(2),
        );

        assert_eq!(cache.invalidate_scene("tiles:sst"), 1);
        assert_eq!(cache.len(), 1);
    }
}
