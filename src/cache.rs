/// Result cache
///
/// TTL-keyed memoization of detector results for unchanged regions. Expired
/// entries are evicted first, then the least recently used entry once the cache
/// is over capacity. Entries never outlive their TTL: a lookup at or past the
/// expiry instant is a miss.
///
/// The `*_at` variants take the current instant explicitly so expiry can be
/// tested without sleeping.
use image::RgbaImage;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_used: Instant,
}

pub struct ResultCache<V> {
    entries: HashMap<u64, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            ttl,
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: u64) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: u64, now: Instant) -> Option<V> {
        let ttl = self.ttl;
        let expired = match self.entries.get_mut(&key) {
            Some(entry) if now.saturating_duration_since(entry.inserted_at) < ttl => {
                entry.last_used = now;
                self.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(&key);
        }
        self.misses += 1;
        None
    }

    pub fn insert(&mut self, key: u64, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: u64, value: V, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired_at(now);
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        before - self.entries.len()
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Hash image content (dimensions and raw pixels)
pub fn content_hash(image: &RgbaImage) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_image(image, &mut hasher);
    hasher.finish()
}

/// Feed image content into an existing hasher (for composite keys)
pub fn hash_image<H: Hasher>(image: &RgbaImage, hasher: &mut H) {
    image.dimensions().hash(hasher);
    image.as_raw().hash(hasher);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn cache() -> ResultCache<&'static str> {
        ResultCache::new(Duration::from_secs(2), 3)
    }

    #[test]
    fn test_ttl_boundary() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.insert_at(1, "pot", t0);

        assert_eq!(cache.get_at(1, t0 + Duration::from_millis(1900)), Some("pot"));
        assert_eq!(cache.get_at(1, t0 + Duration::from_millis(2100)), None);
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_expired_entries_evicted_before_lru() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.insert_at(1, "old", t0);
        cache.insert_at(2, "a", t0 + Duration::from_millis(1500));
        cache.insert_at(3, "b", t0 + Duration::from_millis(1600));

        // Key 1 has expired by now and goes first, keys 2 and 3 survive
        let now = t0 + Duration::from_millis(2500);
        cache.insert_at(4, "c", now);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_at(2, now), Some("a"));
        assert_eq!(cache.get_at(3, now), Some("b"));
        assert_eq!(cache.get_at(4, now), Some("c"));
    }

    #[test]
    fn test_lru_eviction_over_capacity() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.insert_at(1, "a", t0);
        cache.insert_at(2, "b", t0);
        cache.insert_at(3, "c", t0);

        // Touch 1 so 2 becomes least recently used
        assert!(cache.get_at(1, t0 + Duration::from_millis(10)).is_some());
        cache.insert_at(4, "d", t0 + Duration::from_millis(20));

        let now = t0 + Duration::from_millis(30);
        assert_eq!(cache.get_at(2, now), None);
        assert_eq!(cache.get_at(1, now), Some("a"));
        assert_eq!(cache.get_at(4, now), Some("d"));
    }

    #[test]
    fn test_reinsert_refreshes_ttl() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.insert_at(1, "a", t0);
        cache.insert_at(1, "b", t0 + Duration::from_millis(1500));
        assert_eq!(cache.get_at(1, t0 + Duration::from_millis(3000)), Some("b"));
    }

    #[test]
    fn test_content_hash_tracks_pixels() {
        let a = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let mut b = a.clone();
        assert_eq!(content_hash(&a), content_hash(&b));

        b.put_pixel(3, 3, Rgba([1, 2, 4, 255]));
        assert_ne!(content_hash(&a), content_hash(&b));

        let c = RgbaImage::from_pixel(2, 8, Rgba([1, 2, 3, 255]));
        assert_ne!(content_hash(&a), content_hash(&c));
    }
}
