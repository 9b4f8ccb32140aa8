// Time-bounded response cache.
//
// Entries expire `ttl` after insertion. Expired entries are never returned
// and are dropped lazily on lookup or in bulk by `purge_expired`.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A clone of the live value for `key`. An expired entry is removed.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value`, replacing any previous entry and restarting its clock.
    pub fn insert(&mut self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drop one entry, returning its value if it was still live.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove every expired entry and return how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    /// Stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn value_is_served_until_ttl_elapses() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("bootstrap".to_string(), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&"bootstrap".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"bootstrap".to_string()), None);
        assert!(cache.is_empty(), "expired entry dropped on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_restarts_the_clock() {
        let mut cache = TtlCache::new(Duration::from_secs(10));
        cache.insert(1u32, "old");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert(1u32, "new");
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&1), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_and_clear() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1u32, 10);
        cache.insert(2u32, 20);
        cache.insert(3u32, 30);

        assert_eq!(cache.invalidate(&2), Some(20));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.invalidate(&2), None);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidating_an_expired_entry_returns_nothing() {
        let mut cache = TtlCache::new(Duration::from_secs(5));
        cache.insert("k", 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.invalidate(&"k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.insert("b", 2);
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b"), Some(2));
    }
}
