//! Conversation binding cache.
//!
//! Maps a conversation key (sender, or `{session}.{sender}` for groups)
//! to the backend-issued continuation id for that exchange. Bounded:
//! when full, the least-recently-used binding is dropped. An absent
//! binding means the next request starts a fresh conversation.
//!
//! Shared between the poll loop and the dispatch workers; all access
//! goes through one mutex. Every operation is an O(1) map step, so the
//! coarse lock is never held across I/O.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Bounded key → continuation-id store with LRU eviction.
pub struct ConversationCache {
    entries: Mutex<LruCache<String, String>>,
}

impl ConversationCache {
    /// Create a cache holding at most `capacity` bindings.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up the binding for a key, refreshing its recency.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Look up the binding for a key; on a miss, seed the cache with
    /// `fallback` when it is non-empty.
    ///
    /// Returns the stored value only when the key was already present.
    /// The seeded fallback is not returned: the caller just computed it
    /// and uses this call to persist it for the next turn. A present
    /// key is never overwritten.
    pub fn lookup_or_seed(&self, key: &str, fallback: &str) -> Option<String> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(value) = entries.get(key) {
            return Some(value.clone());
        }
        if !fallback.is_empty() {
            entries.put(key.to_string(), fallback.to_string());
        }
        None
    }

    /// Store a binding unconditionally, replacing any previous value.
    pub fn store(&self, key: &str, value: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.put(key.to_string(), value.to_string());
    }

    /// Remove the binding for a key. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.pop(key)
    }

    /// Number of bindings currently stored.
    pub fn len(&self) -> usize {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.len()
    }

    /// True when no bindings are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_absent_key() {
        let cache = ConversationCache::new(10);
        assert_eq!(cache.lookup("alice"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_and_lookup() {
        let cache = ConversationCache::new(10);
        cache.store("alice", "conv-1");
        assert_eq!(cache.lookup("alice"), Some("conv-1".into()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seed_on_miss() {
        let cache = ConversationCache::new(10);
        // The seeding call itself reports a miss
        assert_eq!(cache.lookup_or_seed("alice", "conv-1"), None);
        // but the fallback is now stored for the next turn
        assert_eq!(cache.lookup("alice"), Some("conv-1".into()));
    }

    #[test]
    fn test_seed_never_overwrites_present_key() {
        let cache = ConversationCache::new(10);
        cache.store("alice", "conv-1");
        assert_eq!(cache.lookup_or_seed("alice", "conv-2"), Some("conv-1".into()));
        assert_eq!(cache.lookup("alice"), Some("conv-1".into()));
    }

    #[test]
    fn test_empty_fallback_does_not_seed() {
        let cache = ConversationCache::new(10);
        assert_eq!(cache.lookup_or_seed("alice", ""), None);
        assert_eq!(cache.lookup("alice"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_replaces_value() {
        let cache = ConversationCache::new(10);
        cache.store("alice", "conv-1");
        cache.store("alice", "conv-2");
        assert_eq!(cache.lookup("alice"), Some("conv-2".into()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = ConversationCache::new(2);
        cache.store("a", "a1");
        cache.store("b", "b1");
        cache.store("c", "c1");

        assert_eq!(cache.lookup("a"), None);
        assert_eq!(cache.lookup("b"), Some("b1".into()));
        assert_eq!(cache.lookup("c"), Some("c1".into()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let cache = ConversationCache::new(2);
        cache.store("a", "a1");
        cache.store("b", "b1");
        // Touch "a" so "b" becomes the eviction candidate
        assert_eq!(cache.lookup("a"), Some("a1".into()));
        cache.store("c", "c1");

        assert_eq!(cache.lookup("a"), Some("a1".into()));
        assert_eq!(cache.lookup("b"), None);
        assert_eq!(cache.lookup("c"), Some("c1".into()));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let cache = ConversationCache::new(10);
        cache.store("alice", "conv-1");
        assert_eq!(cache.remove("alice"), Some("conv-1".into()));
        assert_eq!(cache.remove("alice"), None);
        assert_eq!(cache.lookup("alice"), None);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let cache = ConversationCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.store("a", "a1");
        assert_eq!(cache.lookup("a"), Some("a1".into()));
    }
}
