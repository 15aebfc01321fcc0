//! TTL cache keyed by request identity.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::dispatch::RequestIdentity;

/// A label used to evict related cache entries together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CachingGroup(String);

impl CachingGroup {
    /// Creates a group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CachingGroup {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for CachingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maximum age of a cache entry a caller accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheLifetime(Duration);

impl CacheLifetime {
    /// Ten seconds.
    pub const EPHEMERAL: Self = Self(Duration::from_secs(10));
    /// Five minutes.
    pub const MINUTARY: Self = Self(Duration::from_secs(5 * 60));
    /// One hour.
    pub const HOURLY: Self = Self(Duration::from_secs(60 * 60));
    /// One day.
    pub const DAILY: Self = Self(Duration::from_secs(24 * 60 * 60));

    /// Creates a custom lifetime.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self(duration)
    }

    /// Returns the lifetime as a `Duration`.
    #[must_use]
    pub const fn duration(self) -> Duration {
        self.0
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    lifetime: CacheLifetime,
    groups: BTreeSet<CachingGroup>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.lifetime.duration()
    }
}

type CacheKey = (RequestIdentity, TypeId);

/// Process-local cache of decoded results.
///
/// Entries are keyed by the identity of the unsigned request and the type of
/// the cached value. A reader passes the lifetime it accepts: an entry older
/// than that is a miss and is evicted. Each entry also keeps the lifetime it
/// was stored with, and every `store` sweeps entries past it, so keys that
/// are never read again do not accumulate.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached value younger than `lifetime`.
    #[must_use]
    pub fn get<T>(&self, identity: &RequestIdentity, lifetime: CacheLifetime) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = (identity.clone(), TypeId::of::<T>());
        let entry = self.entries.get(&key)?;

        if entry.stored_at.elapsed() > lifetime.duration() {
            drop(entry);
            self.entries.remove(&key);
            debug!(key = %identity.fingerprint(), "Cache entry expired");
            return None;
        }

        entry.value.downcast_ref::<T>().cloned()
    }

    /// Stores `value` for `identity`, replacing any previous entry.
    ///
    /// Expired entries are swept first.
    pub fn store<T>(
        &self,
        identity: &RequestIdentity,
        value: T,
        lifetime: CacheLifetime,
        groups: BTreeSet<CachingGroup>,
    ) where
        T: Clone + Send + Sync + 'static,
    {
        self.purge_expired();
        self.entries.insert(
            (identity.clone(), TypeId::of::<T>()),
            CacheEntry {
                value: Arc::new(value),
                stored_at: Instant::now(),
                lifetime,
                groups,
            },
        );
    }

    /// Removes entries older than the lifetime they were stored with.
    /// Returns how many.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(count = purged, "Purged expired cache entries");
        }
        purged
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Removes entries belonging to any of `groups`. Returns how many.
    pub fn clear_groups(&self, groups: &BTreeSet<CachingGroup>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.groups.is_disjoint(groups));
        before.saturating_sub(self.entries.len())
    }

    /// Returns the number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Method;
    use crate::transport::TransportRequest;

    fn identity(path: &str) -> RequestIdentity {
        RequestIdentity::from_request(&TransportRequest::new(
            Method::Get,
            format!("https://example.com{path}"),
        ))
    }

    fn groups(names: &[&str]) -> BTreeSet<CachingGroup> {
        names.iter().map(|name| CachingGroup::from(*name)).collect()
    }

    #[test]
    fn test_store_and_get() {
        let cache = MemoryCache::new();
        cache.store(&identity("/a"), "value".to_string(), CacheLifetime::MINUTARY, BTreeSet::new());

        assert_eq!(
            cache.get::<String>(&identity("/a"), CacheLifetime::MINUTARY),
            Some("value".to_string())
        );
        assert_eq!(cache.get::<String>(&identity("/b"), CacheLifetime::MINUTARY), None);
    }

    #[test]
    fn test_value_type_is_part_of_key() {
        let cache = MemoryCache::new();
        cache.store(&identity("/a"), 7_u32, CacheLifetime::MINUTARY, BTreeSet::new());

        assert_eq!(cache.get::<String>(&identity("/a"), CacheLifetime::MINUTARY), None);
        assert_eq!(cache.get::<u32>(&identity("/a"), CacheLifetime::MINUTARY), Some(7));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = MemoryCache::new();
        cache.store(&identity("/a"), 1_u8, CacheLifetime::MINUTARY, BTreeSet::new());
        std::thread::sleep(Duration::from_millis(15));

        let short = CacheLifetime::new(Duration::from_millis(5));
        assert_eq!(cache.get::<u8>(&identity("/a"), short), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_sweeps_entries_past_their_lifetime() {
        let cache = MemoryCache::new();
        let short = CacheLifetime::new(Duration::from_millis(5));
        cache.store(&identity("/stale"), 1_u8, short, BTreeSet::new());
        cache.store(&identity("/kept"), 2_u8, CacheLifetime::HOURLY, BTreeSet::new());
        std::thread::sleep(Duration::from_millis(15));

        cache.store(&identity("/fresh"), 3_u8, short, BTreeSet::new());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<u8>(&identity("/kept"), CacheLifetime::HOURLY), Some(2));
        assert_eq!(cache.get::<u8>(&identity("/stale"), CacheLifetime::DAILY), None);
    }

    #[test]
    fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.store(
            &identity("/a"),
            1_u8,
            CacheLifetime::new(Duration::from_millis(5)),
            BTreeSet::new(),
        );
        std::thread::sleep(Duration::from_millis(15));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.purge_expired(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_groups() {
        let cache = MemoryCache::new();
        cache.store(&identity("/users"), 1_u8, CacheLifetime::MINUTARY, groups(&["users"]));
        cache.store(&identity("/posts"), 2_u8, CacheLifetime::MINUTARY, groups(&["posts", "feed"]));
        cache.store(&identity("/plain"), 3_u8, CacheLifetime::MINUTARY, BTreeSet::new());

        assert_eq!(cache.clear_groups(&groups(&["feed", "users"])), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<u8>(&identity("/plain"), CacheLifetime::DAILY), Some(3));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lifetime_constants() {
        assert_eq!(CacheLifetime::EPHEMERAL.duration(), Duration::from_secs(10));
        assert_eq!(CacheLifetime::MINUTARY.duration(), Duration::from_secs(300));
        assert!(CacheLifetime::HOURLY < CacheLifetime::DAILY);
    }
}
