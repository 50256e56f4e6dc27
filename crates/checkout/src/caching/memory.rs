use std::time::{Duration, Instant};

use super::{Cache, CacheEntry, CacheError, CacheKey, RequestType};

type InMemoryCache = moka::sync::Cache<CacheKey, CacheEntry>;

/// An in-memory [`Cache`] backed by [`moka`].
///
/// Entries are evicted once their [`expires_at`](CacheEntry::expires_at) deadline has passed, or
/// when the capacity (in number of entries) is exceeded.
#[derive(Clone)]
pub struct MemoryCache {
    cache: InMemoryCache,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("in-memory items", &self.cache.entry_count())
            .finish()
    }
}

/// A struct implementing [`moka::Expiry`] that uses the [`CacheEntry`] deadline as the explicit
/// expiration time.
struct EntryExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed (it is in the past relative to `current_time`), this
/// will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl moka::Expiry<CacheKey, CacheEntry> for EntryExpiration {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.expires_at)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.expires_at)
    }
}

impl MemoryCache {
    pub fn new(capacity: u64) -> Self {
        let cache = InMemoryCache::builder()
            .max_capacity(capacity)
            .name("inventory")
            .expire_after(EntryExpiration)
            .build();

        Self { cache }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.cache.get(key))
    }

    fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.cache.insert(key.clone(), entry);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.cache.invalidate(key);
        Ok(())
    }

    fn remove_all(&self, request: RequestType) -> Result<(), CacheError> {
        for (key, _) in self.cache.iter() {
            if key.request() == request {
                self.cache.invalidate(key.as_ref());
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        Ok(())
    }
}
