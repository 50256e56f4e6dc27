//! # Inventory caching
//!
//! Loaded purchases are persisted through a pluggable [`Cache`]. The cache is a best-effort
//! accelerator and never the source of truth: the backend is still consulted for every product
//! type, and the fresh result overwrites the cached one.
//!
//! ## The [`Cache`] contract
//!
//! A [`Cache`] stores opaque [`CacheEntry`] blobs under a [`CacheKey`]. It offers a single read
//! ([`Cache::get`]) and the mutating operations [`Cache::init`], [`Cache::put`],
//! [`Cache::remove`], [`Cache::remove_all`] and [`Cache::clear`]. Implementations may fail on any
//! of these, either by returning a [`CacheError`] or by panicking.
//!
//! [`MemoryCache`] is the in-memory reference implementation and the default when caching is
//! enabled but no cache was supplied.
//!
//! ## Failure boundary
//!
//! Callers never talk to a [`Cache`] directly. It is wrapped into a [`SafeCache`], which applies
//! the same failure boundary to every operation: errors and panics are converted into a miss (for
//! `get`) or a no-op (for everything else), logged at `ERROR` level, counted, and reported as the
//! `cache.fault` metric. The caller's own control flow always continues.
//!
//! ## Keys
//!
//! A [`CacheKey`] belongs to a [`RequestType`], which reserves a namespace prefix. Purchase lists
//! live under `purchases_<product type>`, so external implementations can invalidate by prefix.
//! The loader itself only ever uses exact-key `get` and `put`.

mod cache_error;
mod cache_key;
mod entry;
mod memory;
mod safe;

pub use cache_error::CacheError;
pub use cache_key::{CacheKey, RequestType};
pub use entry::CacheEntry;
pub use memory::MemoryCache;
pub use safe::{CacheOp, SafeCache};

/// A key/entry store used to persist loaded purchases.
///
/// Implementations are shared between all product types and concurrent loads, so they have to be
/// [`Sync`]. Implementations that cannot tolerate concurrent calls are serialized by
/// [`SafeCache`] when `cache.serialize_access` is enabled.
pub trait Cache: Send + Sync {
    /// Prepares the underlying storage. Called once before first use.
    fn init(&self) -> Result<(), CacheError> {
        Ok(())
    }

    /// Looks up the entry for `key`, returning `None` if there is none.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores or overwrites the entry for `key`.
    fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError>;

    /// Removes the entry for `key`, if any.
    fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Removes all entries belonging to `request`.
    fn remove_all(&self, request: RequestType) -> Result<(), CacheError>;

    /// Removes all entries.
    fn clear(&self) -> Result<(), CacheError>;
}
