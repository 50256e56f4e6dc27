use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Cache, CacheEntry, CacheError, CacheKey, RequestType};

/// The [`Cache`] operations, used to tag faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Init,
    Get,
    Put,
    Remove,
    RemoveAll,
    Clear,
}

impl CacheOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOp::Init => "init",
            CacheOp::Get => "get",
            CacheOp::Put => "put",
            CacheOp::Remove => "remove",
            CacheOp::RemoveAll => "remove_all",
            CacheOp::Clear => "clear",
        }
    }
}

/// Failure boundary around a [`Cache`].
///
/// Every operation of the wrapped cache is run under the same guard: a returned [`CacheError`]
/// or a panic is logged, counted and then treated as if the cache had returned nothing (for
/// [`get`](Self::get)) or had succeeded trivially (for everything else).
///
/// Panics are only contained when the crate is built with `panic = "unwind"`.
pub struct SafeCache {
    inner: Arc<dyn Cache>,
    /// Serializes access to `inner` if set.
    lock: Option<Mutex<()>>,
    faults: AtomicUsize,
}

impl std::fmt::Debug for SafeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeCache")
            .field("serialized", &self.lock.is_some())
            .field("faults", &self.faults())
            .finish()
    }
}

impl SafeCache {
    pub fn new(inner: Arc<dyn Cache>, serialize_access: bool) -> Self {
        Self {
            inner,
            lock: serialize_access.then(Mutex::default),
            faults: AtomicUsize::new(0),
        }
    }

    /// The number of failed operations so far.
    pub fn faults(&self) -> usize {
        self.faults.load(Ordering::Relaxed)
    }

    pub fn init(&self) {
        self.guard(CacheOp::Init, None, |cache| cache.init());
    }

    /// Looks up `key`. Failures are reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.guard(CacheOp::Get, Some(key), |cache| cache.get(key))
            .flatten()
    }

    pub fn put(&self, key: &CacheKey, entry: CacheEntry) {
        self.guard(CacheOp::Put, Some(key), |cache| cache.put(key, entry));
    }

    pub fn remove(&self, key: &CacheKey) {
        self.guard(CacheOp::Remove, Some(key), |cache| cache.remove(key));
    }

    pub fn remove_all(&self, request: RequestType) {
        self.guard(CacheOp::RemoveAll, None, |cache| cache.remove_all(request));
    }

    pub fn clear(&self) {
        self.guard(CacheOp::Clear, None, |cache| cache.clear());
    }

    fn guard<T, F>(&self, op: CacheOp, key: Option<&CacheKey>, f: F) -> Option<T>
    where
        F: FnOnce(&dyn Cache) -> Result<T, CacheError>,
    {
        let _serialized = self
            .lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));

        let result = panic::catch_unwind(AssertUnwindSafe(|| f(self.inner.as_ref())))
            .unwrap_or_else(|payload| Err(CacheError::from_panic(payload)));

        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.record_fault(op, key, &error);
                None
            }
        }
    }

    fn record_fault(&self, op: CacheOp, key: Option<&CacheKey>, error: &CacheError) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        metric!(counter("cache.fault") += 1, "op" => op.as_str());

        let error = error as &dyn std::error::Error;
        match key {
            Some(key) => {
                tracing::error!(error, op = op.as_str(), %key, "Cache operation failed")
            }
            None => tracing::error!(error, op = op.as_str(), "Cache operation failed"),
        }
    }
}
