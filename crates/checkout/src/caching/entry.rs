use std::time::{Duration, Instant};

use bytes::Bytes;

/// Upper bound for entry lifetimes, so that `Instant` arithmetic cannot overflow.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// An opaque blob stored in a [`Cache`](super::Cache), together with its expiration deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub data: Bytes,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(data: impl Into<Bytes>, expires_at: Instant) -> Self {
        Self {
            data: data.into(),
            expires_at,
        }
    }

    /// Creates an entry that expires `ttl` from now.
    pub fn with_ttl(data: impl Into<Bytes>, ttl: Duration) -> Self {
        Self::new(data, Instant::now() + ttl.min(MAX_TTL))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}
