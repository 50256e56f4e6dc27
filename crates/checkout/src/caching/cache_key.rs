use std::fmt;
use std::sync::Arc;

use crate::products::ProductType;

/// The kind of request a cache entry stores the result of.
///
/// Each request type reserves its own key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RequestType {
    /// Purchase lists, one entry per product type.
    Purchases,
}

impl RequestType {
    pub fn namespace(self) -> &'static str {
        match self {
            RequestType::Purchases => "purchases",
        }
    }
}

/// Identifies a [`CacheEntry`](super::CacheEntry).
///
/// Keys display as `<namespace>_<key>`, e.g. `purchases_inapp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    request: RequestType,
    key: Arc<str>,
}

impl CacheKey {
    pub fn new(request: RequestType, key: impl Into<Arc<str>>) -> Self {
        Self {
            request,
            key: key.into(),
        }
    }

    /// The key under which the purchase list of `product_type` is cached.
    pub fn for_purchases(product_type: ProductType) -> Self {
        Self::new(RequestType::Purchases, product_type.as_str())
    }

    pub fn request(&self) -> RequestType {
        self.request
    }

    /// The key within the request type's namespace.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.request.namespace(), self.key)
    }
}
