use crate::billing::{BillingError, Checkout};
use crate::caching::{CacheEntry, CacheKey};
use crate::products::ProductType;
use crate::purchase::{Purchase, decode_purchases, encode_purchases};

use super::Product;

/// Resolves the [`Product`] of one product type within a load cycle.
///
/// Resolution never fails: a failed backend query resolves to the fallback inventory's product
/// or an empty product, and cache faults are absorbed by the checkout's [`SafeCache`].
///
/// [`SafeCache`]: crate::caching::SafeCache
pub(super) struct Resolver {
    checkout: Checkout,
    product_type: ProductType,
    key: CacheKey,
}

impl Resolver {
    pub fn new(checkout: Checkout, product_type: ProductType) -> Self {
        Self {
            checkout,
            product_type,
            key: CacheKey::for_purchases(product_type),
        }
    }

    pub async fn resolve(&self) -> Product {
        match self.checkout.is_billing_supported(self.product_type).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Billing is not supported");
                return Product::unsupported(self.product_type);
            }
            Err(error) => {
                let error = &error as &dyn std::error::Error;
                tracing::debug!(error, "Failed to check billing support");
            }
        }

        let cached = self.read_cache();
        if self.checkout.config().cache.trust_fresh_entries {
            if let Some(purchases) = cached {
                tracing::trace!("Resolved from cache");
                return Product::new(self.product_type, purchases);
            }
        }

        match self.checkout.load_purchases(self.product_type).await {
            Ok(purchases) => {
                self.write_cache(&purchases);
                Product::new(self.product_type, purchases)
            }
            Err(error) => self.fallback(error),
        }
    }

    /// Reads the cached purchases. Expired and undecodable entries are misses.
    fn read_cache(&self) -> Option<Vec<Purchase>> {
        let cache = self.checkout.cache()?;
        let entry = cache.get(&self.key).filter(|entry| !entry.is_expired());
        let Some(entry) = entry else {
            metric!(counter("cache.miss") += 1, "product_type" => self.product_type.as_str());
            return None;
        };

        match decode_purchases(&entry.data) {
            Ok(purchases) => {
                metric!(counter("cache.hit") += 1, "product_type" => self.product_type.as_str());
                Some(purchases)
            }
            Err(error) => {
                let error = &error as &dyn std::error::Error;
                tracing::warn!(error, key = %self.key, "Discarding corrupt cache entry");
                metric!(counter("cache.miss") += 1, "product_type" => self.product_type.as_str());
                None
            }
        }
    }

    fn write_cache(&self, purchases: &[Purchase]) {
        let Some(cache) = self.checkout.cache() else {
            return;
        };
        match encode_purchases(purchases) {
            Ok(data) => {
                let ttl = self.checkout.config().cache.purchases_ttl;
                cache.put(&self.key, CacheEntry::with_ttl(data, ttl));
            }
            Err(error) => {
                let error = &error as &dyn std::error::Error;
                tracing::error!(error, key = %self.key, "Failed to encode purchases");
            }
        }
    }

    fn fallback(&self, error: BillingError) -> Product {
        let error = &error as &dyn std::error::Error;
        tracing::warn!(error, "Failed to load purchases");
        metric!(
            counter("inventory.product.failed") += 1,
            "product_type" => self.product_type.as_str()
        );

        self.checkout
            .fallback_inventory()
            .and_then(|inventory| inventory.get(self.product_type))
            .cloned()
            .unwrap_or_else(|| Product::empty(self.product_type))
    }
}
