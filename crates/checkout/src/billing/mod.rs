//! The backend facade.
//!
//! [`Checkout`] owns the connection lifecycle to a [`BillingBackend`] and offers the per product
//! type operations the inventory is loaded with. Requests issued while the checkout is not
//! started fail fast with [`BillingError::NotReady`] instead of waiting for a connection.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use sentry::{Hub, SentryFutureExt};

use crate::caching::{Cache, MemoryCache, SafeCache};
use crate::config::Config;
use crate::inventory::Inventory;
use crate::products::{ProductType, Products};
use crate::purchase::Purchase;

mod backend;
mod error;

pub use backend::{BillingBackend, PurchasesPage};
pub use error::BillingError;

/// The lifecycle of a [`Checkout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    /// Constructed, but never started.
    Initial,
    /// Accepting requests.
    Started,
    /// Stopped; can be started again.
    Stopped,
}

struct CheckoutInner {
    config: Config,
    backend: Arc<dyn BillingBackend>,
    products: Products,
    cache: Option<SafeCache>,
    fallback: Option<Arc<Inventory>>,
    state: Mutex<CheckoutState>,
    /// Whether `backend` is currently connected.
    connected: tokio::sync::Mutex<bool>,
}

/// Facade over a [`BillingBackend`], bound to a set of [`Products`].
///
/// Cloning is cheap and yields a handle to the same checkout.
#[derive(Clone)]
pub struct Checkout {
    inner: Arc<CheckoutInner>,
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("state", &self.state())
            .field("products", &self.inner.products)
            .field("cache", &self.inner.cache)
            .field("fallback", &self.inner.fallback.is_some())
            .finish()
    }
}

/// Builds a [`Checkout`] from its configuration and collaborators.
pub struct CheckoutBuilder {
    config: Config,
    backend: Arc<dyn BillingBackend>,
    products: Products,
    cache: Option<Arc<dyn Cache>>,
    fallback: Option<Arc<Inventory>>,
}

impl CheckoutBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Uses `cache` instead of the default in-memory cache.
    ///
    /// Ignored if caching is disabled in the configuration.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Serves product types whose backend query failed from `inventory`.
    pub fn fallback_inventory(mut self, inventory: Arc<Inventory>) -> Self {
        self.fallback = Some(inventory);
        self
    }

    pub fn build(self) -> Checkout {
        let cache_config = &self.config.cache;
        let cache = match (cache_config.enabled, self.cache) {
            (true, cache) => {
                let cache = cache.unwrap_or_else(|| {
                    Arc::new(MemoryCache::new(cache_config.in_memory_capacity))
                });
                let cache = SafeCache::new(cache, cache_config.serialize_access);
                cache.init();
                Some(cache)
            }
            (false, Some(_)) => {
                tracing::warn!("Caching is disabled, ignoring the configured cache");
                None
            }
            (false, None) => None,
        };

        Checkout {
            inner: Arc::new(CheckoutInner {
                config: self.config,
                backend: self.backend,
                products: self.products,
                cache,
                fallback: self.fallback,
                state: Mutex::new(CheckoutState::Initial),
                connected: tokio::sync::Mutex::new(false),
            }),
        }
    }
}

impl Checkout {
    pub fn builder(backend: Arc<dyn BillingBackend>, products: Products) -> CheckoutBuilder {
        CheckoutBuilder {
            config: Config::default(),
            backend,
            products,
            cache: None,
            fallback: None,
        }
    }

    /// Creates a checkout with the default in-memory cache.
    pub fn new(config: Config, backend: Arc<dyn BillingBackend>, products: Products) -> Self {
        Self::builder(backend, products).config(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn products(&self) -> &Products {
        &self.inner.products
    }

    /// The failure boundary around the configured cache, if caching is enabled.
    pub fn cache(&self) -> Option<&SafeCache> {
        self.inner.cache.as_ref()
    }

    pub fn fallback_inventory(&self) -> Option<&Arc<Inventory>> {
        self.inner.fallback.as_ref()
    }

    pub fn state(&self) -> CheckoutState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_started(&self) -> bool {
        self.state() == CheckoutState::Started
    }

    /// Starts accepting requests.
    ///
    /// With `auto_connect`, the connection is established in the background right away, provided
    /// this is called within a Tokio runtime. Otherwise the first request connects.
    pub fn start(&self) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state == CheckoutState::Started {
                return;
            }
            *state = CheckoutState::Started;
        }
        tracing::debug!("Checkout started");

        if !self.inner.config.auto_connect {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime to connect on, deferring connection to the first request");
            return;
        };

        let this = self.clone();
        let task = async move {
            if let Err(error) = this.ensure_connected().await {
                let error = &error as &dyn std::error::Error;
                tracing::warn!(error, "Failed to connect to the billing service");
            }
        };
        runtime.spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
    }

    /// Stops accepting requests and disconnects from the backend.
    ///
    /// Requests that are already running are not interrupted.
    pub async fn stop(&self) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != CheckoutState::Started {
                return;
            }
            *state = CheckoutState::Stopped;
        }
        tracing::debug!("Checkout stopped");

        let mut connected = self.inner.connected.lock().await;
        if *connected {
            self.inner.backend.disconnect().await;
            *connected = false;
        }
    }

    /// Whether billing is available for `product_type`.
    pub async fn is_billing_supported(
        &self,
        product_type: ProductType,
    ) -> Result<bool, BillingError> {
        self.ensure_started()?;
        self.with_timeout(async {
            self.ensure_connected().await?;
            self.inner.backend.is_billing_supported(product_type).await
        })
        .await
    }

    /// Loads all purchases owned for `product_type`, following continuation tokens until the
    /// backend reports the last page.
    pub async fn load_purchases(
        &self,
        product_type: ProductType,
    ) -> Result<Vec<Purchase>, BillingError> {
        self.ensure_started()?;
        self.with_timeout(async {
            self.ensure_connected().await?;

            let mut purchases = Vec::new();
            let mut continuation = None;
            loop {
                let page = self
                    .inner
                    .backend
                    .get_purchases(product_type, continuation.take())
                    .await?;
                for raw in &page.purchases {
                    purchases.push(Purchase::from_raw(raw)?);
                }
                match page.continuation {
                    Some(token) if !token.is_empty() => continuation = Some(token),
                    _ => break,
                }
            }

            tracing::trace!(%product_type, count = purchases.len(), "Loaded purchases");
            Ok::<_, BillingError>(purchases)
        })
        .await
    }

    fn ensure_started(&self) -> Result<(), BillingError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(BillingError::NotReady)
        }
    }

    async fn ensure_connected(&self) -> Result<(), BillingError> {
        let mut connected = self.inner.connected.lock().await;
        if !*connected {
            self.inner.backend.connect().await?;
            *connected = true;
            tracing::debug!("Connected to the billing service");
        }
        Ok(())
    }

    async fn with_timeout<T, F>(&self, future: F) -> Result<T, BillingError>
    where
        F: Future<Output = Result<T, BillingError>>,
    {
        match self.inner.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .unwrap_or(Err(BillingError::Timeout(timeout))),
            None => future.await,
        }
    }
}
