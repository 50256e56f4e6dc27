//! Helpers for testing the checkout and the inventory loader.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - [`MockBilling`] is shared with the [`Checkout`](checkout::billing::Checkout) as an `Arc`.
//!    Hold on to a clone of it to seed purchases, inject failures, and inspect query counts while
//!    the checkout is in use.
//!
//!  - [`FailingCache`] only fails the operations it was configured to fail. Everything else is
//!    served by an in-memory cache, so cache contents can still be asserted on.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use checkout::billing::{BillingBackend, BillingError, PurchasesPage};
use checkout::caching::{Cache, CacheEntry, CacheError, CacheKey, MemoryCache, RequestType};
use checkout::products::ProductType;
use checkout::purchase::{PurchaseState, RawPurchase};

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `checkout` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("checkout=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// The signature attached to all fixture purchases.
pub const SIGNATURE: &str = "signature";

/// JSON of a one-time purchase of `sku` in `state`, as delivered by the backend.
pub fn purchase_json(sku: &str, state: PurchaseState) -> String {
    purchase_json_at(sku, state, 1_700_000_000_000)
}

/// Like [`purchase_json`], with an explicit purchase time in milliseconds.
pub fn purchase_json_at(sku: &str, state: PurchaseState, time: u64) -> String {
    serde_json::json!({
        "productId": sku,
        "orderId": format!("order-{sku}"),
        "packageName": "com.example.app",
        "purchaseTime": time,
        "purchaseState": state.code(),
        "developerPayload": "",
        "purchaseToken": format!("token-{sku}"),
    })
    .to_string()
}

/// JSON of an auto-renewing subscription of `sku` in `state`.
pub fn subscription_json(sku: &str, state: PurchaseState) -> String {
    serde_json::json!({
        "productId": sku,
        "orderId": format!("order-{sku}"),
        "packageName": "com.example.app",
        "purchaseTime": 1_700_000_000_000u64,
        "purchaseState": state.code(),
        "purchaseToken": format!("token-{sku}"),
        "autoRenewing": true,
    })
    .to_string()
}

/// Wraps fixture JSON into a signed [`RawPurchase`].
pub fn raw(json: impl Into<String>) -> RawPurchase {
    RawPurchase::new(json, SIGNATURE)
}

/// Purchased, cancelled, refunded and expired purchases of `skus`, in that order.
///
/// Subscriptions are created for [`ProductType::Subscription`].
pub fn purchases_in_all_states(product_type: ProductType, skus: &[&str]) -> Vec<RawPurchase> {
    const STATES: [PurchaseState; 4] = [
        PurchaseState::Purchased,
        PurchaseState::Cancelled,
        PurchaseState::Refunded,
        PurchaseState::Expired,
    ];

    skus.iter()
        .zip(STATES.iter().cycle())
        .map(|(sku, &state)| match product_type {
            ProductType::InApp => raw(purchase_json(sku, state)),
            ProductType::Subscription => raw(subscription_json(sku, state)),
        })
        .collect()
}

#[derive(Default)]
struct MockState {
    purchases: HashMap<ProductType, Vec<RawPurchase>>,
    failures: HashMap<ProductType, BillingError>,
    hanging: HashSet<ProductType>,
    unsupported: HashSet<ProductType>,
    connect_failure: Option<BillingError>,
    page_size: Option<usize>,
    latency: Duration,
}

/// An in-memory [`BillingBackend`].
///
/// Configure it with the builder methods before handing it to a checkout, or through the `set_*`
/// methods on a shared handle afterwards.
#[derive(Default)]
pub struct MockBilling {
    state: Mutex<MockState>,
    queries: Mutex<HashMap<ProductType, usize>>,
    support_checks: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockBilling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the purchases owned for `product_type`.
    pub fn with_purchases(self, product_type: ProductType, purchases: Vec<RawPurchase>) -> Self {
        self.set_purchases(product_type, purchases);
        self
    }

    /// Fails every purchases query for `product_type` with `error`.
    pub fn with_failure(self, product_type: ProductType, error: BillingError) -> Self {
        self.set_failure(product_type, Some(error));
        self
    }

    /// Never answers purchases queries for `product_type`.
    pub fn with_hang(self, product_type: ProductType) -> Self {
        self.lock().hanging.insert(product_type);
        self
    }

    /// Reports billing as unsupported for `product_type`.
    pub fn with_unsupported(self, product_type: ProductType) -> Self {
        self.lock().unsupported.insert(product_type);
        self
    }

    pub fn with_connect_failure(self, error: BillingError) -> Self {
        self.lock().connect_failure = Some(error);
        self
    }

    /// Splits purchase lists into pages of `page_size`.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = Some(page_size.max(1));
        self
    }

    /// Delays every answer by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    pub fn set_purchases(&self, product_type: ProductType, purchases: Vec<RawPurchase>) {
        self.lock().purchases.insert(product_type, purchases);
    }

    pub fn set_failure(&self, product_type: ProductType, error: Option<BillingError>) {
        let mut state = self.lock();
        match error {
            Some(error) => state.failures.insert(product_type, error),
            None => state.failures.remove(&product_type),
        };
    }

    /// The number of purchases queries for `product_type`, not counting follow-up pages.
    pub fn queries(&self, product_type: ProductType) -> usize {
        let queries = self.queries.lock().unwrap();
        queries.get(&product_type).copied().unwrap_or_default()
    }

    pub fn support_checks(&self) -> usize {
        self.support_checks.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BillingBackend for MockBilling {
    async fn connect(&self) -> Result<(), BillingError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        match self.lock().connect_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn is_billing_supported(&self, product_type: ProductType) -> Result<bool, BillingError> {
        self.support_checks.fetch_add(1, Ordering::SeqCst);
        Ok(!self.lock().unsupported.contains(&product_type))
    }

    async fn get_purchases(
        &self,
        product_type: ProductType,
        continuation: Option<String>,
    ) -> Result<PurchasesPage, BillingError> {
        if continuation.is_none() {
            *self.queries.lock().unwrap().entry(product_type).or_default() += 1;
        }
        self.delay().await;

        let (purchases, page_size, hanging) = {
            let state = self.lock();
            if let Some(error) = state.failures.get(&product_type) {
                return Err(error.clone());
            }
            let purchases = state.purchases.get(&product_type).cloned();
            (
                purchases.unwrap_or_default(),
                state.page_size,
                state.hanging.contains(&product_type),
            )
        };
        if hanging {
            return std::future::pending().await;
        }

        let Some(page_size) = page_size else {
            return Ok(PurchasesPage {
                purchases,
                continuation: None,
            });
        };

        let offset = match continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| BillingError::Malformed(format!("bad continuation token {token}")))?,
            None => 0,
        };
        let end = (offset + page_size).min(purchases.len());
        Ok(PurchasesPage {
            purchases: purchases.get(offset..end).unwrap_or_default().to_vec(),
            continuation: (end < purchases.len()).then(|| end.to_string()),
        })
    }
}

/// How a [`FailingCache`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return a [`CacheError`].
    Error,
    /// Panic inside the cache call.
    Panic,
}

/// A [`Cache`] that fails on demand and records whether it did.
///
/// By default, it fails every `put` into the purchases namespace. Everything else is served by an
/// inner [`MemoryCache`].
pub struct FailingCache {
    inner: MemoryCache,
    mode: FailureMode,
    fail_all: bool,
    thrown: AtomicBool,
    failures: AtomicUsize,
}

impl FailingCache {
    /// Fails every `put` of a `purchases_` key.
    pub fn new(mode: FailureMode) -> Self {
        Self {
            inner: MemoryCache::default(),
            mode,
            fail_all: false,
            thrown: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
        }
    }

    /// Fails every single operation.
    pub fn failing_everything(mode: FailureMode) -> Self {
        Self {
            fail_all: true,
            ..Self::new(mode)
        }
    }

    /// Whether the cache raised a failure at least once.
    pub fn exception_thrown(&self) -> bool {
        self.thrown.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Reads the inner cache directly.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.get(key).ok().flatten()
    }

    fn fail(&self, op: &str) -> Result<(), CacheError> {
        self.thrown.store(true, Ordering::SeqCst);
        self.failures.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FailureMode::Error => Err(CacheError::Unavailable(format!("{op} refused"))),
            FailureMode::Panic => panic!("{op} refused"),
        }
    }

    fn check(&self, op: &str) -> Result<(), CacheError> {
        match self.fail_all {
            true => self.fail(op),
            false => Ok(()),
        }
    }
}

impl Cache for FailingCache {
    fn init(&self) -> Result<(), CacheError> {
        self.check("init")
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.check("get")?;
        self.inner.get(key)
    }

    fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        if key.to_string().starts_with("purchases_") {
            return self.fail("put");
        }
        self.check("put")?;
        self.inner.put(key, entry)
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.check("remove")?;
        self.inner.remove(key)
    }

    fn remove_all(&self, request: RequestType) -> Result<(), CacheError> {
        self.check("remove_all")?;
        self.inner.remove_all(request)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.check("clear")?;
        self.inner.clear()
    }
}
