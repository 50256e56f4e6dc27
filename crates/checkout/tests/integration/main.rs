use std::sync::Arc;
use std::time::Duration;

use checkout::billing::Checkout;
use checkout::caching::Cache;
use checkout::config::Config;
use checkout::inventory::{Inventory, LoadHandle};
use checkout::products::{ProductType, Products};
use checkout_test::{MockBilling, purchases_in_all_states};

mod listeners;
mod loading;

/// How long a load may take before a test gives up on it.
const LOAD_TIMEOUT: Duration = Duration::from_secs(1);

const SKUS: [&str; 4] = ["1", "2", "3", "4"];
const SUBSCRIPTION_SKUS: [&str; 4] = ["s1", "s2", "s3", "s4"];

/// Four one-time products and four subscriptions.
pub fn scenario_products() -> Products {
    Products::create()
        .add(ProductType::InApp, SKUS)
        .add(ProductType::Subscription, SUBSCRIPTION_SKUS)
}

/// A backend owning every scenario product, in all four purchase states.
pub fn scenario_backend() -> MockBilling {
    MockBilling::new()
        .with_purchases(
            ProductType::InApp,
            purchases_in_all_states(ProductType::InApp, &SKUS),
        )
        .with_purchases(
            ProductType::Subscription,
            purchases_in_all_states(ProductType::Subscription, &SUBSCRIPTION_SKUS),
        )
}

/// Creates and starts a checkout for the scenario products.
pub fn start_checkout(
    backend: Arc<MockBilling>,
    cache: Option<Arc<dyn Cache>>,
    config: Config,
) -> Checkout {
    let mut builder = Checkout::builder(backend, scenario_products()).config(config);
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    let checkout = builder.build();
    checkout.start();
    checkout
}

/// Waits for `handle` to load, failing the test after [`LOAD_TIMEOUT`].
pub async fn wait_loaded(handle: &LoadHandle) -> Arc<Inventory> {
    tokio::time::timeout(LOAD_TIMEOUT, handle.loaded())
        .await
        .expect("inventory did not load in time")
        .expect("inventory load was cancelled")
}

/// Renders the purchases of `product_type` as `sku: state` lines.
pub fn purchase_states(inventory: &Inventory, product_type: ProductType) -> Vec<String> {
    inventory
        .get(product_type)
        .map(|product| {
            product
                .purchases
                .iter()
                .map(|purchase| format!("{}: {:?}", purchase.sku, purchase.state))
                .collect()
        })
        .unwrap_or_default()
}
