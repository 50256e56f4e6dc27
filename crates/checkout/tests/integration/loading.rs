use std::sync::Arc;
use std::time::Duration;

use checkout::billing::{BillingError, Checkout};
use checkout::config::Config;
use checkout::inventory::{Inventory, InventoryLoader, Product};
use checkout::products::{ProductType, Products};
use checkout::purchase::{Purchase, PurchaseState};
use checkout_test::{MockBilling, purchase_json, raw};

use crate::{purchase_states, scenario_backend, start_checkout, wait_loaded};

#[tokio::test]
async fn test_failed_product_type_resolves_empty() {
    checkout_test::setup();
    let backend = Arc::new(
        scenario_backend().with_failure(ProductType::InApp, BillingError::Billing { code: 6 }),
    );
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    assert!(inventory.is_loaded());
    let in_app = inventory.get(ProductType::InApp).unwrap();
    assert!(in_app.supported);
    assert!(in_app.purchases.is_empty());
    assert_eq!(purchase_states(&inventory, ProductType::Subscription).len(), 4);
}

#[tokio::test]
async fn test_fallback_inventory() {
    checkout_test::setup();
    let backend = Arc::new(
        scenario_backend()
            .with_failure(ProductType::InApp, BillingError::ServiceUnavailable)
            .with_failure(ProductType::Subscription, BillingError::ServiceUnavailable),
    );
    let fallback_purchase =
        Purchase::from_raw(&raw(purchase_json("1", PurchaseState::Purchased))).unwrap();
    let fallback = Inventory::loaded(vec![Product::new(
        ProductType::InApp,
        vec![fallback_purchase],
    )]);

    let checkout = Checkout::builder(backend, crate::scenario_products())
        .fallback_inventory(Arc::new(fallback))
        .build();
    checkout.start();

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    // product types missing from the fallback still resolve empty
    assert_eq!(purchase_states(&inventory, ProductType::InApp), ["1: Purchased"]);
    assert!(purchase_states(&inventory, ProductType::Subscription).is_empty());
}

#[tokio::test]
async fn test_unsupported_product_type() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_unsupported(ProductType::Subscription));
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    let subscriptions = inventory.get(ProductType::Subscription).unwrap();
    assert!(!subscriptions.supported);
    assert!(subscriptions.purchases.is_empty());
    assert_eq!(backend.queries(ProductType::Subscription), 0);
    assert_eq!(backend.queries(ProductType::InApp), 1);
    assert_eq!(backend.support_checks(), 2);
}

#[tokio::test]
async fn test_checkout_not_started() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend());
    let checkout = Checkout::new(Config::default(), backend.clone(), crate::scenario_products());

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    assert!(inventory.is_loaded());
    assert!(inventory.iter().all(|product| product.purchases.is_empty()));
    assert_eq!(backend.queries(ProductType::InApp), 0);
    assert_eq!(backend.connects(), 0);
}

#[tokio::test]
async fn test_concurrent_loads_coalesce() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(50)));
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let first = loader.load();
    let second = loader.load();
    assert!(first.same_cycle(&second));
    assert!(!loader.is_loaded());

    let (a, b) = tokio::join!(wait_loaded(&first), wait_loaded(&second));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(backend.queries(ProductType::InApp), 1);
    assert_eq!(backend.queries(ProductType::Subscription), 1);

    // loading again replays the snapshot without querying
    let third = loader.load();
    assert!(third.same_cycle(&first));
    assert!(third.is_loaded());
    assert!(Arc::ptr_eq(&third.snapshot().unwrap(), &a));
    assert_eq!(backend.queries(ProductType::InApp), 1);
}

#[tokio::test]
async fn test_reload_publishes_new_snapshot() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(50)));
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    assert!(loader.last_snapshot().is_none());
    let first = wait_loaded(&loader.load()).await;
    assert!(first.is_purchased("1"));

    backend.set_purchases(
        ProductType::InApp,
        vec![raw(purchase_json("9", PurchaseState::Purchased))],
    );
    let reloading = loader.reload();
    assert!(reloading.same_cycle(&loader.reload()));
    assert!(!loader.is_loaded());
    assert!(Arc::ptr_eq(&loader.last_snapshot().unwrap(), &first));

    let second = wait_loaded(&reloading).await;
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_purchased("9"));
    assert!(!second.is_purchased("1"));
    // the published snapshot is left untouched
    assert!(first.is_purchased("1"));
    assert!(Arc::ptr_eq(&loader.last_snapshot().unwrap(), &second));
    assert_eq!(backend.queries(ProductType::InApp), 2);
}

#[tokio::test]
async fn test_request_timeout_resolves_empty() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_hang(ProductType::Subscription));
    let config = Config {
        request_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let checkout = start_checkout(backend, None, config);

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    assert_eq!(purchase_states(&inventory, ProductType::InApp).len(), 4);
    assert!(purchase_states(&inventory, ProductType::Subscription).is_empty());
}

#[tokio::test]
async fn test_paged_purchases() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_page_size(3));
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    assert_eq!(purchase_states(&inventory, ProductType::InApp).len(), 4);
    assert_eq!(purchase_states(&inventory, ProductType::Subscription).len(), 4);
    assert_eq!(backend.queries(ProductType::InApp), 1);
}

#[tokio::test]
async fn test_snapshot_follows_product_order() {
    checkout_test::setup();
    let backend = Arc::new(
        MockBilling::new()
            .with_purchases(
                ProductType::InApp,
                vec![raw(purchase_json("1", PurchaseState::Purchased))],
            )
            .with_latency(Duration::from_millis(10)),
    );
    let products = Products::create()
        .add(ProductType::Subscription, ["s1"])
        .add(ProductType::InApp, ["1"]);
    let checkout = Checkout::new(Config::default(), backend, products);
    checkout.start();

    let loader = InventoryLoader::new(checkout);
    let inventory = wait_loaded(&loader.load()).await;

    let types: Vec<_> = inventory.iter().map(|product| product.product_type).collect();
    assert_eq!(types, [ProductType::Subscription, ProductType::InApp]);
    assert!(inventory.is_purchased("1"));
}

#[tokio::test]
async fn test_empty_products_load_immediately() {
    checkout_test::setup();
    let backend = Arc::new(MockBilling::new());
    let checkout = Checkout::new(Config::default(), backend.clone(), Products::create());
    checkout.start();

    let loader = InventoryLoader::new(checkout);
    let handle = loader.load();

    assert!(handle.is_loaded());
    assert!(loader.is_loaded());
    assert_eq!(handle.snapshot().unwrap().iter().count(), 0);
    assert_eq!(backend.support_checks(), 0);
}

#[tokio::test]
async fn test_cancel() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(100)));
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let cancelled = loader.load();
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    cancelled.when_loaded(move |inventory| {
        sender.send(inventory).ok();
    });

    loader.cancel();
    assert!(!loader.is_loaded());
    assert!(cancelled.loaded().await.is_none());

    // results arriving after cancellation are discarded and the listener was dropped
    assert!(receiver.recv().await.is_none());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!cancelled.is_loaded());
    assert!(cancelled.snapshot().is_none());
    assert!(loader.last_snapshot().is_none());

    // the loader is idle again
    let handle = loader.load();
    assert!(!handle.same_cycle(&cancelled));
    let inventory = wait_loaded(&handle).await;
    assert_eq!(purchase_states(&inventory, ProductType::InApp).len(), 4);
}

#[tokio::test]
async fn test_unreachable_service_and_recovery() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_connect_failure(BillingError::ServiceUnavailable));
    let checkout = start_checkout(backend.clone(), None, Config::default());

    let loader = InventoryLoader::new(checkout.clone());
    let inventory = wait_loaded(&loader.load()).await;
    assert!(inventory.iter().all(|product| product.purchases.is_empty()));
    assert!(backend.connects() >= 1);

    checkout.stop().await;
    assert_eq!(backend.disconnects(), 0);

    let backend = Arc::new(scenario_backend());
    let checkout = start_checkout(backend.clone(), None, Config::default());
    let loader = InventoryLoader::new(checkout.clone());
    wait_loaded(&loader.load()).await;
    assert_eq!(backend.connects(), 1);

    checkout.stop().await;
    assert_eq!(backend.disconnects(), 1);
}

#[test]
fn test_load_outside_of_runtime() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend());
    let checkout = start_checkout(backend.clone(), None, Config::default());
    let loader = InventoryLoader::new(checkout);

    let handle = loader.load();
    assert!(handle.is_loaded());
    let inventory = handle.snapshot().unwrap();
    assert!(inventory.iter().all(|product| product.purchases.is_empty()));
    assert_eq!(inventory.iter().count(), 2);

    // the loader stays idle and loads normally once a runtime is available
    assert!(!loader.is_loaded());
    assert!(loader.last_snapshot().is_none());
    assert_eq!(backend.queries(ProductType::InApp), 0);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let inventory = runtime.block_on(async {
        let handle = loader.load();
        wait_loaded(&handle).await
    });
    assert_eq!(purchase_states(&inventory, ProductType::InApp).len(), 4);
    assert!(loader.is_loaded());
}
