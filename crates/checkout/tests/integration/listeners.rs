use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use checkout::config::Config;
use checkout::inventory::{Inventory, InventoryLoader};
use checkout::products::ProductType;

use crate::{scenario_backend, start_checkout, wait_loaded};

#[tokio::test]
async fn test_every_listener_is_invoked_once() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(20)));
    let checkout = start_checkout(backend, None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let handle = loader.load();

    let calls = Arc::new(AtomicUsize::new(0));
    let listener = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move |inventory: Arc<Inventory>| {
            assert!(inventory.is_loaded());
            calls.fetch_add(1, Ordering::SeqCst);
        }
    };

    handle
        .when_loaded(listener(&calls))
        .when_loaded(listener(&calls))
        .when_loaded(listener(&calls));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    wait_loaded(&handle).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    handle.when_loaded(listener(&calls));
    loader.load().when_loaded(listener(&calls));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_late_listener_replays_snapshot() {
    checkout_test::setup();
    let checkout = start_checkout(Arc::new(scenario_backend()), None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let handle = loader.load();
    let early = wait_loaded(&handle).await;
    assert!(handle.is_loaded());

    let late = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&late);
    handle.when_loaded(move |inventory| *slot.lock().unwrap() = Some(inventory));

    // invoked synchronously, before `when_loaded` returns
    let late = late.lock().unwrap().take().expect("listener was not invoked");
    assert!(Arc::ptr_eq(&early, &late));
    assert_eq!(*early, *late);
}

#[tokio::test]
async fn test_listeners_run_in_registration_order() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(20)));
    let checkout = start_checkout(backend, None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let handle = loader.load();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
        let order = Arc::clone(&order);
        handle.when_loaded(move |_| order.lock().unwrap().push(i));
    }

    wait_loaded(&handle).await;
    assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_panicking_listener_does_not_affect_others() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(20)));
    let checkout = start_checkout(backend, None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let handle = loader.load();
    let invoked = Arc::new(AtomicUsize::new(0));

    handle.when_loaded(|_| panic!("listener failed"));
    let counter = Arc::clone(&invoked);
    handle.when_loaded(move |inventory| {
        assert!(inventory.get(ProductType::InApp).is_some());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    wait_loaded(&handle).await;
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert!(loader.is_loaded());

    // the same goes for replayed listeners
    handle.when_loaded(|_| panic!("listener failed again"));
    let counter = Arc::clone(&invoked);
    handle.when_loaded(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(invoked.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_listeners_run_before_loaded_is_observable() {
    checkout_test::setup();
    let backend = Arc::new(scenario_backend().with_latency(Duration::from_millis(20)));
    let checkout = start_checkout(backend, None, Config::default());

    let loader = InventoryLoader::new(checkout);
    let handle = loader.load();
    let observed = Arc::new(Mutex::new(None));

    let inner = handle.clone();
    let slot = Arc::clone(&observed);
    handle.when_loaded(move |inventory| {
        assert!(inventory.is_loaded());
        *slot.lock().unwrap() = Some(inner.is_loaded());
    });

    wait_loaded(&handle).await;
    assert_eq!(*observed.lock().unwrap(), Some(false));
    assert!(handle.is_loaded());
    assert!(loader.is_loaded());
}
