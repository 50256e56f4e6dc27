//! Loading the [`Inventory`] of the current account.
//!
//! An [`InventoryLoader`] is bound to a [`Checkout`] and loads one snapshot per load cycle:
//!
//! - [`InventoryLoader::load`] fans out one resolution task per product type of the checkout's
//!   [`Products`](crate::products::Products), and returns a [`LoadHandle`] right away.
//! - Every task reads the cache, queries the backend, and writes the fresh result back to the
//!   cache. A failed backend query resolves its product type to an empty result (or the fallback
//!   inventory's product), so one product type can never block the others.
//! - The task that resolves the last product type publishes the snapshot and invokes the
//!   listeners registered on the handle, each exactly once.
//!
//! Concurrent `load` calls share the cycle that is in flight, and `load` after completion replays
//! the published snapshot. [`InventoryLoader::reload`] starts a fresh cycle.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use sentry::{Hub, SentryFutureExt};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::billing::{BillingError, Checkout};
use crate::products::ProductType;
use crate::utils::panic_message;

mod listeners;
mod resolve;
mod snapshot;

use listeners::Listeners;
use resolve::Resolver;

pub use listeners::Listener;
pub use snapshot::{Inventory, Product};

/// Product types resolved so far in one load cycle.
struct Resolution {
    /// One slot per product type, in the order of the checkout's products.
    slots: Vec<Option<Product>>,
    pending: usize,
}

/// The state of a single load cycle.
struct LoadTask {
    cycle: u64,
    started: Instant,
    resolution: Mutex<Resolution>,
    listeners: Listeners,
    /// Set once the snapshot is published and every queued listener was invoked.
    loaded: AtomicBool,
    cancelled: AtomicBool,
}

impl LoadTask {
    fn new(cycle: u64, product_types: usize) -> Self {
        Self {
            cycle,
            started: Instant::now(),
            resolution: Mutex::new(Resolution {
                slots: vec![None; product_types],
                pending: product_types,
            }),
            listeners: Listeners::new(),
            loaded: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Records the result of the product type at `index`.
    ///
    /// The call that resolves the last outstanding product type publishes the snapshot.
    fn resolve(&self, index: usize, product: Product) {
        if self.cancelled.load(Ordering::Acquire) {
            tracing::trace!(cycle = self.cycle, "Discarding result of a cancelled load");
            return;
        }

        let products = {
            let mut resolution = self
                .resolution
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if resolution.pending == 0 {
                tracing::error!(cycle = self.cycle, index, "Product type resolved after completion");
                return;
            }
            match resolution.slots.get_mut(index) {
                Some(slot @ None) => *slot = Some(product),
                _ => {
                    tracing::error!(cycle = self.cycle, index, "Product type resolved twice");
                    return;
                }
            }
            resolution.pending -= 1;
            if resolution.pending > 0 {
                return;
            }
            resolution.slots.iter_mut().filter_map(Option::take).collect()
        };

        self.publish(Inventory::loaded(products));
    }

    fn publish(&self, inventory: Inventory) {
        if self.listeners.complete(Arc::new(inventory)) {
            self.loaded.store(true, Ordering::Release);
            metric!(timer("inventory.load.duration") = self.started.elapsed());
            tracing::debug!(cycle = self.cycle, "Inventory loaded");
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if self.listeners.dispose() {
            tracing::debug!(cycle = self.cycle, "Inventory load cancelled");
        }
    }
}

/// A handle to one load cycle of an [`InventoryLoader`].
#[derive(Clone)]
pub struct LoadHandle {
    task: Arc<LoadTask>,
}

impl std::fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadHandle")
            .field("cycle", &self.task.cycle)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl LoadHandle {
    /// Registers `listener` to be invoked with the loaded inventory.
    ///
    /// If the cycle already completed, `listener` is invoked immediately on the calling thread.
    /// Otherwise it is invoked exactly once, on the task that completes the cycle. Listeners
    /// registered on a cancelled cycle are dropped without being invoked.
    pub fn when_loaded<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(Arc<Inventory>) + Send + 'static,
    {
        self.task.listeners.register(Box::new(listener));
        self
    }

    /// Waits for the loaded inventory.
    ///
    /// Resolves to `None` if the cycle is cancelled before it completes.
    pub async fn loaded(&self) -> Option<Arc<Inventory>> {
        let (sender, receiver) = oneshot::channel();
        self.when_loaded(move |inventory| {
            sender.send(inventory).ok();
        });
        receiver.await.ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.task.is_loaded()
    }

    /// The published inventory, if the cycle completed.
    pub fn snapshot(&self) -> Option<Arc<Inventory>> {
        self.task.listeners.snapshot()
    }

    /// Whether both handles refer to the same load cycle.
    pub fn same_cycle(&self, other: &LoadHandle) -> bool {
        Arc::ptr_eq(&self.task, &other.task)
    }
}

#[derive(Default)]
struct LoaderState {
    current: Option<Arc<LoadTask>>,
    /// The cycle `current` replaced, kept to serve its snapshot while reloading.
    previous: Option<Arc<LoadTask>>,
}

/// Loads the [`Inventory`] for the products of a [`Checkout`].
pub struct InventoryLoader {
    checkout: Checkout,
    state: Mutex<LoaderState>,
    cycles: AtomicU64,
}

impl std::fmt::Debug for InventoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLoader")
            .field("checkout", &self.checkout)
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl InventoryLoader {
    pub fn new(checkout: Checkout) -> Self {
        Self {
            checkout,
            state: Mutex::default(),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    /// Starts loading the inventory, unless a load cycle already exists.
    ///
    /// While a cycle is in flight, its handle is returned again, and after it completed, the handle
    /// replays its snapshot. This never blocks; the product types are resolved on spawned tasks
    /// of the current Tokio runtime. Called outside of a runtime, the returned handle is loaded
    /// right away with every product type empty, and the loader stays idle.
    pub fn load(&self) -> LoadHandle {
        let mut state = self.lock();
        match &state.current {
            Some(task) => LoadHandle {
                task: Arc::clone(task),
            },
            None => self.start_cycle(&mut state),
        }
    }

    /// Starts a fresh load cycle that publishes a new snapshot.
    ///
    /// A cycle that is still in flight is shared instead.
    pub fn reload(&self) -> LoadHandle {
        let mut state = self.lock();
        match &state.current {
            Some(task) if !task.is_loaded() => LoadHandle {
                task: Arc::clone(task),
            },
            _ => self.start_cycle(&mut state),
        }
    }

    /// Whether the current load cycle completed.
    pub fn is_loaded(&self) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|task| task.is_loaded())
    }

    /// The most recently published inventory.
    ///
    /// While a reload is in flight, this is the snapshot of the previous cycle.
    pub fn last_snapshot(&self) -> Option<Arc<Inventory>> {
        let state = self.lock();
        state
            .current
            .iter()
            .chain(state.previous.iter())
            .find_map(|task| task.listeners.snapshot())
    }

    /// Cancels the current load cycle and returns to the idle state.
    ///
    /// Pending listeners are dropped, listeners registered on the cancelled handle later are
    /// ignored, and results still arriving from the backend are discarded. A completed cycle is
    /// not affected apart from being detached from the loader.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(task) = state.current.take() {
            task.cancel();
            if task.is_loaded() {
                state.previous = Some(task);
            }
        }
    }

    fn start_cycle(&self, state: &mut LoaderState) -> LoadHandle {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let product_types: Vec<ProductType> = self.checkout.products().types().collect();
        let task = Arc::new(LoadTask::new(cycle, product_types.len()));

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let error = &BillingError::NotReady as &dyn std::error::Error;
            tracing::warn!(error, cycle, "Cannot load the inventory outside of a runtime");
            let products = product_types.into_iter().map(Product::empty).collect();
            task.publish(Inventory::loaded(products));
            return LoadHandle { task };
        };

        if let Some(replaced) = state.current.replace(Arc::clone(&task)) {
            state.previous = Some(replaced);
        }

        metric!(counter("inventory.load") += 1);
        tracing::debug!(cycle, product_types = product_types.len(), "Loading inventory");

        if product_types.is_empty() {
            task.publish(Inventory::loaded(Vec::new()));
        }

        for (index, product_type) in product_types.into_iter().enumerate() {
            let resolver = Resolver::new(self.checkout.clone(), product_type);
            let task = Arc::clone(&task);
            let span = tracing::debug_span!("resolve_product", cycle, %product_type);
            let future = async move {
                let product = match AssertUnwindSafe(resolver.resolve()).catch_unwind().await {
                    Ok(product) => product,
                    Err(payload) => {
                        tracing::error!(
                            panic = panic_message(payload.as_ref()),
                            "Product type resolution panicked"
                        );
                        Product::empty(product_type)
                    }
                };
                task.resolve(index, product);
            };
            runtime.spawn(
                future
                    .instrument(span)
                    .bind_hub(Hub::new_from_top(Hub::current())),
            );
        }

        LoadHandle { task }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
