use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::utils::panic_message;

use super::Inventory;

/// A callback waiting for a loaded [`Inventory`].
pub type Listener = Box<dyn FnOnce(Arc<Inventory>) + Send + 'static>;

enum Registry {
    /// Listeners waiting for the load to complete, in registration order.
    Pending(Vec<Listener>),
    Completed(Arc<Inventory>),
    /// The load was cancelled; listeners are dropped without being invoked.
    Disposed,
}

/// Listeners of a single load cycle.
///
/// Every listener is invoked exactly once: queued listeners when the cycle completes, and
/// listeners registered afterwards immediately on the registering thread.
pub(super) struct Listeners {
    registry: Mutex<Registry>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::Pending(Vec::new())),
        }
    }

    pub fn register(&self, listener: Listener) {
        let mut registry = self.lock();
        match &mut *registry {
            Registry::Pending(listeners) => listeners.push(listener),
            Registry::Completed(inventory) => {
                let inventory = Arc::clone(inventory);
                drop(registry);
                invoke(listener, inventory);
            }
            Registry::Disposed => {
                tracing::debug!("Ignoring listener registered on a cancelled inventory load")
            }
        }
    }

    /// Publishes `inventory` and invokes all queued listeners.
    ///
    /// Returns `false` without doing anything if the cycle was already completed or disposed.
    pub fn complete(&self, inventory: Arc<Inventory>) -> bool {
        let listeners = {
            let mut registry = self.lock();
            let Registry::Pending(listeners) = &mut *registry else {
                return false;
            };
            let listeners = mem::take(listeners);
            *registry = Registry::Completed(Arc::clone(&inventory));
            listeners
        };

        for listener in listeners {
            invoke(listener, Arc::clone(&inventory));
        }
        true
    }

    /// Drops all queued listeners without invoking them.
    ///
    /// Returns `false` if the cycle was already completed or disposed.
    pub fn dispose(&self) -> bool {
        let dropped = {
            let mut registry = self.lock();
            match mem::replace(&mut *registry, Registry::Disposed) {
                Registry::Pending(listeners) => listeners,
                other => {
                    *registry = other;
                    return false;
                }
            }
        };
        tracing::debug!(count = dropped.len(), "Dropping pending inventory listeners");
        true
    }

    pub fn snapshot(&self) -> Option<Arc<Inventory>> {
        match &*self.lock() {
            Registry::Completed(inventory) => Some(Arc::clone(inventory)),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Invokes `listener`, containing any panic so that the remaining listeners still run.
fn invoke(listener: Listener, inventory: Arc<Inventory>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || listener(inventory))) {
        tracing::error!(
            panic = panic_message(payload.as_ref()),
            "Inventory listener panicked"
        );
    }
}
