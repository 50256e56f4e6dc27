//! Fault-tolerant, cached loading of the purchases owned by the current account.
//!
//! The entry points are [`Checkout`](billing::Checkout), which owns the connection to a
//! [`BillingBackend`](billing::BillingBackend), and the
//! [`InventoryLoader`](inventory::InventoryLoader), which fans out one purchase query per
//! [`ProductType`](products::ProductType) and publishes the merged
//! [`Inventory`](inventory::Inventory) to its listeners.

#[macro_use]
pub mod metrics;

pub mod billing;
pub mod caching;
pub mod config;
pub mod inventory;
pub mod logging;
pub mod products;
pub mod purchase;
pub mod utils;
