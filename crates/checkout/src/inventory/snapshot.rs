use crate::products::ProductType;
use crate::purchase::{Purchase, PurchaseState};

/// The purchases owned for one [`ProductType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub product_type: ProductType,
    /// Whether billing is available for this product type.
    pub supported: bool,
    pub purchases: Vec<Purchase>,
}

impl Product {
    pub fn new(product_type: ProductType, purchases: Vec<Purchase>) -> Self {
        Self {
            product_type,
            supported: true,
            purchases,
        }
    }

    /// A supported product type without any purchases.
    pub fn empty(product_type: ProductType) -> Self {
        Self::new(product_type, Vec::new())
    }

    /// A product type billing is not available for.
    pub fn unsupported(product_type: ProductType) -> Self {
        Self {
            product_type,
            supported: false,
            purchases: Vec::new(),
        }
    }

    pub fn is_purchased(&self, sku: &str) -> bool {
        self.has_purchase_in_state(sku, PurchaseState::Purchased)
    }

    pub fn has_purchase_in_state(&self, sku: &str, state: PurchaseState) -> bool {
        self.purchase_in_state(sku, state).is_some()
    }

    /// Returns the latest purchase of `sku` in `state`.
    pub fn purchase_in_state(&self, sku: &str, state: PurchaseState) -> Option<&Purchase> {
        self.purchases
            .iter()
            .filter(|purchase| purchase.sku == sku && purchase.state == state)
            .max_by_key(|purchase| purchase.time)
    }
}

/// The result of one load cycle: the owned purchases of every product type.
///
/// Snapshots handed out by the [`InventoryLoader`](super::InventoryLoader) are always
/// [loaded](Self::is_loaded) and never change afterwards; a new load cycle publishes a new
/// snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    products: Vec<Product>,
    loaded: bool,
}

impl Inventory {
    /// A loaded inventory consisting of `products`.
    ///
    /// This is also how a fallback inventory is constructed.
    pub fn loaded(products: Vec<Product>) -> Self {
        Self {
            products,
            loaded: true,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, product_type: ProductType) -> Option<&Product> {
        self.products
            .iter()
            .find(|product| product.product_type == product_type)
    }

    /// Iterates over the products in the order of the [`Products`](crate::products::Products)
    /// they were loaded for.
    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.iter()
    }

    pub fn is_purchased(&self, sku: &str) -> bool {
        self.iter().any(|product| product.is_purchased(sku))
    }

    pub fn has_purchase_in_state(&self, sku: &str, state: PurchaseState) -> bool {
        self.purchase_in_state(sku, state).is_some()
    }

    pub fn purchase_in_state(&self, sku: &str, state: PurchaseState) -> Option<&Purchase> {
        self.iter()
            .find_map(|product| product.purchase_in_state(sku, state))
    }
}
