//! Product types and the set of product identifiers a [`Checkout`](crate::billing::Checkout)
//! works with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The classification of purchasable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductType {
    /// One-time purchases.
    #[serde(rename = "inapp")]
    InApp,
    /// Recurring purchases.
    #[serde(rename = "subs")]
    Subscription,
}

impl ProductType {
    /// All product types, in their canonical order.
    pub const ALL: [ProductType; 2] = [ProductType::InApp, ProductType::Subscription];

    /// The tag the backend uses for this product type.
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::InApp => "inapp",
            ProductType::Subscription => "subs",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown product type: {0}")]
pub struct UnknownProductType(String);

impl FromStr for ProductType {
    type Err = UnknownProductType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inapp" => Ok(ProductType::InApp),
            "subs" => Ok(ProductType::Subscription),
            other => Err(UnknownProductType(other.to_owned())),
        }
    }
}

/// Product identifiers grouped by [`ProductType`].
///
/// Both the product types and the identifiers within one type keep their insertion order, and
/// identifiers are unique within a type. The set is built once and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Products {
    entries: Vec<(ProductType, Vec<String>)>,
}

impl Products {
    pub fn create() -> Self {
        Self::default()
    }

    /// Adds the given identifiers to `product_type`.
    ///
    /// Adding to a type that is already present appends to it, skipping duplicates.
    pub fn add<I, S>(mut self, product_type: ProductType, skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = match self.entries.iter().position(|(ty, _)| *ty == product_type) {
            Some(index) => index,
            None => {
                self.entries.push((product_type, Vec::new()));
                self.entries.len() - 1
            }
        };

        if let Some((_, existing)) = self.entries.get_mut(index) {
            for sku in skus {
                let sku = sku.into();
                if !existing.contains(&sku) {
                    existing.push(sku);
                }
            }
        }
        self
    }

    /// Iterates over the product types in insertion order.
    pub fn types(&self) -> impl Iterator<Item = ProductType> + '_ {
        self.entries.iter().map(|(ty, _)| *ty)
    }

    /// Returns the identifiers registered for `product_type`.
    pub fn skus(&self, product_type: ProductType) -> &[String] {
        self.entries
            .iter()
            .find(|(ty, _)| *ty == product_type)
            .map(|(_, skus)| skus.as_slice())
            .unwrap_or_default()
    }

    pub fn contains(&self, product_type: ProductType) -> bool {
        self.types().any(|ty| ty == product_type)
    }

    /// The number of product types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
