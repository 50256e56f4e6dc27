use async_trait::async_trait;

use crate::products::ProductType;
use crate::purchase::RawPurchase;

use super::BillingError;

/// One page of purchases returned by [`BillingBackend::get_purchases`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchasesPage {
    pub purchases: Vec<RawPurchase>,
    /// Token to request the next page with, `None` on the last page.
    pub continuation: Option<String>,
}

/// The billing service the [`Checkout`](super::Checkout) talks to.
///
/// Implementations own the transport; the checkout owns the connection lifecycle, timeouts and
/// the parsing of purchases.
#[async_trait]
pub trait BillingBackend: Send + Sync + 'static {
    /// Establishes the connection to the billing service.
    async fn connect(&self) -> Result<(), BillingError>;

    /// Tears the connection down again.
    async fn disconnect(&self) {}

    /// Whether billing is available for `product_type`.
    async fn is_billing_supported(&self, product_type: ProductType) -> Result<bool, BillingError>;

    /// Fetches one page of the purchases owned for `product_type`.
    ///
    /// `continuation` is `None` for the first page, and the token of the previous page after that.
    async fn get_purchases(
        &self,
        product_type: ProductType,
        continuation: Option<String>,
    ) -> Result<PurchasesPage, BillingError>;
}
