use std::time::Duration;

use thiserror::Error;

use crate::purchase::PurchaseError;

/// A failed request against the billing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// The [`Checkout`](super::Checkout) was not started, or was stopped.
    #[error("checkout is not started")]
    NotReady,
    /// The billing service could not be reached or bound.
    #[error("billing service unavailable")]
    ServiceUnavailable,
    /// The backend answered with a non-success response code.
    #[error("billing request failed with response code {code}")]
    Billing { code: i32 },
    /// Connection loss or another transport problem.
    #[error("network error: {0}")]
    Network(String),
    /// The backend's response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The request did not finish within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<PurchaseError> for BillingError {
    fn from(err: PurchaseError) -> Self {
        Self::Malformed(err.to_string())
    }
}
