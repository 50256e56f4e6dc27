//! Purchases as reported by the billing backend.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The state of a [`Purchase`], with the numeric codes used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurchaseState {
    Purchased,
    Cancelled,
    Refunded,
    Expired,
}

impl PurchaseState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PurchaseState::Purchased),
            1 => Some(PurchaseState::Cancelled),
            2 => Some(PurchaseState::Refunded),
            3 => Some(PurchaseState::Expired),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PurchaseState::Purchased => 0,
            PurchaseState::Cancelled => 1,
            PurchaseState::Refunded => 2,
            PurchaseState::Expired => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("malformed purchase data")]
    Json(#[from] serde_json::Error),
    #[error("unknown purchase state {0}")]
    UnknownState(i32),
}

/// A purchase exactly as the backend delivered it: the JSON data and its signature.
///
/// This is also the form in which purchases are written to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPurchase {
    pub data: String,
    pub signature: String,
}

impl RawPurchase {
    pub fn new(data: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            signature: signature.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseJson {
    product_id: String,
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    package_name: String,
    #[serde(default)]
    purchase_time: u64,
    #[serde(default)]
    purchase_state: i32,
    #[serde(default)]
    developer_payload: String,
    #[serde(default, alias = "token")]
    purchase_token: String,
    #[serde(default)]
    auto_renewing: bool,
}

/// One owned item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    /// The product identifier.
    pub sku: String,
    pub order_id: String,
    pub package_name: String,
    /// Purchase time in milliseconds since the epoch.
    pub time: u64,
    pub state: PurchaseState,
    pub payload: String,
    /// Opaque token assigned by the backend.
    pub token: String,
    pub auto_renewing: bool,
    /// The raw JSON this purchase was parsed from.
    pub data: String,
    pub signature: String,
}

impl Purchase {
    /// Parses a purchase from the backend's JSON representation.
    pub fn from_json(data: &str, signature: &str) -> Result<Self, PurchaseError> {
        let json: PurchaseJson = serde_json::from_str(data)?;
        let state = PurchaseState::from_code(json.purchase_state)
            .ok_or(PurchaseError::UnknownState(json.purchase_state))?;

        Ok(Purchase {
            sku: json.product_id,
            order_id: json.order_id,
            package_name: json.package_name,
            time: json.purchase_time,
            state,
            payload: json.developer_payload,
            token: json.purchase_token,
            auto_renewing: json.auto_renewing,
            data: data.to_owned(),
            signature: signature.to_owned(),
        })
    }

    pub fn from_raw(raw: &RawPurchase) -> Result<Self, PurchaseError> {
        Self::from_json(&raw.data, &raw.signature)
    }

    pub fn to_raw(&self) -> RawPurchase {
        RawPurchase::new(self.data.as_str(), self.signature.as_str())
    }
}

/// Serializes a list of purchases into a cache blob.
pub fn encode_purchases(purchases: &[Purchase]) -> Result<Bytes, PurchaseError> {
    let raw: Vec<_> = purchases.iter().map(Purchase::to_raw).collect();
    Ok(serde_json::to_vec(&raw)?.into())
}

/// Parses a cache blob written by [`encode_purchases`].
pub fn decode_purchases(bytes: &[u8]) -> Result<Vec<Purchase>, PurchaseError> {
    let raw: Vec<RawPurchase> = serde_json::from_slice(bytes)?;
    raw.iter().map(Purchase::from_raw).collect()
}
