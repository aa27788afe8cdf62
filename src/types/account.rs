use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub kind: String,
    pub amount: f64,
    pub currency: String,
    pub created_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// Refund request; at least one of the identifying fields must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub iccid: Option<String>,
    pub bundle_name: Option<String>,
    pub order_reference: Option<String>,
    pub reason: Option<String>,
}

impl RefundRequest {
    pub fn is_empty(&self) -> bool {
        self.iccid.is_none() && self.bundle_name.is_none() && self.order_reference.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub accepted: bool,
    pub refund_id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub message: Option<String>,
}

/// Outcome of removing a bundle from an eSIM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRevocation {
    pub iccid: String,
    pub bundle: String,
    pub refunded_amount: Option<f64>,
    pub currency: Option<String>,
    pub message: Option<String>,
}
