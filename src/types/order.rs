use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrderStatus, PageRequest};

/// One package line of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub package_id: String,
    pub quantity: u32,
}

/// Purchase request for one or more packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    /// Existing eSIMs to top up; empty to provision new profiles.
    #[serde(default)]
    pub iccids: Vec<String>,
    /// Attach the purchased bundles to eSIMs right away.
    #[serde(default = "default_assign")]
    pub assign: bool,
    #[serde(default)]
    pub allow_reassign: bool,
    /// Caller-side reference echoed back on the order.
    pub reference: Option<String>,
}

fn default_assign() -> bool {
    true
}

impl CreateOrderRequest {
    pub fn single(package_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            items: vec![OrderLine {
                package_id: package_id.into(),
                quantity,
            }],
            iccids: Vec::new(),
            assign: true,
            allow_reassign: false,
            reference: None,
        }
    }
}

/// Activation data of an eSIM delivered by an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEsim {
    pub iccid: String,
    pub matching_id: Option<String>,
    pub smdp_address: Option<String>,
    /// Full LPA activation string (`LPA:1$...`).
    pub activation_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub package_id: String,
    pub quantity: u32,
    pub unit_price: Option<f64>,
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub esims: Vec<OrderEsim>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Vendor order reference. Absent only for sandbox validation orders, which the
    /// vendor checks without booking.
    pub id: Option<String>,
    /// Every vendor order booked for this order, `id` first. Vendors that sell one
    /// unit per call book several.
    #[serde(default)]
    pub vendor_order_ids: Vec<String>,
    pub status: OrderStatus,
    pub status_message: Option<String>,
    pub items: Vec<OrderItem>,
    pub total: Option<f64>,
    pub currency: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub assigned: bool,
    pub reference: Option<String>,
}

/// Filters for `list_orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub page: PageRequest,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Ask the vendor to include eSIM activation data in each order.
    #[serde(default)]
    pub include_esims: bool,
}
