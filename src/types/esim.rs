use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BundleStatus, EsimStatus, OrderEsim, PageRequest};

/// eSIM profile owned by the reseller account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ESim {
    pub iccid: String,
    pub eid: Option<String>,
    pub status: EsimStatus,
    pub activation_code: Option<String>,
    pub smdp_address: Option<String>,
    pub matching_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Bundles attached to the profile, when the vendor returns them inline.
    #[serde(default)]
    pub bundles: Vec<AssignedBundle>,
}

/// Bundle attached to an eSIM, with its remaining allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedBundle {
    pub name: String,
    pub package_id: Option<String>,
    pub status: BundleStatus,
    pub data_total_mb: Option<u64>,
    pub data_remaining_mb: Option<u64>,
    pub unlimited: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AssignedBundle {
    /// Data consumed so far, derived from the total and remaining allowance.
    pub fn data_used_mb(&self) -> Option<u64> {
        match (self.data_total_mb, self.data_remaining_mb) {
            (Some(total), Some(remaining)) => Some(total.saturating_sub(remaining)),
            _ => None,
        }
    }
}

/// Filters for `list_esims`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsimQuery {
    #[serde(default)]
    pub page: PageRequest,
    /// ICCID or ICCID fragment.
    pub iccid: Option<String>,
}

/// Request to put a package on an eSIM, or on a fresh one when `iccid` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyBundleRequest {
    pub package_id: String,
    pub iccid: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyBundleResult {
    pub order_reference: Option<String>,
    pub esims: Vec<OrderEsim>,
}

/// Aggregated data usage of an eSIM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub iccid: String,
    pub bundle: Option<String>,
    pub data_used_mb: Option<u64>,
    /// `None` when any contributing bundle is unlimited.
    pub data_remaining_mb: Option<u64>,
    pub data_total_mb: Option<u64>,
    pub unlimited: bool,
    pub active: bool,
}

/// Lifecycle event recorded by the vendor for an eSIM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsimHistoryEvent {
    pub occurred_at: Option<DateTime<Utc>>,
    pub kind: String,
    pub description: Option<String>,
    pub bundle: Option<String>,
    pub metadata: Option<Value>,
}
