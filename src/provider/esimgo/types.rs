use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoCatalogue {
    pub(crate) bundles: Vec<EsimGoBundle>,
    pub(crate) total: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoBundle {
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) countries: Vec<EsimGoCountryEntry>,
    pub(crate) data_amount: Option<f64>,
    pub(crate) unlimited: Option<bool>,
    pub(crate) duration: Option<u32>,
    pub(crate) price: Option<Value>,
    pub(crate) speed: Option<Value>,
    pub(crate) autostart: Option<bool>,
    pub(crate) allowances: Vec<EsimGoAllowance>,
}

/// Catalogue listings send flat countries; the bundle detail endpoint nests them with
/// their networks.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoCountryEntry {
    pub(crate) iso: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) region: Option<String>,
    pub(crate) country: Option<EsimGoCountry>,
    pub(crate) networks: Vec<EsimGoNetwork>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoCountry {
    pub(crate) iso: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) region: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoNetwork {
    pub(crate) name: Option<String>,
    pub(crate) brand_name: Option<String>,
    pub(crate) speeds: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoAllowance {
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
    pub(crate) amount: Option<f64>,
    pub(crate) unlimited: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoOrder {
    pub(crate) order_reference: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) status_message: Option<String>,
    pub(crate) order: Vec<EsimGoOrderLine>,
    pub(crate) total: Option<Value>,
    pub(crate) currency: Option<String>,
    pub(crate) created_date: Option<String>,
    pub(crate) assigned: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoOrderLine {
    pub(crate) item: Option<String>,
    pub(crate) quantity: Option<u32>,
    pub(crate) price_per_unit: Option<Value>,
    pub(crate) sub_total: Option<Value>,
    pub(crate) esims: Vec<EsimGoOrderEsim>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoOrderEsim {
    pub(crate) iccid: Option<String>,
    pub(crate) matching_id: Option<String>,
    pub(crate) smdp_address: Option<String>,
    pub(crate) lpa_string: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoOrderList {
    pub(crate) orders: Vec<Option<EsimGoOrder>>,
    pub(crate) rows: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoEsim {
    pub(crate) iccid: Option<String>,
    pub(crate) eid: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) lpa_string: Option<String>,
    pub(crate) smdp_address: Option<String>,
    pub(crate) matching_id: Option<String>,
    pub(crate) created_date: Option<String>,
    pub(crate) bundles: Vec<EsimGoAssignedBundle>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoEsimList {
    pub(crate) esims: Vec<EsimGoEsim>,
    pub(crate) total: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoAssignedBundle {
    pub(crate) name: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) initial_amount: Option<f64>,
    pub(crate) remaining_amount: Option<f64>,
    pub(crate) unlimited: Option<bool>,
    pub(crate) start_time: Option<String>,
    pub(crate) expiry_time: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoBundleList {
    pub(crate) bundles: Vec<EsimGoAssignedBundle>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoRevocation {
    pub(crate) message: Option<String>,
    pub(crate) refund_amount: Option<Value>,
    pub(crate) currency: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoHistory {
    pub(crate) history: Vec<EsimGoHistoryEntry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoHistoryEntry {
    pub(crate) date: Option<String>,
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) bundle_name: Option<String>,
    pub(crate) metadata: Option<Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoOrganisation {
    pub(crate) balance: Option<Value>,
    pub(crate) currency: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EsimGoRefund {
    pub(crate) success: Option<bool>,
    pub(crate) refund_id: Option<Value>,
    pub(crate) amount: Option<Value>,
    pub(crate) currency: Option<String>,
    pub(crate) message: Option<String>,
}
