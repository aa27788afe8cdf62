use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardEnvelope {
    pub(crate) status: Option<bool>,
    pub(crate) data: Value,
    pub(crate) message: Option<String>,
    pub(crate) meta: Option<EsimCardMeta>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardMeta {
    pub(crate) total: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardLogin {
    pub(crate) status: Option<bool>,
    pub(crate) access_token: Option<String>,
    pub(crate) message: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardCountry {
    pub(crate) id: Option<Value>,
    pub(crate) code: Option<String>,
    pub(crate) iso2: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) country_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardContinent {
    pub(crate) id: Option<Value>,
    pub(crate) name: Option<String>,
    pub(crate) continent_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardPackage {
    pub(crate) id: Option<Value>,
    pub(crate) package_type_id: Option<Value>,
    pub(crate) name: Option<String>,
    pub(crate) package_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) countries: Vec<EsimCardPackageCountry>,
    pub(crate) country_iso2: Option<String>,
    pub(crate) country_name: Option<String>,
    pub(crate) data: Option<Value>,
    pub(crate) data_unit: Option<String>,
    pub(crate) unlimited_data: Option<bool>,
    pub(crate) voice_minutes: Option<Value>,
    pub(crate) call_minutes: Option<Value>,
    pub(crate) sms: Option<Value>,
    pub(crate) sms_count: Option<Value>,
    pub(crate) price: Option<Value>,
    pub(crate) selling_price: Option<Value>,
    pub(crate) validity: Option<Value>,
    pub(crate) duration_days: Option<Value>,
    pub(crate) currency: Option<String>,
    pub(crate) speeds: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardPackageCountry {
    pub(crate) iso2: Option<String>,
    pub(crate) country_iso2: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) country_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardPurchase {
    pub(crate) order_id: Option<Value>,
    pub(crate) id: Option<Value>,
    pub(crate) iccid: Option<String>,
    #[serde(alias = "matchingID")]
    pub(crate) matching_id: Option<String>,
    #[serde(alias = "smdpAddress")]
    pub(crate) smdp_address: Option<String>,
    #[serde(alias = "lpa")]
    pub(crate) lpa_string: Option<String>,
    #[serde(alias = "amount")]
    pub(crate) price: Option<Value>,
    pub(crate) currency: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardOrder {
    pub(crate) order_id: Option<Value>,
    pub(crate) id: Option<Value>,
    pub(crate) status: Option<String>,
    pub(crate) package_type_id: Option<Value>,
    pub(crate) package_name: Option<String>,
    pub(crate) price: Option<Value>,
    pub(crate) total: Option<Value>,
    pub(crate) currency: Option<String>,
    pub(crate) created_at: Option<String>,
    pub(crate) iccid: Option<String>,
    pub(crate) matching_id: Option<String>,
    pub(crate) smdp_address: Option<String>,
    #[serde(alias = "lpa")]
    pub(crate) lpa_string: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardEsim {
    pub(crate) iccid: Option<String>,
    pub(crate) eid: Option<String>,
    pub(crate) status: Option<String>,
    #[serde(alias = "lpa")]
    pub(crate) lpa_string: Option<String>,
    pub(crate) smdp_address: Option<String>,
    pub(crate) matching_id: Option<String>,
    pub(crate) created_at: Option<String>,
    pub(crate) packages: Option<Vec<EsimCardBundle>>,
    pub(crate) bundles: Option<Vec<EsimCardBundle>>,
    pub(crate) package_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardBundle {
    pub(crate) package_name: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) package_type_id: Option<Value>,
    pub(crate) id: Option<Value>,
    pub(crate) status: Option<String>,
    pub(crate) initial_data_quantity: Option<Value>,
    pub(crate) data: Option<Value>,
    pub(crate) initial_data_unit: Option<String>,
    pub(crate) data_unit: Option<String>,
    pub(crate) rem_data_quantity: Option<Value>,
    pub(crate) remaining_data: Option<Value>,
    pub(crate) rem_data_unit: Option<String>,
    pub(crate) unlimited_data: Option<bool>,
    pub(crate) start_date: Option<String>,
    pub(crate) activated_at: Option<String>,
    pub(crate) expiry_date: Option<String>,
    pub(crate) expires_at: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardUsage {
    pub(crate) package_name: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) initial_data_quantity: Option<Value>,
    pub(crate) initial_data_unit: Option<String>,
    pub(crate) rem_data_quantity: Option<Value>,
    pub(crate) rem_data_unit: Option<String>,
    pub(crate) unlimited_data: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub(crate) struct EsimCardBalance {
    pub(crate) balance: Option<Value>,
    pub(crate) amount: Option<Value>,
    pub(crate) currency: Option<String>,
}
