use serde::{Deserialize, Serialize};

use super::PageRequest;

/// Country a package can be used in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code, upper case.
    pub iso2: String,
    pub name: String,
    pub region: Option<String>,
}

/// Group of countries the vendor sells regional packages for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Stable identifier: the vendor's id, or a slug of the name when the vendor has none.
    pub id: String,
    pub name: String,
    /// ISO codes of member countries; empty when the vendor does not list them.
    #[serde(default)]
    pub countries: Vec<String>,
}

/// Mobile network reachable with a package in a given country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// ISO alpha-2 code of the country the network operates in.
    pub country_iso2: String,
    pub name: String,
    pub brand_name: Option<String>,
    #[serde(default)]
    pub speeds: Vec<String>,
}

/// Sellable data package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub countries: Vec<Country>,
    /// Data allowance in megabytes; `None` for unlimited packages or when unknown.
    pub data_mb: Option<u64>,
    pub unlimited: bool,
    pub voice_minutes: Option<u32>,
    pub sms: Option<u32>,
    pub validity_days: Option<u32>,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub speeds: Vec<String>,
    pub autostart: Option<bool>,
    /// Networks per country, only populated by detail lookups.
    #[serde(default)]
    pub networks: Vec<Network>,
}

impl Package {
    /// A package covering more than one country.
    pub fn is_regional(&self) -> bool {
        self.countries.len() > 1
    }
}

/// Filters for `list_packages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQuery {
    /// ISO alpha-2 country code.
    pub country: Option<String>,
    /// Region name or vendor region id.
    pub region: Option<String>,
    #[serde(default)]
    pub page: PageRequest,
}
