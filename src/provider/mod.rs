use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{GatewayError, ResourceKind};
use crate::types::{
    ApplyBundleRequest, ApplyBundleResult, AssignedBundle, Balance, BundleRevocation,
    BundleStatus, Country, CreateOrderRequest, ESim, Envelope, EsimHistoryEvent,
    EsimQuery, Listing, Order, OrderQuery, Package, PackageQuery, PageRequest, Refund,
    RefundRequest, Region, Transaction, Usage,
};

pub mod esimcard;
pub mod esimgo;

pub use crate::types::{CapabilityDescriptor, Operation};

/// Credentials a provider authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Static key sent in a header on every request.
    ApiKey { header: String, key: String },
    /// Email and password exchanged for a bearer token.
    Login { email: String, password: String },
    None,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"***")
                .finish(),
            AuthConfig::Login { email, .. } => f
                .debug_struct("Login")
                .field("email", email)
                .field("password", &"***")
                .finish(),
            AuthConfig::None => f.write_str("None"),
        }
    }
}

/// Immutable description of one configured vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub name: &'static str,
    pub live_base_url: String,
    pub sandbox_base_url: String,
    pub sandbox: bool,
    pub auth: AuthConfig,
}

impl ProviderIdentity {
    /// Base URL of the environment selected by the sandbox flag, without a trailing
    /// slash.
    pub fn base_url(&self) -> &str {
        let base = if self.sandbox {
            &self.sandbox_base_url
        } else {
            &self.live_base_url
        };
        base.trim_end_matches('/')
    }

    /// Joins `path` onto the active base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }
}

/// Unified capability set every eSIM vendor adapter implements.
///
/// Required operations must be implemented. Optional ones default to
/// [`GatewayError::UnsupportedOperation`]; an adapter overrides them only when the
/// vendor really offers the feature, and reports that through
/// [`EsimProvider::capabilities`].
#[async_trait]
pub trait EsimProvider: Send + Sync {
    /// Registry name of the provider.
    fn name(&self) -> &'static str;

    fn identity(&self) -> &ProviderIdentity;

    /// Optional operations this provider implements.
    fn capabilities(&self) -> CapabilityDescriptor;

    async fn list_countries(&self) -> Result<Listing<Country>, GatewayError>;

    async fn list_regions(&self) -> Result<Listing<Region>, GatewayError>;

    async fn list_packages(&self, query: PackageQuery) -> Result<Listing<Package>, GatewayError>;

    async fn get_package(&self, package_id: &str) -> Result<Envelope<Package>, GatewayError>;

    /// Places an order. Never retried automatically.
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<Envelope<Order>, GatewayError>;

    async fn get_order(&self, order_id: &str) -> Result<Envelope<Order>, GatewayError>;

    async fn list_orders(&self, query: OrderQuery) -> Result<Listing<Order>, GatewayError>;

    async fn list_esims(&self, query: EsimQuery) -> Result<Listing<ESim>, GatewayError>;

    async fn get_esim(&self, iccid: &str) -> Result<Envelope<ESim>, GatewayError>;

    async fn apply_bundle(
        &self,
        request: ApplyBundleRequest,
    ) -> Result<Envelope<ApplyBundleResult>, GatewayError>;

    async fn list_esim_bundles(&self, iccid: &str)
    -> Result<Listing<AssignedBundle>, GatewayError>;

    async fn get_bundle_status(
        &self,
        iccid: &str,
        bundle: &str,
    ) -> Result<Envelope<AssignedBundle>, GatewayError>;

    /// Data usage of an eSIM, optionally restricted to one bundle.
    async fn get_usage(
        &self,
        iccid: &str,
        bundle: Option<&str>,
    ) -> Result<Envelope<Usage>, GatewayError>;

    async fn get_balance(&self) -> Result<Envelope<Balance>, GatewayError>;

    async fn list_transactions(
        &self,
        _page: PageRequest,
    ) -> Result<Listing<Transaction>, GatewayError> {
        Err(GatewayError::unsupported(
            self.name(),
            Operation::ListTransactions,
        ))
    }

    async fn request_refund(
        &self,
        _request: RefundRequest,
    ) -> Result<Envelope<Refund>, GatewayError> {
        Err(GatewayError::unsupported(self.name(), Operation::RequestRefund))
    }

    async fn revoke_bundle(
        &self,
        _iccid: &str,
        _bundle: &str,
    ) -> Result<Envelope<BundleRevocation>, GatewayError> {
        Err(GatewayError::unsupported(self.name(), Operation::RevokeBundle))
    }

    async fn get_esim_history(
        &self,
        _iccid: &str,
    ) -> Result<Listing<EsimHistoryEvent>, GatewayError> {
        Err(GatewayError::unsupported(self.name(), Operation::GetEsimHistory))
    }
}

/// Thread-safe provider handle.
pub type DynProvider = Arc<dyn EsimProvider>;

/// Rejects identifiers that are empty or would escape their URL path segment.
pub(crate) fn validate_identifier(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::invalid_request(format!("{field} must not be empty")));
    }
    if value
        .chars()
        .any(|ch| matches!(ch, '/' | '?' | '#' | '%' | '\\') || ch.is_whitespace() || ch.is_control())
    {
        return Err(GatewayError::invalid_request(format!(
            "{field} contains characters that are not allowed: {value}"
        )));
    }
    Ok(())
}

/// Decodes a vendor payload into its wire type. An empty body decodes to the default.
pub(crate) fn decode_payload<T>(provider: &'static str, value: Value) -> Result<T, GatewayError>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|err| {
        GatewayError::provider(provider, format!("failed to parse response: {err}"))
    })
}

/// Builds a standard `LPA:1$<smdp>$<matching id>` activation code.
pub(crate) fn lpa_activation_code(
    smdp_address: Option<&str>,
    matching_id: Option<&str>,
) -> Option<String> {
    match (smdp_address, matching_id) {
        (Some(smdp), Some(matching)) if !smdp.is_empty() && !matching.is_empty() => {
            Some(format!("LPA:1${smdp}${matching}"))
        }
        _ => None,
    }
}

/// Sums data usage over the bundles of one eSIM, optionally restricted to `bundle`.
///
/// Any unlimited bundle makes the total and remaining amounts unknown.
pub(crate) fn aggregate_usage(
    provider: &'static str,
    iccid: &str,
    bundle: Option<&str>,
    bundles: &[AssignedBundle],
) -> Result<Usage, GatewayError> {
    let selected: Vec<&AssignedBundle> = match bundle {
        Some(name) => bundles.iter().filter(|b| b.name == name).collect(),
        None => bundles.iter().collect(),
    };
    if let Some(name) = bundle.filter(|_| selected.is_empty()) {
        return Err(GatewayError::not_found(provider, ResourceKind::Bundle, name));
    }

    let unlimited = selected.iter().any(|b| b.unlimited);
    let metered: Vec<&AssignedBundle> = selected.iter().copied().filter(|b| !b.unlimited).collect();
    let sum = |field: fn(&AssignedBundle) -> Option<u64>| -> u64 {
        metered.iter().filter_map(|b| field(b)).sum()
    };

    Ok(Usage {
        iccid: iccid.to_string(),
        bundle: bundle.map(str::to_string),
        data_used_mb: Some(sum(AssignedBundle::data_used_mb)),
        data_remaining_mb: (!unlimited).then(|| sum(|b| b.data_remaining_mb)),
        data_total_mb: (!unlimited).then(|| sum(|b| b.data_total_mb)),
        unlimited,
        active: selected.iter().any(|b| b.status == BundleStatus::Active),
    })
}

/// Checks an order request before any vendor is contacted.
pub(crate) fn validate_order(request: &CreateOrderRequest) -> Result<(), GatewayError> {
    if request.items.is_empty() {
        return Err(GatewayError::invalid_request("order must contain at least one item"));
    }
    for item in &request.items {
        validate_identifier("package_id", &item.package_id)?;
        if item.quantity == 0 {
            return Err(GatewayError::invalid_request(format!(
                "quantity for {} must be positive",
                item.package_id
            )));
        }
    }
    for iccid in &request.iccids {
        validate_identifier("iccid", iccid)?;
    }
    Ok(())
}
