//! Vendor-agnostic records returned by every provider.
//!
//! Adapters translate their vendor payloads into these types so callers never see a
//! vendor-specific field. Every response is wrapped in an [`Envelope`] or a [`Listing`],
//! both of which carry the [`ProviderMetadata`] of the vendor that produced the data.

use std::fmt;

use serde::{Deserialize, Serialize};

mod account;
mod catalog;
mod esim;
mod order;

pub use account::{Balance, BundleRevocation, Refund, RefundRequest, Transaction};
pub use catalog::{Country, Network, Package, PackageQuery, Region};
pub use esim::{
    ApplyBundleRequest, ApplyBundleResult, AssignedBundle, ESim, EsimHistoryEvent, EsimQuery,
    Usage,
};
pub use order::{CreateOrderRequest, Order, OrderEsim, OrderItem, OrderLine, OrderQuery};

/// Identifies the vendor that produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Registry name of the provider, such as `esimgo`.
    pub provider: String,
    /// Whether the adapter talked to the vendor's sandbox environment.
    pub sandbox: bool,
}

impl ProviderMetadata {
    pub fn new(provider: impl Into<String>, sandbox: bool) -> Self {
        Self {
            provider: provider.into(),
            sandbox,
        }
    }
}

/// A single record together with its provider attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    pub provider: ProviderMetadata,
}

impl<T> Envelope<T> {
    pub fn new(data: T, provider: ProviderMetadata) -> Self {
        Self { data, provider }
    }
}

/// Page selection shared by every paginated operation. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Clamps the request into the accepted range: page at least 1, limit within
    /// `1..=MAX_LIMIT`.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Zero-based index of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Position of a [`Listing`] inside the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    /// Total number of items reported by the vendor, when it reports one.
    pub total: Option<u64>,
    /// `true` when the vendor holds items beyond this page.
    pub has_more: bool,
}

impl Pagination {
    /// Describes a page cut from a vendor response.
    ///
    /// When the vendor reports a total it decides `has_more`; otherwise a full page is
    /// taken as a hint that more items may follow.
    pub fn for_page(request: PageRequest, returned: usize, total: Option<u64>) -> Self {
        let consumed = request.offset() as u64 + returned as u64;
        let has_more = match total {
            Some(total) => consumed < total,
            None => returned as u64 >= request.limit as u64 && returned > 0,
        };
        Self {
            page: request.page,
            limit: request.limit,
            total,
            has_more,
        }
    }

    /// Describes a fully drained result set.
    pub fn complete(count: usize) -> Self {
        Self {
            page: 1,
            limit: count as u32,
            total: Some(count as u64),
            has_more: false,
        }
    }
}

/// A list of records plus pagination and provider attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    pub provider: ProviderMetadata,
}

impl<T> Listing<T> {
    /// Wraps a result set that was drained completely.
    pub fn complete(items: Vec<T>, provider: ProviderMetadata) -> Self {
        let pagination = Pagination::complete(items.len());
        Self {
            items,
            pagination,
            provider,
        }
    }

    /// Wraps a vendor page that was narrowed locally after paging. `has_more` follows
    /// the vendor page; the vendor total no longer describes the items and is dropped
    /// when the filter removed any.
    pub fn filtered_page(
        items: Vec<T>,
        request: PageRequest,
        vendor_returned: usize,
        total: Option<u64>,
        provider: ProviderMetadata,
    ) -> Self {
        let mut pagination = Pagination::for_page(request, vendor_returned, total);
        if items.len() < vendor_returned {
            pagination.total = None;
        }
        Self {
            items,
            pagination,
            provider,
        }
    }

    /// Wraps a drain that stopped at a bound before the vendor ran out of items.
    pub fn truncated(items: Vec<T>, provider: ProviderMetadata) -> Self {
        let mut pagination = Pagination::complete(items.len());
        pagination.total = None;
        pagination.has_more = true;
        Self {
            items,
            pagination,
            provider,
        }
    }

    pub fn page(
        items: Vec<T>,
        request: PageRequest,
        total: Option<u64>,
        provider: ProviderMetadata,
    ) -> Self {
        let pagination = Pagination::for_page(request, items.len(), total);
        Self {
            items,
            pagination,
            provider,
        }
    }
}

/// Lifecycle state of an eSIM profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EsimStatus {
    Active,
    Unused,
    Installed,
    Disabled,
    Deleted,
}

/// State of a bundle attached to an eSIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleStatus {
    Active,
    Inactive,
    Expired,
    Depleted,
}

/// Fulfilment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// Every operation of the provider capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListCountries,
    ListRegions,
    ListPackages,
    GetPackage,
    CreateOrder,
    GetOrder,
    ListOrders,
    ListEsims,
    GetEsim,
    ApplyBundle,
    ListEsimBundles,
    GetBundleStatus,
    GetUsage,
    GetBalance,
    ListTransactions,
    RequestRefund,
    RevokeBundle,
    GetEsimHistory,
}

impl Operation {
    /// Operations every provider must implement.
    pub const REQUIRED: [Operation; 14] = [
        Operation::ListCountries,
        Operation::ListRegions,
        Operation::ListPackages,
        Operation::GetPackage,
        Operation::CreateOrder,
        Operation::GetOrder,
        Operation::ListOrders,
        Operation::ListEsims,
        Operation::GetEsim,
        Operation::ApplyBundle,
        Operation::ListEsimBundles,
        Operation::GetBundleStatus,
        Operation::GetUsage,
        Operation::GetBalance,
    ];

    /// Operations a provider may decline with `UnsupportedOperation`.
    pub const OPTIONAL: [Operation; 4] = [
        Operation::ListTransactions,
        Operation::RequestRefund,
        Operation::RevokeBundle,
        Operation::GetEsimHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListCountries => "list_countries",
            Operation::ListRegions => "list_regions",
            Operation::ListPackages => "list_packages",
            Operation::GetPackage => "get_package",
            Operation::CreateOrder => "create_order",
            Operation::GetOrder => "get_order",
            Operation::ListOrders => "list_orders",
            Operation::ListEsims => "list_esims",
            Operation::GetEsim => "get_esim",
            Operation::ApplyBundle => "apply_bundle",
            Operation::ListEsimBundles => "list_esim_bundles",
            Operation::GetBundleStatus => "get_bundle_status",
            Operation::GetUsage => "get_usage",
            Operation::GetBalance => "get_balance",
            Operation::ListTransactions => "list_transactions",
            Operation::RequestRefund => "request_refund",
            Operation::RevokeBundle => "revoke_bundle",
            Operation::GetEsimHistory => "get_esim_history",
        }
    }

    pub fn is_optional(&self) -> bool {
        Self::OPTIONAL.contains(self)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional operations a provider actually implements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub supports_transactions: bool,
    pub supports_refunds: bool,
    pub supports_bundle_revocation: bool,
    pub supports_esim_history: bool,
}

impl CapabilityDescriptor {
    /// Returns `true` if the provider implements `operation`.
    ///
    /// Required operations always report `true`.
    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::ListTransactions => self.supports_transactions,
            Operation::RequestRefund => self.supports_refunds,
            Operation::RevokeBundle => self.supports_bundle_revocation,
            Operation::GetEsimHistory => self.supports_esim_history,
            _ => true,
        }
    }
}
