use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Operation;

/// Resource a `NotFound` failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Package,
    ESim,
    Order,
    Bundle,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Package => "package",
            ResourceKind::ESim => "esim",
            ResourceKind::Order => "order",
            ResourceKind::Bundle => "bundle",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a provider is considered unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The circuit for the upstream host is open; no request was sent.
    CircuitOpen,
    /// Every attempt allowed by the retry policy failed transiently.
    RetriesExhausted,
}

/// Aggregates every failure the gateway surfaces to callers.
///
/// Vendor failures (`NotFound` through `ProviderError`) are normalized from each
/// vendor's own vocabulary. `UnsupportedOperation`, `UnknownProvider` and
/// `InvalidRequest` describe caller mistakes and can be told apart with
/// [`GatewayError::is_caller_error`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The vendor has no record of the requested resource.
    #[error("{kind} not found: {id}")]
    NotFound {
        provider: &'static str,
        kind: ResourceKind,
        /// Identifier the caller asked for.
        id: String,
    },
    /// The vendor rejected the request because of the current resource state.
    #[error("conflict reported by {provider}: {message}")]
    Conflict {
        provider: &'static str,
        message: String,
    },
    /// The vendor kept throttling after the retry policy gave up.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
        /// Wait duration suggested by the vendor, if any.
        retry_after: Option<Duration>,
    },
    /// Credentials were rejected, including after one transparent refresh.
    #[error("unauthorized by {provider}: {message}")]
    Unauthorized {
        provider: &'static str,
        message: String,
    },
    /// The circuit is open or retries were exhausted.
    #[error("provider {provider} unavailable: {message}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: UnavailableReason,
        message: String,
    },
    /// The vendor returned an application error or unusable data.
    #[error("provider {provider} error: {message}")]
    ProviderError {
        provider: &'static str,
        message: String,
        /// Vendor error code, kept verbatim for debugging.
        code: Option<String>,
    },
    /// An order the vendor books unit by unit stopped partway. The purchases listed
    /// here went through and are billed; resubmitting the whole order buys them again.
    #[error("order with {provider} stopped after {purchased} purchase(s): {source}")]
    PartialOrder {
        provider: &'static str,
        purchased: u32,
        order_ids: Vec<String>,
        source: Box<GatewayError>,
    },
    /// The provider does not implement an optional operation.
    #[error("operation {operation} is not supported by provider {provider}")]
    UnsupportedOperation {
        provider: &'static str,
        operation: Operation,
    },
    /// No provider is registered under the requested name.
    #[error("unknown provider: {name}")]
    UnknownProvider { name: String },
    /// The request payload failed validation before any vendor call.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    /// Building the gateway from configuration failed.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl GatewayError {
    /// Creates a [`GatewayError::ProviderError`] without a vendor code.
    ///
    /// # Examples
    ///
    /// ```
    /// use esim_gateway::error::GatewayError;
    ///
    /// let err = GatewayError::provider("esimgo", "missing iccid");
    /// assert!(matches!(err, GatewayError::ProviderError { provider: "esimgo", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::ProviderError {
            provider,
            message: message.into(),
            code: None,
        }
    }

    /// Creates a [`GatewayError::NotFound`] for the given resource.
    pub fn not_found(provider: &'static str, kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            provider,
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_request<T: Into<String>>(message: T) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn unsupported(provider: &'static str, operation: Operation) -> Self {
        Self::UnsupportedOperation {
            provider,
            operation,
        }
    }

    /// Returns `true` for failures caused by the caller rather than by a vendor.
    ///
    /// # Examples
    ///
    /// ```
    /// use esim_gateway::error::GatewayError;
    ///
    /// let err = GatewayError::UnknownProvider { name: "acme".into() };
    /// assert!(err.is_caller_error());
    /// assert!(!GatewayError::provider("esimgo", "boom").is_caller_error());
    /// ```
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GatewayError::UnsupportedOperation { .. }
                | GatewayError::UnknownProvider { .. }
                | GatewayError::InvalidRequest { .. }
        )
    }

    /// Vendor that produced the failure, if one was involved.
    pub fn provider_name(&self) -> Option<&'static str> {
        match self {
            GatewayError::NotFound { provider, .. }
            | GatewayError::Conflict { provider, .. }
            | GatewayError::RateLimited { provider, .. }
            | GatewayError::Unauthorized { provider, .. }
            | GatewayError::ProviderUnavailable { provider, .. }
            | GatewayError::ProviderError { provider, .. }
            | GatewayError::PartialOrder { provider, .. }
            | GatewayError::UnsupportedOperation { provider, .. } => Some(*provider),
            GatewayError::UnknownProvider { .. }
            | GatewayError::InvalidRequest { .. }
            | GatewayError::InvalidConfig { .. } => None,
        }
    }

    /// HTTP status an outer API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotFound { .. } => 404,
            GatewayError::Conflict { .. } => 409,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Unauthorized { .. } => 401,
            GatewayError::ProviderUnavailable { .. } => 503,
            GatewayError::ProviderError { .. } | GatewayError::PartialOrder { .. } => 502,
            GatewayError::UnsupportedOperation { .. } => 501,
            GatewayError::UnknownProvider { .. } => 400,
            GatewayError::InvalidRequest { .. } => 422,
            GatewayError::InvalidConfig { .. } => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::NotFound { kind, .. } => match kind {
                ResourceKind::Package => "PACKAGE_NOT_FOUND",
                ResourceKind::ESim => "ESIM_NOT_FOUND",
                ResourceKind::Order => "ORDER_NOT_FOUND",
                ResourceKind::Bundle => "BUNDLE_NOT_FOUND",
            },
            GatewayError::Conflict { .. } => "CONFLICT",
            GatewayError::RateLimited { .. } => "RATE_LIMITED",
            GatewayError::Unauthorized { .. } => "UNAUTHORIZED",
            GatewayError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            GatewayError::ProviderError { .. } => "PROVIDER_ERROR",
            GatewayError::PartialOrder { .. } => "PARTIAL_ORDER",
            GatewayError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            GatewayError::UnknownProvider { .. } => "PROVIDER_NOT_FOUND",
            GatewayError::InvalidRequest { .. } => "VALIDATION_ERROR",
            GatewayError::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }

    /// Serializable error envelope for an outer API layer.
    pub fn to_error_body(&self) -> ErrorBody {
        let (provider_code, provider_message) = match self {
            GatewayError::ProviderError { code, message, .. } => (code.clone(), Some(message.clone())),
            GatewayError::PartialOrder { order_ids, .. } => {
                (None, Some(format!("booked orders: {}", order_ids.join(", "))))
            }
            _ => (None, None),
        };
        ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                provider_code,
                provider_message,
            },
            provider: self.provider_name().map(str::to_string),
        }
    }
}

/// Wire form of a [`GatewayError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub provider_code: Option<String>,
    pub provider_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_distinguishable_from_vendor_failures() {
        let caller = [
            GatewayError::UnknownProvider {
                name: "acme".to_string(),
            },
            GatewayError::unsupported("esimcard", Operation::RequestRefund),
            GatewayError::invalid_request("quantity must be positive"),
        ];
        for err in &caller {
            assert!(err.is_caller_error(), "{err} should be a caller error");
        }

        let vendor = [
            GatewayError::not_found("esimgo", ResourceKind::Order, "ord-1"),
            GatewayError::provider("esimgo", "bad payload"),
            GatewayError::ProviderUnavailable {
                provider: "esimgo",
                reason: UnavailableReason::CircuitOpen,
                message: "circuit open".to_string(),
            },
        ];
        for err in &vendor {
            assert!(!err.is_caller_error(), "{err} should be a vendor failure");
        }
    }

    #[test]
    fn not_found_codes_follow_resource_kind() {
        let err = GatewayError::not_found("esimgo", ResourceKind::ESim, "8944");
        assert_eq!(err.error_code(), "ESIM_NOT_FOUND");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "esim not found: 8944");
    }

    #[test]
    fn error_body_carries_provider_details() {
        let err = GatewayError::ProviderError {
            provider: "esimcard",
            message: "purchase failed".to_string(),
            code: Some("E42".to_string()),
        };
        let body = err.to_error_body();
        assert!(!body.success);
        assert_eq!(body.error.code, "PROVIDER_ERROR");
        assert_eq!(body.error.provider_code.as_deref(), Some("E42"));
        assert_eq!(body.provider.as_deref(), Some("esimcard"));

        let partial = GatewayError::PartialOrder {
            provider: "esimcard",
            purchased: 2,
            order_ids: vec!["5001".to_string(), "5002".to_string()],
            source: Box::new(GatewayError::provider("esimcard", "purchase failed")),
        };
        assert!(!partial.is_caller_error());
        assert_eq!(partial.status_code(), 502);
        let body = partial.to_error_body();
        assert_eq!(body.error.code, "PARTIAL_ORDER");
        assert_eq!(body.error.provider_message.as_deref(), Some("booked orders: 5001, 5002"));
        assert!(body.error.message.contains("after 2 purchase(s)"));

        let body = GatewayError::UnknownProvider {
            name: "acme".to_string(),
        }
        .to_error_body();
        assert_eq!(body.error.code, "PROVIDER_NOT_FOUND");
        assert_eq!(body.provider, None);
    }
}
