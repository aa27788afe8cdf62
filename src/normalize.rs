//! Translation of vendor vocabularies into the unified enums and error taxonomy.
//!
//! Every adapter owns one [`StatusTable`] per status enum and one [`ErrorTable`] for
//! its error codes. The functions here are pure and never fail: unknown statuses fall
//! back to the table default, unknown errors become [`GatewayError::ProviderError`].

use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GatewayError, ResourceKind, UnavailableReason};
use crate::resilience::{CallError, retry_after_from_headers};

/// Lookup table from vendor status strings to a unified enum value.
#[derive(Debug)]
pub struct StatusTable<S: 'static> {
    name: &'static str,
    entries: &'static [(&'static str, S)],
    default: S,
}

impl<S: Copy + Debug> StatusTable<S> {
    pub const fn new(name: &'static str, entries: &'static [(&'static str, S)], default: S) -> Self {
        Self {
            name,
            entries,
            default,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> S {
        self.default
    }

    /// Case-insensitive lookup without the default fallback.
    pub fn lookup(&self, raw: &str) -> Option<S> {
        let raw = raw.trim();
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(raw))
            .map(|(_, value)| *value)
    }
}

/// Maps a vendor status to its unified value. Total: a missing or unknown value
/// returns the table default, and an unknown value is logged so vocabulary drift
/// shows up in the logs.
///
/// # Examples
///
/// ```
/// use esim_gateway::normalize::{normalize_status, StatusTable};
/// use esim_gateway::types::EsimStatus;
///
/// static TABLE: StatusTable<EsimStatus> = StatusTable::new(
///     "demo_esim",
///     &[("ENABLE", EsimStatus::Active)],
///     EsimStatus::Unused,
/// );
///
/// assert_eq!(normalize_status(Some("enable"), &TABLE), EsimStatus::Active);
/// assert_eq!(normalize_status(Some("SOMETHING_NEW"), &TABLE), EsimStatus::Unused);
/// assert_eq!(normalize_status(None, &TABLE), EsimStatus::Unused);
/// ```
pub fn normalize_status<S: Copy + Debug>(raw: Option<&str>, table: &StatusTable<S>) -> S {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => table.lookup(value).unwrap_or_else(|| {
            warn!(
                table = table.name,
                raw_status = value,
                fallback = ?table.default,
                "unmapped vendor status"
            );
            table.default
        }),
        None => {
            debug!(table = table.name, "vendor status missing, using default");
            table.default
        }
    }
}

/// Category a vendor error falls into before it becomes a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    RateLimited,
    Unauthorized,
    Unavailable,
    Provider,
}

/// Raw failure signal reported by a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorSignal<'a> {
    HttpStatus(u16),
    Code(&'a str),
}

/// Vendor error codes an adapter knows how to classify.
#[derive(Debug)]
pub struct ErrorTable {
    entries: &'static [(&'static str, ErrorClass)],
}

impl ErrorTable {
    pub const fn new(entries: &'static [(&'static str, ErrorClass)]) -> Self {
        Self { entries }
    }

    pub const fn empty() -> Self {
        Self { entries: &[] }
    }

    fn lookup(&self, code: &str) -> Option<ErrorClass> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(code))
            .map(|(_, class)| *class)
    }
}

/// Classifies a single signal. Codes go through the adapter table first; HTTP
/// statuses use the shared mapping.
pub fn classify(signal: VendorSignal<'_>, table: &ErrorTable) -> Option<ErrorClass> {
    match signal {
        VendorSignal::Code(code) => table.lookup(code),
        VendorSignal::HttpStatus(status) => Some(match status {
            401 | 403 => ErrorClass::Unauthorized,
            404 | 410 => ErrorClass::NotFound,
            409 => ErrorClass::Conflict,
            429 => ErrorClass::RateLimited,
            408 | 502 | 503 | 504 => ErrorClass::Unavailable,
            _ => ErrorClass::Provider,
        }),
    }
}

/// The resource an operation was about, used to qualify `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub kind: ResourceKind,
    pub id: String,
}

impl Subject {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Everything known about a vendor application error.
#[derive(Debug, Clone, Default)]
pub struct VendorFailure {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

/// Maps a vendor failure onto the shared taxonomy.
///
/// A recognised vendor code wins over the HTTP status. A not-found signal without a
/// subject becomes `ProviderError`.
pub fn normalize_error(
    provider: &'static str,
    failure: VendorFailure,
    table: &ErrorTable,
    subject: Option<&Subject>,
) -> GatewayError {
    let class = failure
        .code
        .as_deref()
        .and_then(|code| classify(VendorSignal::Code(code), table))
        .or_else(|| {
            failure
                .status
                .and_then(|status| classify(VendorSignal::HttpStatus(status), table))
        })
        .unwrap_or(ErrorClass::Provider);

    match class {
        ErrorClass::NotFound => match subject {
            Some(subject) => GatewayError::not_found(provider, subject.kind, subject.id.clone()),
            None => provider_error(provider, failure),
        },
        ErrorClass::Conflict => GatewayError::Conflict {
            provider,
            message: failure.message,
        },
        ErrorClass::RateLimited => GatewayError::RateLimited {
            provider,
            message: failure.message,
            retry_after: failure.retry_after,
        },
        ErrorClass::Unauthorized => GatewayError::Unauthorized {
            provider,
            message: failure.message,
        },
        ErrorClass::Unavailable => GatewayError::ProviderUnavailable {
            provider,
            reason: UnavailableReason::RetriesExhausted,
            message: failure.message,
        },
        ErrorClass::Provider => provider_error(provider, failure),
    }
}

fn provider_error(provider: &'static str, failure: VendorFailure) -> GatewayError {
    let message = match failure.status {
        Some(status) => format!("status {status}: {}", failure.message),
        None => failure.message,
    };
    GatewayError::ProviderError {
        provider,
        message,
        code: failure.code,
    }
}

/// Converts a [`CallError`] into a [`GatewayError`].
///
/// Application errors are handed to `parse_body`, which extracts the vendor code and
/// message from the error payload; everything else maps directly.
pub fn normalize_call_error<F>(
    provider: &'static str,
    err: CallError,
    table: &ErrorTable,
    subject: Option<&Subject>,
    parse_body: F,
) -> GatewayError
where
    F: FnOnce(&str) -> (Option<String>, Option<String>),
{
    match err {
        CallError::Status {
            status,
            body,
            headers,
        } => {
            let (code, message) = parse_body(&body);
            let failure = VendorFailure {
                status: Some(status),
                code,
                message: message.unwrap_or_else(|| truncate(&body, 512)),
                retry_after: retry_after_from_headers(&headers),
            };
            normalize_error(provider, failure, table, subject)
        }
        CallError::Exhausted { attempts, reason } => GatewayError::ProviderUnavailable {
            provider,
            reason: UnavailableReason::RetriesExhausted,
            message: format!("gave up after {attempts} attempt(s): {reason}"),
        },
        CallError::RateLimited {
            attempts,
            retry_after,
        } => GatewayError::RateLimited {
            provider,
            message: format!("still throttled after {attempts} attempt(s)"),
            retry_after,
        },
        CallError::CircuitOpen { host, retry_in } => GatewayError::ProviderUnavailable {
            provider,
            reason: UnavailableReason::CircuitOpen,
            message: match retry_in {
                Some(wait) => format!("circuit open for {host}, retry in {} ms", wait.as_millis()),
                None => format!("circuit open for {host}, probe in flight"),
            },
        },
        CallError::Decode { message } => GatewayError::ProviderError {
            provider,
            message: format!("failed to decode response: {message}"),
            code: None,
        },
        CallError::InvalidRequest { message } => GatewayError::InvalidRequest { message },
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// Parses the timestamp formats vendors send. Naive timestamps are taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses a price that may carry currency symbols, codes, or thousands separators.
pub fn parse_price(raw: &str) -> Option<f64> {
    let mut cleaned = raw.trim().to_string();
    for token in ["USD", "EUR", "GBP", "$", "€", "£", ","] {
        cleaned = cleaned.replace(token, "");
    }
    cleaned.trim().parse::<f64>().ok()
}

/// Reads a price from either a JSON number or a formatted string.
pub fn price_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_price(text),
        _ => None,
    }
}

/// Converts a data quantity to megabytes. Units other than GB and MB are rejected.
pub fn to_megabytes(amount: f64, unit: &str) -> Option<u64> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    match unit.trim().to_ascii_uppercase().as_str() {
        "GB" => Some((amount * 1024.0).round() as u64),
        "MB" | "" => Some(amount.round() as u64),
        _ => None,
    }
}

/// Pulls a message and code out of common vendor error payload shapes.
pub(crate) fn error_fields(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let nested = value.get("error").filter(|inner| inner.is_object());
    let source = nested.unwrap_or(&value);

    let text = |key: &str| match source.get(key) {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    };
    let code = text("code").or_else(|| text("errorCode")).or_else(|| text("error_code"));
    let message = text("message")
        .or_else(|| text("error"))
        .or_else(|| text("detail"));
    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BundleStatus;

    static BUNDLES: StatusTable<BundleStatus> = StatusTable::new(
        "test_bundle",
        &[
            ("ACTIVE", BundleStatus::Active),
            ("EXPIRED", BundleStatus::Expired),
        ],
        BundleStatus::Inactive,
    );

    static CODES: ErrorTable = ErrorTable::new(&[
        ("ESIM_NOT_FOUND", ErrorClass::NotFound),
        ("INSUFFICIENT_FUNDS", ErrorClass::Conflict),
    ]);

    #[test]
    fn status_lookup_is_case_insensitive_and_total() {
        assert_eq!(normalize_status(Some(" active "), &BUNDLES), BundleStatus::Active);
        assert_eq!(normalize_status(Some("Expired"), &BUNDLES), BundleStatus::Expired);
        assert_eq!(normalize_status(Some("paused"), &BUNDLES), BundleStatus::Inactive);
        assert_eq!(normalize_status(Some(""), &BUNDLES), BundleStatus::Inactive);
        assert_eq!(normalize_status(None, &BUNDLES), BundleStatus::Inactive);
    }

    #[test]
    fn vendor_code_wins_over_http_status() {
        let failure = VendorFailure {
            status: Some(400),
            code: Some("insufficient_funds".to_string()),
            message: "balance too low".to_string(),
            retry_after: None,
        };
        match normalize_error("esimgo", failure, &CODES, None) {
            GatewayError::Conflict { message, .. } => assert_eq!(message, "balance too low"),
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn not_found_needs_a_subject() {
        let subject = Subject::new(ResourceKind::ESim, "8944");
        let failure = VendorFailure {
            status: Some(404),
            message: "no such esim".to_string(),
            ..VendorFailure::default()
        };
        match normalize_error("esimgo", failure.clone(), &CODES, Some(&subject)) {
            GatewayError::NotFound { kind, id, .. } => {
                assert_eq!(kind, ResourceKind::ESim);
                assert_eq!(id, "8944");
            }
            other => panic!("unexpected error type: {other:?}"),
        }
        match normalize_error("esimgo", failure, &CODES, None) {
            GatewayError::ProviderError { message, .. } => {
                assert!(message.contains("404"), "unexpected message: {message}");
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn http_statuses_map_to_taxonomy() {
        let cases = [
            (401, "UNAUTHORIZED"),
            (403, "UNAUTHORIZED"),
            (409, "CONFLICT"),
            (429, "RATE_LIMITED"),
            (503, "PROVIDER_UNAVAILABLE"),
            (400, "PROVIDER_ERROR"),
            (422, "PROVIDER_ERROR"),
        ];
        for (status, expected) in cases {
            let failure = VendorFailure {
                status: Some(status),
                message: "x".to_string(),
                ..VendorFailure::default()
            };
            let err = normalize_error("esimgo", failure, &ErrorTable::empty(), None);
            assert_eq!(err.error_code(), expected, "status {status}");
        }
    }

    #[test]
    fn call_errors_map_to_unavailable_and_rate_limited() {
        let table = ErrorTable::empty();
        let parse = |_: &str| (None, None);

        let err = normalize_call_error(
            "esimgo",
            CallError::CircuitOpen {
                host: "api.esim-go.com".to_string(),
                retry_in: Some(Duration::from_secs(3)),
            },
            &table,
            None,
            parse,
        );
        assert!(matches!(
            err,
            GatewayError::ProviderUnavailable {
                reason: UnavailableReason::CircuitOpen,
                ..
            }
        ));

        let err = normalize_call_error(
            "esimgo",
            CallError::RateLimited {
                attempts: 4,
                retry_after: Some(Duration::from_secs(1)),
            },
            &table,
            None,
            parse,
        );
        match err {
            GatewayError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(1)));
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        let err = normalize_call_error(
            "esimgo",
            CallError::Decode {
                message: "expected value".to_string(),
            },
            &table,
            None,
            parse,
        );
        assert!(matches!(err, GatewayError::ProviderError { .. }));
    }

    #[test]
    fn parses_vendor_datetime_formats() {
        let expected = "2024-03-05T10:20:30Z";
        for raw in [
            "2024-03-05T10:20:30Z",
            "2024-03-05T10:20:30.000Z",
            "2024-03-05T10:20:30",
            "2024-03-05 10:20:30",
            "05 Mar 2024 10:20:30",
            "2024-03-05T12:20:30+0200",
        ] {
            let parsed = parse_datetime(raw).unwrap_or_else(|| panic!("failed to parse {raw}"));
            assert_eq!(parsed.to_rfc3339_opts(chrono::SecondsFormat::Secs, true), expected);
        }
        assert!(parse_datetime("yesterday").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn parses_formatted_prices() {
        assert_eq!(parse_price("$1,234.50"), Some(1234.5));
        assert_eq!(parse_price("12.00 USD"), Some(12.0));
        assert_eq!(parse_price("€ 7"), Some(7.0));
        assert_eq!(parse_price("free"), None);
        assert_eq!(price_value(Some(&serde_json::json!(3.25))), Some(3.25));
        assert_eq!(price_value(Some(&serde_json::json!("£9.99"))), Some(9.99));
        assert_eq!(price_value(None), None);
    }

    #[test]
    fn converts_data_units() {
        assert_eq!(to_megabytes(1.5, "GB"), Some(1536));
        assert_eq!(to_megabytes(500.0, "mb"), Some(500));
        assert_eq!(to_megabytes(1.0, "TB"), None);
        assert_eq!(to_megabytes(-1.0, "MB"), None);
    }

    #[test]
    fn extracts_error_fields_from_nested_and_flat_payloads() {
        let (code, message) = error_fields(r#"{"error":{"code":"E1","message":"nope"}}"#);
        assert_eq!(code.as_deref(), Some("E1"));
        assert_eq!(message.as_deref(), Some("nope"));

        let (code, message) = error_fields(r#"{"status":false,"message":"Invalid ICCID"}"#);
        assert_eq!(code, None);
        assert_eq!(message.as_deref(), Some("Invalid ICCID"));

        assert_eq!(error_fields("<html>"), (None, None));
    }
}
