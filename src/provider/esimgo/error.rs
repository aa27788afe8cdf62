use crate::error::GatewayError;
use crate::normalize::{ErrorClass, ErrorTable, Subject, error_fields, normalize_call_error};
use crate::resilience::CallError;

use super::PROVIDER_NAME;

/// eSIM Go reports most failures through the HTTP status alone; these codes show up
/// in order and refund rejections.
pub(crate) static ESIMGO_ERRORS: ErrorTable = ErrorTable::new(&[
    ("INSUFFICIENT_FUNDS", ErrorClass::Conflict),
    ("BUNDLE_ALREADY_ASSIGNED", ErrorClass::Conflict),
    ("INVALID_API_KEY", ErrorClass::Unauthorized),
]);

/// Extracts the vendor code and message from an eSIM Go error payload.
pub(crate) fn parse_esimgo_error(body: &str) -> (Option<String>, Option<String>) {
    let (code, message) = error_fields(body);
    let message = message.map(|text| text.trim().to_string());
    (code, message)
}

pub(crate) fn map_call_error(err: CallError, subject: Option<&Subject>) -> GatewayError {
    normalize_call_error(PROVIDER_NAME, err, &ESIMGO_ERRORS, subject, parse_esimgo_error)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ResourceKind;

    fn status(status: u16, body: &str) -> CallError {
        CallError::Status {
            status,
            body: body.to_string(),
            headers: HashMap::new(),
        }
    }

    #[test]
    fn not_found_uses_the_subject() {
        let subject = Subject::new(ResourceKind::Order, "ord-1");
        match map_call_error(status(404, r#"{"message":"Order not found"}"#), Some(&subject)) {
            GatewayError::NotFound { provider, kind, id } => {
                assert_eq!(provider, "esimgo");
                assert_eq!(kind, ResourceKind::Order);
                assert_eq!(id, "ord-1");
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn insufficient_funds_is_a_conflict() {
        let body = r#"{"code":"INSUFFICIENT_FUNDS","message":"Not enough credit"}"#;
        match map_call_error(status(400, body), None) {
            GatewayError::Conflict { message, .. } => assert_eq!(message, "Not enough credit"),
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_is_kept_in_the_message() {
        match map_call_error(status(418, "teapot"), None) {
            GatewayError::ProviderError { message, code, .. } => {
                assert!(message.contains("teapot"), "unexpected message: {message}");
                assert_eq!(code, None);
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }
}
