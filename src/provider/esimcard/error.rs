use crate::error::GatewayError;
use crate::normalize::{
    ErrorClass, ErrorTable, Subject, VendorFailure, error_fields, normalize_call_error,
    normalize_error,
};
use crate::resilience::CallError;

use super::PROVIDER_NAME;

pub(crate) static ESIMCARD_ERRORS: ErrorTable = ErrorTable::new(&[
    ("unauthenticated", ErrorClass::Unauthorized),
    ("insufficient_balance", ErrorClass::Conflict),
]);

/// Extracts the code and message from an esimCard error envelope.
pub(crate) fn parse_esimcard_error(body: &str) -> (Option<String>, Option<String>) {
    error_fields(body)
}

pub(crate) fn map_call_error(err: CallError, subject: Option<&Subject>) -> GatewayError {
    normalize_call_error(PROVIDER_NAME, err, &ESIMCARD_ERRORS, subject, parse_esimcard_error)
}

/// Maps a `status: false` envelope. With a subject it means the record does not
/// exist; otherwise the vendor refused the request.
pub(crate) fn rejected_envelope(message: Option<String>, subject: Option<&Subject>) -> GatewayError {
    match subject {
        Some(subject) => GatewayError::not_found(PROVIDER_NAME, subject.kind, subject.id.clone()),
        None => normalize_error(
            PROVIDER_NAME,
            VendorFailure {
                message: message.unwrap_or_else(|| "request rejected".to_string()),
                ..VendorFailure::default()
            },
            &ESIMCARD_ERRORS,
            None,
        ),
    }
}
