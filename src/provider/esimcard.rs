//! esimCard reseller adapter.
//!
//! Every call carries a bearer token obtained from the reseller login endpoint. The
//! token is cached for [`TOKEN_TTL`] and refreshed once when a call is answered with
//! 401. Responses are wrapped in a `{status, data, message, meta}` envelope.

use std::time::Duration;

mod error;
mod provider;
mod response;
mod types;

pub use provider::EsimCardProvider;

pub const PROVIDER_NAME: &str = "esimcard";
pub const DEFAULT_BASE_URL: &str = "https://esimcard.com/api";
pub const TOKEN_TTL: Duration = Duration::from_secs(86_400);
