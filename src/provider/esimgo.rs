//! eSIM Go adapter (API v2.5).
//!
//! Authenticates with a static `X-API-Key` header. Live and sandbox share one base
//! URL; in sandbox mode orders are submitted as `validate` so nothing is charged.

mod error;
mod provider;
mod response;
mod types;

pub use provider::EsimGoProvider;

pub const PROVIDER_NAME: &str = "esimgo";
pub const DEFAULT_BASE_URL: &str = "https://api.esim-go.com/v2.5";
pub const API_KEY_HEADER: &str = "X-API-Key";
