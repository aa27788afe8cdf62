//! Resilient multi-provider eSIM gateway.
//!
//! Vendor adapters sit behind one [`EsimProvider`] contract and are resolved by name
//! through a [`ProviderRegistry`]. Every upstream call goes through a
//! [`ResilientClient`] that retries transient failures and trips a per-host circuit
//! breaker.

pub mod config;
pub mod error;
pub mod http;
pub mod normalize;
pub mod provider;
pub mod registry;
pub mod resilience;
pub mod types;

pub use config::{GatewayConfig, build_registry_from_config};
pub use error::GatewayError;
pub use provider::{DynProvider, EsimProvider};
pub use registry::{ProviderContext, ProviderRegistry};
pub use resilience::{ResilientClient, TransportConfig};
pub use types::*;
