use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::esimcard::{self, EsimCardProvider};
use crate::provider::esimgo::{self, EsimGoProvider};
use crate::registry::{ProviderContext, ProviderRegistry};
use crate::resilience::TransportConfig;

/// Everything needed to assemble a [`ProviderRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// One configured vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry name, e.g. `esimgo`. Matched case-insensitively.
    pub name: String,
    pub kind: ProviderKind,
    pub credential: Credential,
    #[serde(default)]
    pub sandbox: bool,
    pub base_url: Option<String>,
}

/// Supported vendor adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Esimgo,
    Esimcard,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Esimgo => esimgo::PROVIDER_NAME,
            ProviderKind::Esimcard => esimcard::PROVIDER_NAME,
        }
    }
}

/// Authentication material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Static API key.
    ApiKey { key: String },
    /// Reseller account exchanged for a bearer token.
    Login { email: String, password: String },
    None,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey { .. } => f.debug_struct("ApiKey").field("key", &"***").finish(),
            Credential::Login { email, .. } => f
                .debug_struct("Login")
                .field("email", email)
                .field("password", &"***")
                .finish(),
            Credential::None => f.write_str("None"),
        }
    }
}

impl GatewayConfig {
    /// Reads settings from process environment variables.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    ///
    /// Recognised variables:
    ///
    /// | variable | meaning | default |
    /// |---|---|---|
    /// | `RETRY_MAX_ATTEMPTS` | retries after the first attempt | 3 |
    /// | `RETRY_MIN_WAIT` / `RETRY_MAX_WAIT` | backoff bounds (seconds) | 1 / 10 |
    /// | `RETRY_MULTIPLIER` | backoff growth factor | 2 |
    /// | `CIRCUIT_BREAKER_THRESHOLD` | failures before opening | 5 |
    /// | `CIRCUIT_BREAKER_TIMEOUT` | cooldown (seconds) | 60 |
    /// | `HTTP_TIMEOUT` | per-attempt deadline (seconds) | 30 |
    /// | `ESIMGO_API_KEY`, `ESIMGO_SANDBOX` | eSIM Go credentials | sandbox on |
    /// | `ESIMCARD_EMAIL`, `ESIMCARD_PASSWORD` | esimCard live account | |
    /// | `ESIMCARD_SANDBOX_EMAIL`, `ESIMCARD_SANDBOX_PASSWORD` | esimCard sandbox account | |
    /// | `ESIMCARD_SANDBOX` | which esimCard account to use | sandbox on |
    ///
    /// A provider is only configured when its credentials are present.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use esim_gateway::config::{GatewayConfig, ProviderKind};
    ///
    /// let vars = HashMap::from([
    ///     ("ESIMGO_API_KEY", "test-key"),
    ///     ("CIRCUIT_BREAKER_THRESHOLD", "3"),
    /// ]);
    /// let config = GatewayConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
    /// assert_eq!(config.transport.circuit_breaker.failure_threshold, 3);
    /// assert_eq!(config.providers.len(), 1);
    /// assert_eq!(config.providers[0].kind, ProviderKind::Esimgo);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut transport = TransportConfig::default();
        if let Some(raw) = read("RETRY_MAX_ATTEMPTS") {
            transport.retry.max_retries = parse_number("RETRY_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = read("RETRY_MIN_WAIT") {
            transport.retry.initial_delay_ms = parse_seconds("RETRY_MIN_WAIT", &raw)?;
        }
        if let Some(raw) = read("RETRY_MAX_WAIT") {
            transport.retry.max_delay_ms = parse_seconds("RETRY_MAX_WAIT", &raw)?;
        }
        if let Some(raw) = read("RETRY_MULTIPLIER") {
            transport.retry.exponential_base = parse_number("RETRY_MULTIPLIER", &raw)?;
        }
        if let Some(raw) = read("CIRCUIT_BREAKER_THRESHOLD") {
            transport.circuit_breaker.failure_threshold =
                parse_number("CIRCUIT_BREAKER_THRESHOLD", &raw)?;
        }
        if let Some(raw) = read("CIRCUIT_BREAKER_TIMEOUT") {
            transport.circuit_breaker.cooldown_ms = parse_seconds("CIRCUIT_BREAKER_TIMEOUT", &raw)?;
        }
        if let Some(raw) = read("HTTP_TIMEOUT") {
            transport.request_timeout_ms = parse_seconds("HTTP_TIMEOUT", &raw)?;
        }

        let mut providers = Vec::new();

        if let Some(key) = read("ESIMGO_API_KEY") {
            providers.push(ProviderConfig {
                name: esimgo::PROVIDER_NAME.to_string(),
                kind: ProviderKind::Esimgo,
                credential: Credential::ApiKey { key },
                sandbox: parse_flag("ESIMGO_SANDBOX", read("ESIMGO_SANDBOX"), true)?,
                base_url: None,
            });
        }

        let esimcard_sandbox = parse_flag("ESIMCARD_SANDBOX", read("ESIMCARD_SANDBOX"), true)?;
        let (email_var, password_var) = if esimcard_sandbox {
            ("ESIMCARD_SANDBOX_EMAIL", "ESIMCARD_SANDBOX_PASSWORD")
        } else {
            ("ESIMCARD_EMAIL", "ESIMCARD_PASSWORD")
        };
        match (read(email_var), read(password_var)) {
            (Some(email), Some(password)) => providers.push(ProviderConfig {
                name: esimcard::PROVIDER_NAME.to_string(),
                kind: ProviderKind::Esimcard,
                credential: Credential::Login { email, password },
                sandbox: esimcard_sandbox,
                base_url: None,
            }),
            (None, None) => {}
            (Some(_), None) => {
                return Err(invalid(password_var, "set together with the account email"));
            }
            (None, Some(_)) => {
                return Err(invalid(email_var, "set together with the account password"));
            }
        }

        let config = Self {
            transport,
            providers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and provider entries.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let retry = &self.transport.retry;
        if !retry.exponential_base.is_finite() || retry.exponential_base < 1.0 {
            return Err(invalid("transport.retry.exponential_base", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(invalid("transport.retry.jitter_factor", "must be between 0 and 1"));
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(invalid(
                "transport.retry.initial_delay_ms",
                "must not exceed max_delay_ms",
            ));
        }
        if self.transport.circuit_breaker.failure_threshold == 0 {
            return Err(invalid(
                "transport.circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.transport.request_timeout_ms == 0 {
            return Err(invalid("transport.request_timeout_ms", "must be positive"));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            let name = provider.name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(invalid("providers.name", "must not be empty"));
            }
            if !seen.insert(name.clone()) {
                return Err(invalid(
                    format!("providers.{name}"),
                    "registered more than once",
                ));
            }
            provider.check_credential()?;
        }
        Ok(())
    }
}

impl ProviderConfig {
    fn check_credential(&self) -> Result<(), GatewayError> {
        let field = format!("providers.{}.credential", self.name);
        match (self.kind, &self.credential) {
            (ProviderKind::Esimgo, Credential::ApiKey { key }) if !key.trim().is_empty() => Ok(()),
            (ProviderKind::Esimgo, _) => Err(invalid(
                field,
                format!("{} requires a non-empty api_key credential", self.kind.as_str()),
            )),
            (ProviderKind::Esimcard, Credential::Login { email, password })
                if !email.trim().is_empty() && !password.is_empty() =>
            {
                Ok(())
            }
            (ProviderKind::Esimcard, _) => Err(invalid(
                field,
                format!("{} requires a login credential", self.kind.as_str()),
            )),
        }
    }

    fn build(&self, context: &ProviderContext) -> Result<DynProvider, GatewayError> {
        self.check_credential()?;
        let provider: DynProvider = match (&self.kind, &self.credential) {
            (ProviderKind::Esimgo, Credential::ApiKey { key }) => {
                let mut provider = EsimGoProvider::new(context.client(esimgo::PROVIDER_NAME), key)
                    .with_sandbox(self.sandbox);
                if let Some(base_url) = &self.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Arc::new(provider)
            }
            (ProviderKind::Esimcard, Credential::Login { email, password }) => {
                let mut provider = EsimCardProvider::new(
                    context.client(esimcard::PROVIDER_NAME),
                    email,
                    password,
                )
                .with_sandbox(self.sandbox);
                if let Some(base_url) = &self.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Arc::new(provider)
            }
            _ => {
                return Err(invalid(
                    format!("providers.{}.credential", self.name),
                    "credential does not match provider kind",
                ));
            }
        };
        Ok(provider)
    }
}

/// Builds a registry from configuration. Providers are constructed on first use.
///
/// # Errors
///
/// [`GatewayError::InvalidConfig`] when a value is out of range, a name repeats, or a
/// credential does not fit its provider kind.
pub fn build_registry_from_config(
    config: &GatewayConfig,
    transport: DynHttpTransport,
) -> Result<ProviderRegistry, GatewayError> {
    config.validate()?;

    let mut builder =
        ProviderRegistry::builder(ProviderContext::new(transport, config.transport.clone()));
    for provider in &config.providers {
        let provider = provider.clone();
        builder = builder.register_factory(provider.name.clone(), move |context: &ProviderContext| {
            provider.build(context)
        });
    }

    Ok(builder.build())
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> GatewayError {
    GatewayError::InvalidConfig {
        field: field.into(),
        reason: reason.into(),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, GatewayError> {
    raw.parse()
        .map_err(|_| invalid(field, format!("not a valid number: {raw}")))
}

fn parse_seconds(field: &str, raw: &str) -> Result<u64, GatewayError> {
    let seconds: f64 = parse_number(field, raw)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid(field, format!("not a valid duration: {raw}")));
    }
    Ok((seconds * 1000.0).round() as u64)
}

fn parse_flag(field: &str, raw: Option<String>, default: bool) -> Result<bool, GatewayError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(field, format!("not a boolean: {raw}"))),
    }
}
