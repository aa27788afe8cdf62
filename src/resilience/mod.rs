//! Resilient outbound transport shared by every adapter.
//!
//! [`ResilientClient::execute`] wraps a single logical vendor call with a per-attempt
//! deadline, retry with exponential backoff for idempotent calls, and a circuit
//! breaker per upstream host.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::http::{DynHttpTransport, HttpMethod, HttpRequest, HttpResponse, TransportError};

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakers, CircuitPermit, CircuitRejection,
    CircuitSnapshot, CircuitState, DEFAULT_COOLDOWN_MS, DEFAULT_FAILURE_THRESHOLD,
};
pub use retry::RetryPolicy;
pub(crate) use retry::retry_after_from_headers;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "x-api-key", "accesstoken", "cookie"];

/// Tunable parameters of the resilient transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Deadline for a single attempt (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Outcome of a call that did not produce a usable body.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The vendor answered with a non-transient error status. The body is kept for
    /// vendor-specific normalization; these responses are never retried.
    #[error("upstream returned status {status}")]
    Status {
        status: u16,
        body: String,
        headers: HashMap<String, String>,
    },
    /// Every permitted attempt failed transiently.
    #[error("upstream failed after {attempts} attempt(s): {reason}")]
    Exhausted { attempts: u32, reason: String },
    /// The vendor was still throttling when the attempts ran out.
    #[error("upstream rate limited after {attempts} attempt(s)")]
    RateLimited {
        attempts: u32,
        retry_after: Option<Duration>,
    },
    /// The circuit for the host is open; nothing was sent.
    #[error("circuit open for {host}")]
    CircuitOpen {
        host: String,
        retry_in: Option<Duration>,
    },
    /// A success response whose body is not valid JSON.
    #[error("failed to decode upstream response: {message}")]
    Decode { message: String },
    /// The call could not be turned into an HTTP request.
    #[error("invalid outbound request: {message}")]
    InvalidRequest { message: String },
}

impl CallError {
    /// Status code of an application error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Description of one logical vendor call.
///
/// # Examples
///
/// ```
/// use esim_gateway::resilience::ApiCall;
/// use serde_json::json;
///
/// let call = ApiCall::post("https://api.example.com/orders").json(json!({"type": "transaction"}));
/// assert!(!call.is_idempotent());
///
/// let login = ApiCall::post("https://api.example.com/login").idempotent(true);
/// assert!(login.is_idempotent());
/// ```
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: HttpMethod,
    url: String,
    query: Vec<(String, String)>,
    headers: HashMap<String, String>,
    body: Option<Value>,
    timeout: Option<Duration>,
    idempotent: bool,
}

impl ApiCall {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            idempotent: method.is_idempotent(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Adds a query parameter only when `value` is present.
    pub fn query_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: &HashMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Overrides the per-attempt deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks the call as safe (or unsafe) to repeat, overriding the method default.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    fn into_request(self, default_timeout: Duration) -> Result<HttpRequest, CallError> {
        let mut url = Url::parse(&self.url).map_err(|err| CallError::InvalidRequest {
            message: format!("invalid url {}: {err}", self.url),
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }

        let mut request = HttpRequest::new(self.method, url.as_str())
            .with_timeout(self.timeout.unwrap_or(default_timeout))
            .with_header("Accept", "application/json");
        if let Some(body) = self.body {
            let payload = serde_json::to_vec(&body).map_err(|err| CallError::InvalidRequest {
                message: format!("failed to serialize request: {err}"),
            })?;
            request = request.with_header("Content-Type", "application/json");
            request.body = Some(payload);
        }
        request.headers.extend(self.headers);
        Ok(request)
    }
}

/// Why an attempt is worth retrying.
enum Transient {
    Server { status: u16 },
    Throttled { retry_after: Option<Duration> },
    Transport(TransportError),
}

impl Transient {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Transient::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }

    fn into_call_error(self, attempts: u32) -> CallError {
        match self {
            Transient::Throttled { retry_after } => CallError::RateLimited {
                attempts,
                retry_after,
            },
            other => CallError::Exhausted {
                attempts,
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for Transient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transient::Server { status } => write!(f, "status {status}"),
            Transient::Throttled { .. } => f.write_str("status 429"),
            Transient::Transport(err) => write!(f, "{err}"),
        }
    }
}

/// Resilient transport bound to one provider.
///
/// Cloning is cheap; clones share the HTTP transport and the breaker map.
#[derive(Clone)]
pub struct ResilientClient {
    provider: &'static str,
    transport: DynHttpTransport,
    retry: RetryPolicy,
    request_timeout: Duration,
    breakers: Arc<CircuitBreakers>,
}

impl ResilientClient {
    /// Creates a client with its own breaker map.
    pub fn new(provider: &'static str, transport: DynHttpTransport, config: &TransportConfig) -> Self {
        let breakers = Arc::new(CircuitBreakers::new(config.circuit_breaker.clone()));
        Self::with_breakers(provider, transport, config, breakers)
    }

    /// Creates a client that shares `breakers` with other clients, so two providers
    /// talking to the same host observe the same circuit.
    pub fn with_breakers(
        provider: &'static str,
        transport: DynHttpTransport,
        config: &TransportConfig,
        breakers: Arc<CircuitBreakers>,
    ) -> Self {
        Self {
            provider,
            transport,
            retry: config.retry.clone(),
            request_timeout: config.request_timeout(),
            breakers,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn circuit_states(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.breakers.snapshot()
    }

    /// Executes `call` and returns the decoded JSON body.
    ///
    /// Attempts that time out, fail to connect, or answer 5xx count as circuit
    /// failures and are retried when the call is idempotent. A 429 is retried the
    /// same way, honouring `Retry-After`, but leaves the circuit alone since the host
    /// answered. Any other non-2xx status is returned as [`CallError::Status`]
    /// without a retry. An empty 2xx body decodes to `Value::Null`.
    ///
    /// # Errors
    ///
    /// See [`CallError`] for the distinct failure categories.
    pub async fn execute(&self, call: ApiCall) -> Result<Value, CallError> {
        let idempotent = call.is_idempotent();
        let request = call.into_request(self.request_timeout)?;
        let deadline = request.timeout.unwrap_or(self.request_timeout);
        let host = host_key(&request.url);
        let breaker = self.breakers.breaker_for(&host);
        let max_attempts = if idempotent {
            self.retry.max_attempts()
        } else {
            1
        };
        let method = request.method.as_str();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(rejection) => {
                    warn!(
                        provider = self.provider,
                        host = %host,
                        state = ?rejection.state,
                        attempt,
                        "circuit open, rejecting call"
                    );
                    return Err(CallError::CircuitOpen {
                        host,
                        retry_in: rejection.retry_in,
                    });
                }
            };

            debug!(
                provider = self.provider,
                method,
                url = %request.url,
                headers = ?redact_headers(&request.headers),
                attempt,
                probe = permit.is_probe(),
                "sending upstream request"
            );

            let started = Instant::now();
            let outcome = tokio::time::timeout(deadline, self.transport.send(request.clone())).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(Ok(response)) => {
                    info!(
                        provider = self.provider,
                        method,
                        url = %request.url,
                        status = response.status,
                        latency_ms,
                        attempt,
                        "upstream response"
                    );
                    match response.status {
                        200..=299 => {
                            permit.record_success();
                            return decode_body(&response);
                        }
                        429 => {
                            permit.record_neutral();
                            Transient::Throttled {
                                retry_after: retry_after_from_headers(&response.headers),
                            }
                        }
                        500..=599 => {
                            permit.record_failure();
                            Transient::Server {
                                status: response.status,
                            }
                        }
                        status => {
                            permit.record_success();
                            return Err(CallError::Status {
                                status,
                                body: response.text(),
                                headers: response.headers,
                            });
                        }
                    }
                }
                Ok(Err(err)) => {
                    info!(
                        provider = self.provider,
                        method,
                        url = %request.url,
                        error = %err,
                        latency_ms,
                        attempt,
                        "upstream request failed"
                    );
                    if !err.is_transient() {
                        permit.record_neutral();
                        return Err(CallError::InvalidRequest {
                            message: err.to_string(),
                        });
                    }
                    permit.record_failure();
                    Transient::Transport(err)
                }
                Err(_) => {
                    info!(
                        provider = self.provider,
                        method,
                        url = %request.url,
                        latency_ms,
                        attempt,
                        "upstream request timed out"
                    );
                    permit.record_failure();
                    Transient::Transport(TransportError::Timeout {
                        message: format!("no response within {} ms", deadline.as_millis()),
                    })
                }
            };

            if attempt >= max_attempts {
                return Err(failure.into_call_error(attempt));
            }

            let delay = self.retry.delay_for(attempt - 1, failure.retry_after());
            warn!(
                provider = self.provider,
                method,
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "retrying upstream call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn decode_body(response: &HttpResponse) -> Result<Value, CallError> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|err| CallError::Decode {
        message: err.to_string(),
    })
}

/// Circuit key for a URL: host plus explicit port.
pub(crate) fn host_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// Copies headers for logging with credentials masked.
pub fn redact_headers(headers: &HashMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                (name.clone(), "***".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}
