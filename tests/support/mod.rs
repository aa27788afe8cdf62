#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use esim_gateway::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use esim_gateway::resilience::{CircuitBreakerConfig, RetryPolicy, TransportConfig};
use serde_json::Value;

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Never completes; only the per-attempt deadline ends the call.
    Hang,
}

/// In-process [`HttpTransport`] that replays a queue of outcomes and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
    attempts: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, step: Step) -> &Self {
        self.steps
            .lock()
            .expect("steps lock")
            .push_back(step);
        self
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(Step::Respond(HttpResponse::json(status, &body)))
    }

    pub fn push_status(&self, status: u16) -> &Self {
        self.push(Step::Respond(HttpResponse {
            status,
            headers: Default::default(),
            body: Vec::new(),
        }))
    }

    /// Outcome used once the queue is drained.
    pub fn always(&self, step: Step) -> &Self {
        *self.fallback.lock().expect("fallback lock") = Some(step);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests()
            .pop()
            .expect("at least one request was sent")
    }

    /// Request paths in order, with method, e.g. `GET /v2.5/organisation`.
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| {
                let path = url::Url::parse(&request.url)
                    .map(|url| url.path().to_string())
                    .unwrap_or_else(|_| request.url.clone());
                format!("{} {path}", request.method.as_str())
            })
            .collect()
    }

    fn next_step(&self) -> Step {
        if let Some(step) = self.steps.lock().expect("steps lock").pop_front() {
            return step;
        }
        self.fallback
            .lock()
            .expect("fallback lock")
            .clone()
            .unwrap_or_else(|| panic!("scripted transport ran out of steps"))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);
        match self.next_step() {
            Step::Respond(response) => Ok(response),
            Step::Fail(err) => Err(err),
            Step::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
        }
    }
}

/// Transport settings with deterministic backoff.
pub fn transport_config(max_retries: u32, failure_threshold: u32) -> TransportConfig {
    TransportConfig {
        retry: RetryPolicy {
            max_retries,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            cooldown_ms: 60_000,
        },
        request_timeout_ms: 5_000,
    }
}

pub fn body_json(request: &HttpRequest) -> Value {
    let body = request.body.as_deref().expect("request has a body");
    serde_json::from_slice(body).expect("request body is json")
}

pub fn query_value(request: &HttpRequest, name: &str) -> Option<String> {
    let url = url::Url::parse(&request.url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

pub fn is_get(request: &HttpRequest) -> bool {
    request.method == HttpMethod::Get
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
