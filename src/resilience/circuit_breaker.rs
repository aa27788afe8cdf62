//! Per-host circuit breaker.
//!
//! State and the instant the circuit opened share one `AtomicU64` so every transition
//! is a single compare-and-swap. The consecutive failure counter lives beside it.
//! Nothing here blocks, and unrelated hosts never touch the same cell.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn bits(self) -> u64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is admitted (milliseconds).
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Why a call was refused without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitRejection {
    pub state: CircuitState,
    /// Time left until a probe may be admitted; `None` while a probe is in flight.
    pub retry_in: Option<Duration>,
}

fn pack(state: CircuitState, opened_at_ms: u64) -> u64 {
    (opened_at_ms << 2) | state.bits()
}

fn unpack(cell: u64) -> (CircuitState, u64) {
    (CircuitState::from_bits(cell), cell >> 2)
}

/// Circuit breaker guarding a single upstream host.
pub struct CircuitBreaker {
    host: String,
    config: CircuitBreakerConfig,
    cell: AtomicU64,
    failures: AtomicU32,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(host: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            host: host.into(),
            config,
            cell: AtomicU64::new(pack(CircuitState::Closed, 0)),
            failures: AtomicU32::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> CircuitState {
        unpack(self.cell.load(Ordering::Acquire)).0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn threshold(&self) -> u32 {
        self.config.failure_threshold.max(1)
    }

    /// Asks for permission to send one attempt.
    ///
    /// A closed circuit always admits. An open circuit rejects until the cooldown has
    /// elapsed, then exactly one caller wins the transition to half-open and receives
    /// a probe permit; everybody else is rejected until the probe settles.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CircuitRejection> {
        let mut current = self.cell.load(Ordering::Acquire);
        loop {
            let (state, opened_at) = unpack(current);
            match state {
                CircuitState::Closed => return Ok(CircuitPermit::new(self, false)),
                CircuitState::HalfOpen => {
                    return Err(CircuitRejection {
                        state,
                        retry_in: None,
                    });
                }
                CircuitState::Open => {
                    let elapsed = self.now_ms().saturating_sub(opened_at);
                    if elapsed < self.config.cooldown_ms {
                        return Err(CircuitRejection {
                            state,
                            retry_in: Some(Duration::from_millis(
                                self.config.cooldown_ms - elapsed,
                            )),
                        });
                    }
                    let probing = pack(CircuitState::HalfOpen, opened_at);
                    match self.cell.compare_exchange(
                        current,
                        probing,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            info!(host = %self.host, "circuit half-open, admitting probe");
                            return Ok(CircuitPermit::new(self, true));
                        }
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }

    fn on_success(&self, probe: bool) {
        self.failures.store(0, Ordering::Release);
        if probe {
            let current = self.cell.load(Ordering::Acquire);
            if unpack(current).0 == CircuitState::HalfOpen
                && self
                    .cell
                    .compare_exchange(
                        current,
                        pack(CircuitState::Closed, 0),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                info!(host = %self.host, "circuit closed");
            }
        }
    }

    fn on_failure(&self, probe: bool) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let current = self.cell.load(Ordering::Acquire);
        let (state, _) = unpack(current);
        let should_open = if probe {
            state == CircuitState::HalfOpen
        } else {
            state == CircuitState::Closed && failures >= self.threshold()
        };
        if !should_open {
            return;
        }
        let reopened = pack(CircuitState::Open, self.now_ms());
        if self
            .cell
            .compare_exchange(current, reopened, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(
                host = %self.host,
                failures,
                cooldown_ms = self.config.cooldown_ms,
                probe,
                "circuit opened"
            );
        }
    }

    /// A permit settled as neutral, or dropped without an outcome, does not count. Such a
    /// probe puts the circuit back to open with its original timestamp, so the next
    /// caller may probe right away.
    fn on_neutral(&self, probe: bool) {
        if !probe {
            return;
        }
        let current = self.cell.load(Ordering::Acquire);
        let (state, opened_at) = unpack(current);
        if state == CircuitState::HalfOpen {
            let _ = self.cell.compare_exchange(
                current,
                pack(CircuitState::Open, opened_at),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }
}

/// Admission for a single attempt. Settle it with [`CircuitPermit::record_success`],
/// [`CircuitPermit::record_failure`] or [`CircuitPermit::record_neutral`]; dropping it
/// unsettled is neutral.
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }

    /// Settles an attempt that says nothing about upstream health, such as a throttled
    /// response. The failure counter is left as it is.
    pub fn record_neutral(mut self) {
        self.settled = true;
        self.breaker.on_neutral(self.probe);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_neutral(self.probe);
        }
    }
}

/// Breakers keyed by upstream host.
///
/// The map is locked only to look up or insert an entry; breaker state itself is
/// lock-free.
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the breaker for `host`, creating it on first use.
    pub fn breaker_for(&self, host: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self
                .breakers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(breaker) = breakers.get(host) {
                return breaker.clone();
            }
        }
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(host, self.config.clone())))
            .clone()
    }

    /// Snapshot of every breaker created so far.
    pub fn snapshot(&self) -> BTreeMap<String, CircuitSnapshot> {
        let breakers = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers
            .iter()
            .map(|(host, breaker)| (host.clone(), breaker.snapshot()))
            .collect()
    }
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
