//! Circuit breaker for per-agent fault isolation
//!
//! Prevents cascading failures by blocking calls to an agent that keeps
//! failing. State machine: Closed (calls pass) -> Open (calls fail
//! immediately) -> HalfOpen (one trial call) -> Closed on success or back
//! to Open on failure. The breaker wraps a single call and never retries;
//! retries are the fleet manager's responsibility.

use cedar_types::{AgentId, FleetError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are blocked.
    Open,
    /// One trial request is allowed to probe recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding calls to a single agent.
pub struct CircuitBreaker {
    agent_id: AgentId,
    threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(agent_id: AgentId, threshold: u32, timeout: Duration) -> Self {
        Self {
            agent_id,
            threshold,
            timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Current state, applying the Open -> HalfOpen timeout transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap();
        Self::check_timeout(&mut inner, self.timeout, &self.agent_id);
        inner.state
    }

    /// Whether a call may proceed right now.
    ///
    /// In HalfOpen only a single trial is admitted; concurrent callers are
    /// rejected until that trial resolves.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        Self::check_timeout(&mut inner, self.timeout, &self.agent_id);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(agent_id = %self.agent_id, "Circuit closing after successful trial");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_failure = None;
                inner.trial_in_flight = false;
            }
            CircuitState::Open => {
                debug!(agent_id = %self.agent_id, "Success recorded while circuit open");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.threshold {
                    warn!(
                        agent_id = %self.agent_id,
                        failures = inner.failure_count,
                        "Circuit opening after consecutive failures"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!(agent_id = %self.agent_id, "Circuit re-opening after failed trial");
                inner.failure_count += 1;
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Reset to Closed, e.g. after the agent was repaired.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
    }

    /// Run one call through the breaker.
    ///
    /// Returns `CircuitOpen` immediately, without invoking the closure,
    /// when calls are blocked.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.allow_request() {
            return Err(FleetError::CircuitOpen(self.agent_id.clone()));
        }
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn check_timeout(inner: &mut BreakerInner, timeout: Duration, agent_id: &AgentId) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner.last_failure.map(|at| at.elapsed());
        if elapsed.map(|e| e >= timeout).unwrap_or(true) {
            info!(agent_id = %agent_id, "Circuit transitioning to half-open after timeout");
            inner.state = CircuitState::HalfOpen;
            inner.trial_in_flight = false;
        }
    }
}

/// Per-agent circuit breakers, created on first use.
pub struct BreakerBoard {
    threshold: u32,
    timeout: Duration,
    breakers: DashMap<AgentId, Arc<CircuitBreaker>>,
}

impl BreakerBoard {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for an agent, created lazily.
    pub fn breaker(&self, agent_id: &AgentId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(agent_id.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    agent_id.clone(),
                    self.threshold,
                    self.timeout,
                ))
            })
            .clone()
    }

    /// Current state without creating a breaker.
    pub fn state(&self, agent_id: &AgentId) -> Option<CircuitState> {
        self.breakers.get(agent_id).map(|b| b.state())
    }

    /// Reset an agent's breaker after repair.
    pub fn reset(&self, agent_id: &AgentId) {
        if let Some(breaker) = self.breakers.get(agent_id) {
            breaker.reset();
        }
    }

    /// Drop the breaker for a removed agent.
    pub fn remove(&self, agent_id: &AgentId) {
        self.breakers.remove(agent_id);
    }
}
