//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when an
//! endpoint is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Endpoint is unhealthy, requests fail immediately
//! - HalfOpen: One trial request tests whether the endpoint recovered
//!
//! The breaker never terminates; it cycles between these states for as long
//! as the endpoint keeps recovering and failing.

use crate::error::{BoxError, ResilienceError};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Circuit is half-open, a single trial tests endpoint recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open to close circuit
    pub success_threshold: u32,
    /// Duration to hold the circuit open before admitting a trial
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::InvalidConfig(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceError::InvalidConfig(
                "success_threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Receives every state transition of a breaker
pub trait BreakerListener: Send + Sync {
    fn on_transition(&self, breaker: &str, from: CircuitState, to: CircuitState);
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub trial_in_flight: bool,
    /// Time spent in the current state
    pub since_transition: Duration,
}

/// Ticket for one call admitted by [`CircuitBreaker::allow`]
///
/// Every admission is resolved exactly once, through
/// [`CircuitBreaker::record_result`] or [`CircuitBreaker::abandon`]. An
/// admission remembers the breaker state it was issued in, so a call
/// admitted before a transition cannot settle a later half-open trial.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an admission must be resolved with record_result or abandon"]
pub struct Admission {
    generation: u64,
    trial: bool,
}

impl Admission {
    /// Whether this call is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    /// Consecutive failure count (closed state)
    failure_count: u32,
    /// Consecutive success count (half-open state)
    success_count: u32,
    /// A half-open trial has been admitted and not yet resolved
    trial_in_flight: bool,
    /// Bumped on every transition; admissions from older generations are stale
    generation: u64,
    last_transition_at: Instant,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            trial_in_flight: false,
            generation: 0,
            last_transition_at: Instant::now(),
        }
    }

    fn admit(&self, trial: bool) -> Admission {
        Admission {
            generation: self.generation,
            trial,
        }
    }

    fn is_current(&self, admission: &Admission) -> bool {
        admission.generation == self.generation
    }

    /// Move to `to`, resetting counters; returns the transition for listeners
    fn transition(&mut self, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let from = self.state;
        self.state = to;
        self.failure_count = 0;
        self.success_count = 0;
        self.trial_in_flight = false;
        self.generation += 1;
        self.last_transition_at = Instant::now();
        (from != to).then_some((from, to))
    }
}

/// Circuit breaker for one logical endpoint
///
/// Clones share state, so one breaker can guard every call made against
/// the endpoint.
///
/// # Example
/// ```
/// use tether_core_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig {
///     failure_threshold: 2,
///     ..Default::default()
/// });
///
/// for _ in 0..2 {
///     let admission = breaker.allow().expect("closed breaker admits");
///     breaker.record_result(admission, false);
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(breaker.allow().is_none());
/// ```
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
    listener: Option<Arc<dyn BreakerListener>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::named("default", config)
    }

    /// Create a circuit breaker whose name appears in logs and listener callbacks
    pub fn named(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
            listener: None,
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Attach a listener notified on every state transition
    pub fn with_listener(mut self, listener: Arc<dyn BreakerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        CircuitSnapshot {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            trial_in_flight: state.trial_in_flight,
            since_transition: state.last_transition_at.elapsed(),
        }
    }

    /// Decide whether a call may proceed
    ///
    /// Once `open_timeout` has elapsed in Open, the next call moves the
    /// breaker to HalfOpen and is admitted as the trial. While that trial is
    /// outstanding every other call is rejected.
    pub fn allow(&self) -> Option<Admission> {
        let (admission, transition) = {
            let mut state = self.state.lock();
            match state.state {
                CircuitState::Closed => (Some(state.admit(false)), None),
                CircuitState::Open => {
                    if state.last_transition_at.elapsed() >= self.config.open_timeout {
                        let transition = state.transition(CircuitState::HalfOpen);
                        state.trial_in_flight = true;
                        (Some(state.admit(true)), transition)
                    } else {
                        (None, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if state.trial_in_flight {
                        (None, None)
                    } else {
                        state.trial_in_flight = true;
                        (Some(state.admit(true)), None)
                    }
                }
            }
        };
        self.notify(transition);
        admission
    }

    /// Record the outcome of an admitted call
    ///
    /// Results from admissions issued before the last transition are
    /// ignored.
    pub fn record_result(&self, admission: Admission, success: bool) {
        let transition = {
            let mut state = self.state.lock();
            if !state.is_current(&admission) {
                debug!(
                    breaker = %self.name,
                    success,
                    state = %state.state,
                    "Ignoring result admitted before the last transition"
                );
                return;
            }
            match state.state {
                CircuitState::Closed if success => {
                    state.failure_count = 0;
                    None
                }
                CircuitState::Closed => {
                    state.failure_count += 1;
                    if state.failure_count >= self.config.failure_threshold {
                        state.transition(CircuitState::Open)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if !admission.trial => None,
                CircuitState::HalfOpen if success => {
                    state.trial_in_flight = false;
                    state.success_count += 1;
                    if state.success_count >= self.config.success_threshold {
                        state.transition(CircuitState::Closed)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => state.transition(CircuitState::Open),
                // Open admits nothing, so no current admission reports here.
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    /// Resolve an admitted call without counting it
    ///
    /// Used when an attempt failed for reasons unrelated to the endpoint's
    /// health. Frees the half-open trial slot if `admission` holds it.
    pub fn abandon(&self, admission: Admission) {
        let mut state = self.state.lock();
        if state.state == CircuitState::HalfOpen && admission.trial && state.is_current(&admission) {
            state.trial_in_flight = false;
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let transition = self.state.lock().transition(CircuitState::Closed);
        self.notify(transition);
    }

    /// Run one operation under breaker protection, without retries
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let Some(admission) = self.allow() else {
            return Err(ResilienceError::circuit_open());
        };
        match op().await {
            Ok(value) => {
                self.record_result(admission, true);
                Ok(value)
            }
            Err(e) => {
                self.record_result(admission, false);
                Err(ResilienceError::operation_failed(e))
            }
        }
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };
        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                %from,
                open_timeout = ?self.config.open_timeout,
                "Circuit breaker opened"
            ),
            _ => info!(breaker = %self.name, %from, %to, "Circuit breaker state changed"),
        }
        if let Some(listener) = &self.listener {
            listener.on_transition(&self.name, from, to);
        }
    }
}
