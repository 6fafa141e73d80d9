/*!
 * Simulated endpoint for exercising the resilience stack
 *
 * `SimulatedFactory` opens in-memory connections that fail at configurable
 * rates, so a full pool + breaker + retry stack can be driven under load
 * without a real backend.
 */

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use tether_core_resilience::{
    BoxError, BreakerListener, CallContext, CircuitBreaker, CircuitSnapshot, CircuitState,
    ConnectionFactory, ConnectionPool, OutcomeCounters, OutcomeSnapshot, PoolStats,
    ResilientExecutor, TracingObserver,
};

use crate::config::TetherConfig;
use crate::error::{Result, TetherError};

/// Failure injected by the simulated endpoint
#[derive(Debug, thiserror::Error)]
pub enum SimulatedError {
    #[error("simulated endpoint refused the connection")]
    ConnectRefused,

    #[error("simulated request failed on connection {0}")]
    RequestFailed(u64),
}

/// One in-memory connection to the simulated endpoint
#[derive(Debug)]
pub struct SimulatedConnection {
    id: u64,
    served: u64,
}

impl SimulatedConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests completed on this connection
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Serve one request, failing with probability `failure_rate`
    pub async fn request(
        &mut self,
        failure_rate: f64,
        latency: Duration,
    ) -> std::result::Result<u64, SimulatedError> {
        let fail = rand::rng().random_bool(failure_rate);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(SimulatedError::RequestFailed(self.id));
        }
        self.served += 1;
        Ok(self.served)
    }
}

/// Opens simulated connections, refusing with probability `connect_failure_rate`
#[derive(Debug)]
pub struct SimulatedFactory {
    connect_failure_rate: f64,
    connect_latency: Duration,
    next_id: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl SimulatedFactory {
    pub fn new(connect_failure_rate: f64, connect_latency: Duration) -> Self {
        Self {
            connect_failure_rate,
            connect_latency,
            next_id: AtomicU64::new(0),
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ConnectionFactory<SimulatedConnection> for SimulatedFactory {
    async fn create(&self) -> std::result::Result<SimulatedConnection, BoxError> {
        let refuse = rand::rng().random_bool(self.connect_failure_rate);
        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }
        if refuse {
            return Err(Box::new(SimulatedError::ConnectRefused));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(SimulatedConnection { id, served: 0 })
    }

    async fn close(&self, _conn: SimulatedConnection) -> std::result::Result<(), BoxError> {
        self.closed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Counts breaker state transitions
#[derive(Debug, Default)]
struct TransitionCounter {
    transitions: AtomicUsize,
    opened: AtomicUsize,
}

impl BreakerListener for TransitionCounter {
    fn on_transition(&self, _breaker: &str, _from: CircuitState, to: CircuitState) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
        if to == CircuitState::Open {
            self.opened.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Load shape for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Total calls to issue
    pub requests: usize,
    /// Calls in flight at once
    pub concurrency: usize,
    /// Probability that a request fails
    pub failure_rate: f64,
    /// Probability that opening a connection fails
    pub connect_failure_rate: f64,
    /// Time each request and each connect takes
    pub latency: Duration,
    /// Per-call deadline, `None` for no deadline
    pub call_timeout: Option<Duration>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            requests: 1000,
            concurrency: 32,
            failure_rate: 0.05,
            connect_failure_rate: 0.01,
            latency: Duration::from_millis(5),
            call_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl SimulationOptions {
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("failure_rate", self.failure_rate),
            ("connect_failure_rate", self.connect_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(TetherError::Config(format!(
                    "{name} must be between 0.0 and 1.0, got {rate}"
                )));
            }
        }
        if self.concurrency == 0 {
            return Err(TetherError::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one simulation run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub endpoint: String,
    pub outcomes: OutcomeSnapshot,
    /// Pool state just before it was closed
    pub pool: PoolStats,
    pub breaker: CircuitSnapshot,
    pub breaker_transitions: usize,
    pub breaker_opened: usize,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub elapsed: Duration,
}

impl SimulationReport {
    /// Calls that did not succeed
    pub fn failed_calls(&self) -> u64 {
        self.outcomes.total() - self.outcomes.success
    }

    /// Calls completed per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.outcomes.total() as f64 / secs
        }
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Endpoint: {}", self.endpoint)?;
        writeln!(f, "{}", self.outcomes.format_summary())?;
        writeln!(
            f,
            "Pool: {} open, {} idle, {} created, {} closed, {} evicted, {} waits, {} timeouts",
            self.pool.open,
            self.pool.idle,
            self.pool.total_created,
            self.pool.total_closed,
            self.pool.total_evicted,
            self.pool.total_waits,
            self.pool.total_timeouts
        )?;
        write!(
            f,
            "Breaker: {} ({} transitions, opened {} times), elapsed {:.2?}",
            self.breaker.state, self.breaker_transitions, self.breaker_opened, self.elapsed
        )
    }
}

/// Drive `options.requests` calls through a full resilience stack built from `config`
pub async fn run_simulation(
    config: &TetherConfig,
    options: &SimulationOptions,
) -> Result<SimulationReport> {
    config.validate()?;
    options.validate()?;

    let factory = Arc::new(SimulatedFactory::new(
        options.connect_failure_rate,
        options.latency,
    ));
    let pool = Arc::new(ConnectionPool::try_new(
        factory.clone(),
        config.pool_config(),
    )?);
    let transitions = Arc::new(TransitionCounter::default());
    let breaker = Arc::new(
        CircuitBreaker::named(config.endpoint.as_str(), config.breaker_config())
            .with_listener(transitions.clone()),
    );
    let counters = OutcomeCounters::new();
    let executor = Arc::new(
        ResilientExecutor::new(
            config.endpoint.as_str(),
            pool.clone(),
            breaker.clone(),
            config.retry_policy(),
        )
        .with_observer(Arc::new(TracingObserver))
        .with_observer(Arc::new(counters.clone())),
    );

    if let Err(e) = pool.maintain_idle().await {
        warn!(error = %e, "Failed to pre-warm idle connections");
    }
    let reaper = config
        .reaper_interval()
        .map(|period| pool.spawn_reaper(period));

    info!(
        endpoint = %config.endpoint,
        requests = options.requests,
        concurrency = options.concurrency,
        "Starting simulation"
    );
    let started = Instant::now();
    let issued = Arc::new(AtomicUsize::new(0));

    let workers = (0..options.concurrency).map(|_| {
        let executor = executor.clone();
        let issued = issued.clone();
        let options = options.clone();
        tokio::spawn(async move {
            while issued.fetch_add(1, Ordering::Relaxed) < options.requests {
                let ctx = match options.call_timeout {
                    Some(timeout) => CallContext::new().with_timeout(timeout),
                    None => CallContext::new(),
                };
                let (failure_rate, latency) = (options.failure_rate, options.latency);
                // Failures are tallied by the observers.
                let _ = executor
                    .execute(&ctx, move |conn: &mut SimulatedConnection| {
                        Box::pin(conn.request(failure_rate, latency))
                    })
                    .await;
            }
        })
    });
    for joined in join_all(workers).await {
        if let Err(e) = joined {
            warn!(error = %e, "Simulation worker panicked");
        }
    }
    let elapsed = started.elapsed();

    let pool_stats = pool.stats();
    pool.close().await;
    if let Some(reaper) = reaper {
        reaper.abort();
    }

    Ok(SimulationReport {
        endpoint: config.endpoint.clone(),
        outcomes: counters.snapshot(),
        pool: pool_stats,
        breaker: breaker.snapshot(),
        breaker_transitions: transitions.transitions.load(Ordering::Relaxed),
        breaker_opened: transitions.opened.load(Ordering::Relaxed),
        connections_opened: factory.opened(),
        connections_closed: factory.closed(),
        elapsed,
    })
}
