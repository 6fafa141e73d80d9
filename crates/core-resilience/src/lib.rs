//! Tether Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the building blocks for talking to an unreliable
//! endpoint through a bounded set of reusable connections. It includes:
//!
//! - **Connection Pool**: Bounded connection reuse with lifetime and idle eviction, FIFO waiters and health checks
//! - **Circuit Breaker**: Fails fast while an endpoint is unhealthy, tests recovery with a single trial
//! - **Retry Policy**: Exponential backoff with jitter and error classification
//! - **Resilient Executor**: Composes the three around one caller-supplied operation
//! - **Call Context**: Deadlines and cooperative cancellation observed at every blocking point
//! - **Observers**: Per-call outcome hooks for logging and metrics sinks
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Concrete backends (SQL drivers, HTTP transports, raw sockets)
//! - Configuration file formats
//! - Application-specific concerns
//!
//! Backends plug in through [`ConnectionFactory`]. All state lives in the
//! pool and breaker instances passed to the executor; there are no
//! process-wide singletons.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ execute(ctx, op)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Resilient Executor                │  ← Bounded attempt loop
//! │  (Retry policy, cancellable backoff)    │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Tracks failures, opens on threshold)  │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Connection Pool                   │  ← Resource efficiency
//! │  (Reuse connections, health checks)     │
//! └─────────────┬───────────────────────────┘
//!               │ ConnectionFactory
//!               ▼
//!         External Endpoint
//!      (Database, HTTP, Socket)
//!
//!  Every call ends in one ExecuteOutcome → ExecutionObserver(s)
//! ```
//!
//! # Usage Example
//!
//! ## Basic Circuit Breaker
//!
//! ```
//! use tether_core_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     success_threshold: 1,
//!     open_timeout: Duration::from_secs(30),
//! });
//!
//! for _ in 0..3 {
//!     if let Some(admission) = breaker.allow() {
//!         breaker.record_result(admission, false);
//!     }
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! ```
//!
//! ## Executor over a Connection Pool
//!
//! ```no_run
//! use tether_core_resilience::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Socket;
//!
//! impl Socket {
//!     async fn ping(&mut self) -> std::io::Result<u32> {
//!         Ok(1)
//!     }
//! }
//!
//! struct SocketFactory;
//!
//! #[async_trait::async_trait]
//! impl ConnectionFactory<Socket> for SocketFactory {
//!     async fn create(&self) -> Result<Socket, BoxError> {
//!         Ok(Socket)
//!     }
//! }
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let pool = Arc::new(ConnectionPool::new(Arc::new(SocketFactory), PoolConfig::default()));
//! let breaker = Arc::new(CircuitBreaker::named("socket", CircuitBreakerConfig::default()));
//! let executor = ResilientExecutor::new("socket", pool, breaker, RetryPolicy::default())
//!     .with_observer(Arc::new(TracingObserver));
//!
//! let ctx = CallContext::new().with_timeout(Duration::from_secs(2));
//! let pong = executor
//!     .execute(&ctx, |socket: &mut Socket| Box::pin(socket.ping()))
//!     .await?;
//! # let _ = pong;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod connection_pool;
pub mod context;
pub mod error;
pub mod executor;
pub mod observer;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{
    Admission, BreakerListener, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};
pub use connection_pool::{
    ConnectionFactory, ConnectionId, ConnectionPool, ConnectionState, PoolConfig, PoolStats,
    PooledConnection,
};
pub use context::{CallContext, ContextError};
pub use error::{BoxError, ResilienceError};
pub use executor::ResilientExecutor;
pub use observer::{
    ExecuteOutcome, ExecutionObserver, ExecutionReport, OutcomeCounters, OutcomeSnapshot,
    TracingObserver,
};
pub use retry::{Classifier, RetryPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use tether_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig, PooledConnection};
    pub use super::context::CallContext;
    pub use super::error::{BoxError, ResilienceError};
    pub use super::executor::ResilientExecutor;
    pub use super::observer::{ExecuteOutcome, ExecutionObserver, OutcomeCounters, TracingObserver};
    pub use super::retry::RetryPolicy;
}
