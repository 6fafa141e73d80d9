//! Resilient executor: breaker, retry policy and pool composed around one operation
//!
//! Each call runs a bounded attempt loop:
//!
//! 1. Ask the breaker for admission (fail fast with `CircuitOpen` otherwise)
//! 2. Acquire a connection from the pool
//! 3. Run the operation against it, racing the caller's context
//! 4. Release the connection, healthy only if the operation succeeded
//! 5. Report the attempt to the breaker
//! 6. Stop on success, on a structural error, on cancellation or when the
//!    retry policy says so; otherwise back off and go again
//!
//! The breaker is shared by every call against the endpoint, so retries
//! inside one call see (and feed) the same failure history as other callers.

use crate::circuit_breaker::CircuitBreaker;
use crate::connection_pool::ConnectionPool;
use crate::context::CallContext;
use crate::error::{BoxError, ResilienceError, Result};
use crate::observer::{ExecuteOutcome, ExecutionObserver, ExecutionReport};
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error};

/// Runs operations against one endpoint with retries, circuit breaking and pooling
pub struct ResilientExecutor<C: Send + 'static> {
    endpoint: Arc<str>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    pool: Arc<ConnectionPool<C>>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl<C: Send + 'static> fmt::Debug for ResilientExecutor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("endpoint", &self.endpoint)
            .field("breaker", &self.breaker.state())
            .field("retry", &self.retry)
            .field("pool", &self.pool.stats())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<C: Send + 'static> ResilientExecutor<C> {
    pub fn new(
        endpoint: impl Into<Arc<str>>,
        pool: Arc<ConnectionPool<C>>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            breaker,
            retry,
            pool,
            observers: Vec::new(),
        }
    }

    /// Register an observer for every call's outcome
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `op` against a pooled connection until it succeeds or a stop condition hits
    ///
    /// `op` is called once per attempt with exclusive access to the
    /// connection for that attempt.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let rows = executor
    ///     .execute(&ctx, |conn: &mut PgConnection| Box::pin(conn.query("SELECT 1")))
    ///     .await?;
    /// ```
    pub async fn execute<T, E, F>(&self, ctx: &CallContext, mut op: F) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut C) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let started = Instant::now();
        let (result, outcome) = self.run(ctx, &mut op).await;

        let report = ExecutionReport {
            endpoint: &self.endpoint,
            outcome,
            elapsed: started.elapsed(),
            breaker_state: self.breaker.state(),
        };
        for observer in &self.observers {
            observer.on_outcome(&report);
        }
        result
    }

    async fn run<T, E, F>(&self, ctx: &CallContext, op: &mut F) -> (Result<T>, ExecuteOutcome)
    where
        F: for<'a> FnMut(&'a mut C) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let max_attempts = self.retry.attempts();
        let mut attempts = 0;
        let mut last: Option<ResilienceError> = None;

        loop {
            if let Err(err) = ctx.check() {
                return (Err(err.into()), ExecuteOutcome::Cancelled { attempts });
            }
            let Some(admission) = self.breaker.allow() else {
                return (
                    Err(ResilienceError::CircuitOpen {
                        last: last.map(Box::new),
                    }),
                    ExecuteOutcome::CircuitOpen { attempts },
                );
            };

            attempts += 1;
            let err = match self.attempt(ctx, op).await {
                Ok(value) => {
                    self.breaker.record_result(admission, true);
                    return (Ok(value), ExecuteOutcome::Success { attempts });
                }
                Err(err) => err,
            };

            if err.should_trip_breaker() {
                self.breaker.record_result(admission, false);
            } else {
                self.breaker.abandon(admission);
            }

            match err {
                ResilienceError::AcquireTimeout(_) | ResilienceError::Cancelled(_) => {
                    return (Err(err), ExecuteOutcome::Cancelled { attempts });
                }
                _ if err.is_structural() => {
                    return (Err(err), ExecuteOutcome::Failed { attempts });
                }
                _ => {}
            }
            if let Err(ctx_err) = ctx.check() {
                return (Err(ctx_err.into()), ExecuteOutcome::Cancelled { attempts });
            }
            if !self.retry.is_retryable(&err) {
                debug!(endpoint = %self.endpoint, attempts, error = %err, "Error is not retryable");
                return (Err(err), ExecuteOutcome::Failed { attempts });
            }
            if attempts >= max_attempts {
                return (
                    Err(ResilienceError::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    }),
                    ExecuteOutcome::RetriesExhausted { attempts },
                );
            }

            let delay = self.retry.next_delay(attempts - 1);
            debug!(
                endpoint = %self.endpoint,
                attempt = attempts,
                max_attempts,
                ?delay,
                error = %err,
                "Attempt failed, backing off"
            );
            if let Err(ctx_err) = ctx.sleep(delay).await {
                return (Err(ctx_err.into()), ExecuteOutcome::Cancelled { attempts });
            }
            last = Some(err);
        }
    }

    /// One acquire, run, release cycle
    async fn attempt<T, E, F>(&self, ctx: &CallContext, op: &mut F) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut C) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let mut conn = self.pool.acquire(ctx).await?;
        let id = conn.id();

        let result = match conn.get_mut() {
            Some(raw) => {
                let operation = op(raw);
                tokio::select! {
                    biased;
                    err = ctx.done() => Err(ResilienceError::Cancelled(err)),
                    result = operation => result.map_err(ResilienceError::operation_failed),
                }
            }
            None => Err(ResilienceError::InvalidRelease {
                id,
                reason: "connection already released",
            }),
        };

        if let Err(e) = self.pool.release(&mut conn, result.is_ok()).await {
            error!(endpoint = %self.endpoint, id = %id, error = %e, "Failed to release connection");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::connection_pool::{ConnectionFactory, PoolConfig};
    use crate::context::ContextError;
    use crate::observer::OutcomeCounters;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Session {
        id: u32,
    }

    #[derive(Default)]
    struct SessionFactory {
        created: AtomicU32,
        refuse: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ConnectionFactory<Session> for SessionFactory {
        async fn create(&self) -> std::result::Result<Session, BoxError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(Box::new(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Session { id })
        }
    }

    struct Harness {
        factory: Arc<SessionFactory>,
        pool: Arc<ConnectionPool<Session>>,
        breaker: Arc<CircuitBreaker>,
        counters: OutcomeCounters,
    }

    impl Harness {
        fn new(failure_threshold: u32) -> Self {
            let factory = Arc::new(SessionFactory::default());
            let pool = Arc::new(ConnectionPool::new(
                factory.clone(),
                PoolConfig {
                    max_open: 2,
                    max_idle: 2,
                    ..Default::default()
                },
            ));
            let breaker = Arc::new(CircuitBreaker::named(
                "sessions",
                CircuitBreakerConfig {
                    failure_threshold,
                    success_threshold: 1,
                    open_timeout: Duration::from_secs(30),
                },
            ));
            Self {
                factory,
                pool,
                breaker,
                counters: OutcomeCounters::new(),
            }
        }

        fn executor(&self, retry: RetryPolicy) -> ResilientExecutor<Session> {
            ResilientExecutor::new(
                "sessions",
                self.pool.clone(),
                self.breaker.clone(),
                retry,
            )
            .with_observer(Arc::new(self.counters.clone()))
        }
    }

    fn retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10), Duration::from_millis(100))
            .with_jitter(false)
    }

    /// An operation failing its first `failures` calls
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
    ) -> impl for<'a> FnMut(&'a mut Session) -> BoxFuture<'a, std::result::Result<u32, io::Error>> {
        move |session: &mut Session| {
            let calls = calls.clone();
            Box::pin(async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= failures {
                    Err(io::Error::other(format!("call {call} failed")))
                } else {
                    Ok(session.id)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let harness = Harness::new(5);
        let executor = harness.executor(retry(3));
        let calls = Arc::new(AtomicU32::new(0));

        let id = executor
            .execute(&CallContext::new(), flaky(calls.clone(), 0))
            .await
            .unwrap();

        assert_eq!(id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.counters.snapshot().success, 1);

        let stats = harness.pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let harness = Harness::new(5);
        let executor = harness.executor(retry(3));
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), 2))
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms then 20ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(30));

        let snapshot = harness.counters.snapshot();
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.retried, 1);
        assert_eq!(snapshot.attempts, 3);

        // Failed attempts close their connection, the success is pooled.
        assert_eq!(harness.factory.created.load(Ordering::SeqCst), 3);
        assert_eq!(harness.pool.stats().idle, 1);
        assert_eq!(harness.breaker.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let harness = Harness::new(10);
        let executor = harness.executor(retry(3));
        let calls = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), u32::MAX))
            .await;

        match result {
            Err(ResilienceError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ResilienceError::OperationFailed(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.counters.snapshot().retries_exhausted, 1);
        assert_eq!(harness.breaker.snapshot().failure_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let harness = Harness::new(10);
        let executor = harness.executor(retry(5).with_classifier(|_| false));
        let calls = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), u32::MAX))
            .await;

        assert!(matches!(result, Err(ResilienceError::OperationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.counters.snapshot().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_never_attempts() {
        let harness = Harness::new(1);
        let admission = harness.breaker.allow().unwrap();
        harness.breaker.record_result(admission, false);
        assert_eq!(harness.breaker.state(), CircuitState::Open);

        let executor = harness.executor(retry(3));
        let calls = Arc::new(AtomicU32::new(0));
        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), 0))
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { last: None })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.pool.stats().total_created, 0);
        assert_eq!(harness.counters.snapshot().circuit_open, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opening_mid_call_fails_fast() {
        let harness = Harness::new(2);
        let executor = harness.executor(retry(5));
        let calls = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), u32::MAX))
            .await;

        match result {
            Err(ResilienceError::CircuitOpen { last: Some(last) }) => {
                assert!(matches!(*last, ResilienceError::OperationFailed(_)));
            }
            other => panic!("expected CircuitOpen carrying the last failure, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_are_retried() {
        let harness = Harness::new(10);
        harness.factory.refuse.store(true, Ordering::SeqCst);
        let executor = harness.executor(retry(3));
        let calls = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), 0))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ResilienceError::RetriesExhausted { attempts: 3, .. }));
        assert!(matches!(err.root(), ResilienceError::ConnectFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.pool.stats().open, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retries() {
        let harness = Harness::new(10);
        let executor = harness.executor(retry(5));
        let ctx = CallContext::new();
        let calls = Arc::new(AtomicU32::new(0));
        let op_ctx = ctx.clone();
        let op_calls = calls.clone();

        let result = executor
            .execute(&ctx, move |_session: &mut Session| {
                let ctx = op_ctx.clone();
                let calls = op_calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ctx.cancel();
                    Err::<(), _>(io::Error::other("interrupted"))
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::Cancelled(ContextError::Cancelled))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.counters.snapshot().cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_backoff() {
        let harness = Harness::new(10);
        let executor = harness.executor(
            RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10)).with_jitter(false),
        );
        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let result = executor.execute(&ctx, flaky(calls.clone(), u32::MAX)).await;

        assert!(matches!(
            result,
            Err(ResilienceError::Cancelled(ContextError::DeadlineExceeded))
        ));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_cut_off_by_deadline() {
        let harness = Harness::new(1);
        let executor = harness.executor(retry(3));
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));

        let result = executor
            .execute(&ctx, |_session: &mut Session| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, io::Error>(())
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::Cancelled(ContextError::DeadlineExceeded))
        ));
        // Caller cancellation says nothing about endpoint health.
        assert_eq!(harness.breaker.state(), CircuitState::Closed);
        assert_eq!(harness.breaker.snapshot().failure_count, 0);
        // The interrupted connection is not reused.
        let stats = harness.pool.stats();
        assert_eq!(stats.open, 0);
        assert_eq!(stats.total_closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_is_not_retried() {
        let harness = Harness::new(1);
        let ctx = CallContext::new();
        let _held1 = harness.pool.acquire(&ctx).await.unwrap();
        let _held2 = harness.pool.acquire(&ctx).await.unwrap();

        let executor = harness.executor(retry(3));
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let result = executor.execute(&ctx, flaky(calls.clone(), 0)).await;

        assert!(matches!(result, Err(ResilienceError::AcquireTimeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.breaker.state(), CircuitState::Closed);
        assert_eq!(
            harness.counters.snapshot().cancelled,
            1,
            "acquire timeout is reported as a cancelled call"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_released_on_pool_closed() {
        let harness = Harness::new(1);
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            open_timeout: Duration::ZERO,
        }));
        let admission = breaker.allow().unwrap();
        breaker.record_result(admission, false);
        harness.pool.close().await;

        let executor = ResilientExecutor::new(
            "sessions",
            harness.pool.clone(),
            breaker.clone(),
            retry(3),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let result = executor
            .execute(&CallContext::new(), flaky(calls.clone(), 0))
            .await;

        assert!(matches!(result, Err(ResilienceError::PoolClosed)));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.snapshot().trial_in_flight);
    }
}
