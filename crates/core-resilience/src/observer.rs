//! Execution outcome hooks for metrics and logging sinks
//!
//! Every call through a [`ResilientExecutor`](crate::ResilientExecutor)
//! ends in exactly one [`ExecuteOutcome`], reported to each registered
//! [`ExecutionObserver`].

use crate::circuit_breaker::CircuitState;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal result of one `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The operation succeeded on attempt number `attempts`
    Success { attempts: u32 },
    /// Stopped on an error that is not retried
    Failed { attempts: u32 },
    /// Every permitted attempt failed
    RetriesExhausted { attempts: u32 },
    /// The breaker denied entry; `attempts` is zero when nothing ran
    CircuitOpen { attempts: u32 },
    /// The caller's context was cancelled or its deadline passed
    Cancelled { attempts: u32 },
}

impl ExecuteOutcome {
    /// Number of attempts that actually ran
    pub fn attempts(&self) -> u32 {
        match *self {
            ExecuteOutcome::Success { attempts }
            | ExecuteOutcome::Failed { attempts }
            | ExecuteOutcome::RetriesExhausted { attempts }
            | ExecuteOutcome::CircuitOpen { attempts }
            | ExecuteOutcome::Cancelled { attempts } => attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecuteOutcome::Success { .. })
    }

    /// More than one attempt ran
    pub fn was_retried(&self) -> bool {
        self.attempts() > 1
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecuteOutcome::Success { .. } => "success",
            ExecuteOutcome::Failed { .. } => "failed",
            ExecuteOutcome::RetriesExhausted { .. } => "retries_exhausted",
            ExecuteOutcome::CircuitOpen { .. } => "circuit_open",
            ExecuteOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

impl fmt::Display for ExecuteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s)", self.label(), self.attempts())
    }
}

/// Everything an observer learns about one finished call
#[derive(Debug, Clone, Copy)]
pub struct ExecutionReport<'a> {
    pub endpoint: &'a str,
    pub outcome: ExecuteOutcome,
    pub elapsed: Duration,
    /// Breaker state once the call finished
    pub breaker_state: CircuitState,
}

/// Receives the outcome of every `execute` call
pub trait ExecutionObserver: Send + Sync {
    fn on_outcome(&self, report: &ExecutionReport<'_>);
}

/// Logs every outcome through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_outcome(&self, report: &ExecutionReport<'_>) {
        let outcome = report.outcome;
        match outcome {
            ExecuteOutcome::Success { attempts } if attempts > 1 => info!(
                endpoint = report.endpoint,
                attempts,
                elapsed = ?report.elapsed,
                "Operation succeeded after retries"
            ),
            ExecuteOutcome::Success { .. } => debug!(
                endpoint = report.endpoint,
                elapsed = ?report.elapsed,
                "Operation succeeded"
            ),
            ExecuteOutcome::Failed { attempts } | ExecuteOutcome::RetriesExhausted { attempts } => {
                warn!(
                    endpoint = report.endpoint,
                    outcome = outcome.label(),
                    attempts,
                    breaker = %report.breaker_state,
                    elapsed = ?report.elapsed,
                    "Operation failed"
                )
            }
            ExecuteOutcome::CircuitOpen { attempts } => debug!(
                endpoint = report.endpoint,
                attempts,
                "Operation rejected by open circuit"
            ),
            ExecuteOutcome::Cancelled { attempts } => debug!(
                endpoint = report.endpoint,
                attempts,
                elapsed = ?report.elapsed,
                "Operation cancelled by caller"
            ),
        }
    }
}

/// Thread-safe tally of execution outcomes
#[derive(Debug, Clone, Default)]
pub struct OutcomeCounters {
    inner: Arc<OutcomeCountersInner>,
}

#[derive(Debug, Default)]
struct OutcomeCountersInner {
    success: AtomicU64,
    failed: AtomicU64,
    retries_exhausted: AtomicU64,
    circuit_open: AtomicU64,
    cancelled: AtomicU64,

    // Attempt statistics
    attempts: AtomicU64,
    retried: AtomicU64,
}

impl OutcomeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: ExecuteOutcome) {
        let counter = match outcome {
            ExecuteOutcome::Success { .. } => &self.inner.success,
            ExecuteOutcome::Failed { .. } => &self.inner.failed,
            ExecuteOutcome::RetriesExhausted { .. } => &self.inner.retries_exhausted,
            ExecuteOutcome::CircuitOpen { .. } => &self.inner.circuit_open,
            ExecuteOutcome::Cancelled { .. } => &self.inner.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.inner
            .attempts
            .fetch_add(u64::from(outcome.attempts()), Ordering::Relaxed);
        if outcome.was_retried() {
            self.inner.retried.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> OutcomeSnapshot {
        OutcomeSnapshot {
            success: self.inner.success.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            retries_exhausted: self.inner.retries_exhausted.load(Ordering::Relaxed),
            circuit_open: self.inner.circuit_open.load(Ordering::Relaxed),
            cancelled: self.inner.cancelled.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            retried: self.inner.retried.load(Ordering::Relaxed),
        }
    }
}

impl ExecutionObserver for OutcomeCounters {
    fn on_outcome(&self, report: &ExecutionReport<'_>) {
        self.record(report.outcome);
    }
}

/// Immutable view of [`OutcomeCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSnapshot {
    pub success: u64,
    pub failed: u64,
    pub retries_exhausted: u64,
    pub circuit_open: u64,
    pub cancelled: u64,
    /// Attempts run across every call
    pub attempts: u64,
    /// Calls that ran more than one attempt
    pub retried: u64,
}

impl OutcomeSnapshot {
    pub fn total(&self) -> u64 {
        self.success + self.failed + self.retries_exhausted + self.circuit_open + self.cancelled
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.success as f64 / total as f64) * 100.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Calls: {} total, {} successful ({:.1}%), {} failed, {} retries exhausted, {} circuit open, {} cancelled\n\
             Attempts: {} total, {} calls retried",
            self.total(),
            self.success,
            self.success_rate(),
            self.failed,
            self.retries_exhausted,
            self.circuit_open,
            self.cancelled,
            self.attempts,
            self.retried
        )
    }
}
