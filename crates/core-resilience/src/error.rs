//! Error types for the resilience primitives

use crate::connection_pool::ConnectionId;
use crate::context::ContextError;
use thiserror::Error;

/// Boxed error produced by a connection factory or a caller-supplied operation
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Errors that can occur in resilience operations
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The connection factory could not produce a connection
    #[error("Failed to open connection: {0}")]
    ConnectFailed(#[source] BoxError),

    /// The caller's context expired while waiting for a pool slot
    #[error("Timed out waiting for a pooled connection")]
    AcquireTimeout(#[source] ContextError),

    /// The pool no longer accepts acquisitions
    #[error("Connection pool is closed")]
    PoolClosed,

    /// A connection was released twice or released to a pool it does not belong to
    #[error("Invalid release of connection {id}: {reason}")]
    InvalidRelease {
        id: ConnectionId,
        reason: &'static str,
    },

    /// Circuit breaker rejected the call without attempting it
    ///
    /// `last` is the failure of the previous attempt when the breaker
    /// opened between retries of the same call.
    #[error("Circuit breaker is open, rejecting requests")]
    CircuitOpen {
        #[source]
        last: Option<Box<ResilienceError>>,
    },

    /// The caller-supplied operation failed
    #[error("Operation failed: {0}")]
    OperationFailed(#[source] BoxError),

    /// Every permitted attempt failed
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ResilienceError>,
    },

    /// The caller's context was cancelled or its deadline passed
    #[error("Call cancelled: {0}")]
    Cancelled(#[from] ContextError),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// Wrap a factory error
    pub fn connect_failed(err: impl Into<BoxError>) -> Self {
        ResilienceError::ConnectFailed(err.into())
    }

    /// Rejection before any attempt was made
    pub fn circuit_open() -> Self {
        ResilienceError::CircuitOpen { last: None }
    }

    /// Wrap an operation error
    pub fn operation_failed(err: impl Into<BoxError>) -> Self {
        ResilienceError::OperationFailed(err.into())
    }

    /// Check if this error is transient and may be retried locally
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResilienceError::ConnectFailed(_) | ResilienceError::OperationFailed(_)
        )
    }

    /// Check if this error must be surfaced without local recovery
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ResilienceError::AcquireTimeout(_)
                | ResilienceError::PoolClosed
                | ResilienceError::InvalidRelease { .. }
                | ResilienceError::CircuitOpen { .. }
                | ResilienceError::Cancelled(_)
                | ResilienceError::InvalidConfig(_)
        )
    }

    /// Check if this error says something about the endpoint's health
    pub fn should_trip_breaker(&self) -> bool {
        self.is_transient()
    }

    /// The innermost resilience error, looking through `RetriesExhausted`
    pub fn root(&self) -> &ResilienceError {
        match self {
            ResilienceError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_error_classification() {
        let connect = ResilienceError::connect_failed(io::Error::other("refused"));
        assert!(connect.is_transient());
        assert!(!connect.is_structural());
        assert!(connect.should_trip_breaker());

        let circuit_open = ResilienceError::circuit_open();
        assert!(!circuit_open.is_transient());
        assert!(circuit_open.is_structural());
        assert!(!circuit_open.should_trip_breaker());

        let timeout = ResilienceError::AcquireTimeout(ContextError::DeadlineExceeded);
        assert!(timeout.is_structural());
        assert!(!timeout.should_trip_breaker());
    }

    #[test]
    fn test_retries_exhausted_preserves_cause() {
        let err = ResilienceError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ResilienceError::operation_failed(io::Error::other(
                "connection reset",
            ))),
        };

        assert!(matches!(err.root(), ResilienceError::OperationFailed(_)));

        let source = err.source().expect("exhausted error has a source");
        let inner = source.source().expect("operation error has a source");
        assert_eq!(inner.to_string(), "connection reset");
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_circuit_open_keeps_previous_failure() {
        assert!(ResilienceError::circuit_open().source().is_none());

        let err = ResilienceError::CircuitOpen {
            last: Some(Box::new(ResilienceError::operation_failed(io::Error::other(
                "broken pipe",
            )))),
        };
        let source = err.source().expect("previous failure is the source");
        assert!(source.to_string().contains("broken pipe"));
    }
}
