/*!
 * Tether - Resilient connection pooling
 *
 * Configuration, logging and a load simulator on top of the
 * `tether-core-resilience` primitives:
 * - Bounded connection pool with FIFO waiters, lifetime and idle eviction
 * - Per-endpoint circuit breaker with a single half-open trial
 * - Exponential backoff retries with jitter and error classification
 * - Resilient executor composing the three under a caller deadline
 */

pub mod cli_style;
pub mod config;
pub mod error;
pub mod logging;
pub mod simulate;

// Re-export commonly used types
pub use config::{LogLevel, LoggingConfig, TetherConfig};
pub use error::{Result, TetherError};
pub use simulate::{run_simulation, SimulationOptions, SimulationReport};
pub use tether_core_resilience as resilience;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
