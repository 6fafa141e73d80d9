/*!
 * Integration tests for the simulated endpoint
 *
 * Full runs through pool, breaker and retry built from configuration.
 */

use std::time::Duration;

use tether::config::TetherConfig;
use tether::resilience::CircuitState;
use tether::simulate::{run_simulation, SimulationOptions};

fn options(requests: usize, concurrency: usize, failure_rate: f64) -> SimulationOptions {
    SimulationOptions {
        requests,
        concurrency,
        failure_rate,
        connect_failure_rate: 0.0,
        latency: Duration::from_millis(2),
        call_timeout: Some(Duration::from_secs(5)),
    }
}

#[tokio::test(start_paused = true)]
async fn test_pool_bound_holds_under_concurrency() {
    let mut config = TetherConfig::default();
    config.pool.max_open_connections = 3;
    config.pool.max_idle_connections = Some(3);

    let report = run_simulation(&config, &options(200, 16, 0.0)).await.unwrap();

    assert_eq!(report.outcomes.success, 200);
    assert!(report.connections_opened <= 3);
    assert!(report.pool.total_waits > 0);
    assert_eq!(report.pool.total_timeouts, 0);
    assert_eq!(report.connections_opened, report.connections_closed);
}

#[tokio::test(start_paused = true)]
async fn test_every_call_gets_an_outcome() {
    let report = run_simulation(&TetherConfig::default(), &options(120, 8, 0.3))
        .await
        .unwrap();

    assert_eq!(report.outcomes.total(), 120);
    assert_eq!(
        report.outcomes.success + report.failed_calls(),
        report.outcomes.total()
    );
    assert!(report.outcomes.attempts >= 120 - report.outcomes.circuit_open);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_sheds_remaining_calls() {
    let mut config = TetherConfig::default();
    config.retry.max_attempts = 1;

    let report = run_simulation(&config, &options(20, 1, 1.0)).await.unwrap();

    assert_eq!(report.outcomes.retries_exhausted, 5);
    assert_eq!(report.outcomes.circuit_open, 15);
    assert_eq!(report.outcomes.attempts, 5);
    assert_eq!(report.breaker_opened, 1);
    assert_eq!(report.breaker.state, CircuitState::Open);
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let result = run_simulation(&TetherConfig::default(), &options(10, 0, 0.0)).await;
    assert!(result.is_err());
}
