/*!
 * Configuration types for Tether
 *
 * The configuration is read once at startup and converted into the
 * constructor arguments of the pool, breaker and retry policy. Durations
 * are expressed in milliseconds; where a bound can be disabled, zero
 * disables it.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tether_core_resilience::{CircuitBreakerConfig, PoolConfig, RetryPolicy};

use crate::error::{Result, TetherError};

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Logical endpoint name, used in logs and breaker transitions
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub breaker: BreakerSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            pool: PoolSettings::default(),
            breaker: BreakerSettings::default(),
            retry: RetrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// `[pool]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum open connections (0 = unbounded)
    #[serde(default = "default_max_open")]
    pub max_open_connections: usize,

    /// Maximum idle connections kept for reuse (0 = never reuse)
    ///
    /// When unset, the pool default capped at `max_open_connections`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_connections: Option<usize>,

    /// Idle connections opened ahead of demand
    #[serde(default)]
    pub min_idle_connections: usize,

    /// Maximum connection age in milliseconds (0 = no limit)
    #[serde(default = "default_max_lifetime_ms")]
    pub connection_max_lifetime_ms: u64,

    /// Maximum time a connection may sit idle in milliseconds (0 = no limit)
    #[serde(default = "default_max_idle_time_ms")]
    pub connection_max_idle_time_ms: u64,

    /// Health-check idle connections before reuse once idle this long (0 = always)
    #[serde(default = "default_health_check_after_ms")]
    pub health_check_after_ms: u64,

    /// Background eviction sweep period in milliseconds (0 = lazy eviction only)
    #[serde(default)]
    pub reaper_interval_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolConfig::default().into()
    }
}

impl PoolSettings {
    /// Idle bound after defaulting
    pub fn max_idle(&self) -> usize {
        match self.max_idle_connections {
            Some(max_idle) => max_idle,
            None if self.max_open_connections > 0 => {
                PoolConfig::default().max_idle.min(self.max_open_connections)
            }
            None => PoolConfig::default().max_idle,
        }
    }
}

impl From<PoolConfig> for PoolSettings {
    fn from(config: PoolConfig) -> Self {
        Self {
            max_open_connections: config.max_open,
            max_idle_connections: Some(config.max_idle),
            min_idle_connections: config.min_idle,
            connection_max_lifetime_ms: optional_ms(config.max_lifetime),
            connection_max_idle_time_ms: optional_ms(config.max_idle_time),
            health_check_after_ms: millis(config.health_check_after),
            reaper_interval_ms: 0,
        }
    }
}

/// `[breaker]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close it again
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Time the circuit stays open before admitting a trial, in milliseconds
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

/// `[retry]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per call including the first (0 is treated as 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter_enabled: bool,

    /// Only retry connect and operation failures
    #[serde(default)]
    pub transient_only: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_enabled: true,
            transient_only: false,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "default".to_string()
}

fn default_max_open() -> usize {
    PoolConfig::default().max_open
}

fn default_max_lifetime_ms() -> u64 {
    optional_ms(PoolConfig::default().max_lifetime)
}

fn default_max_idle_time_ms() -> u64 {
    optional_ms(PoolConfig::default().max_idle_time)
}

fn default_health_check_after_ms() -> u64 {
    millis(PoolConfig::default().health_check_after)
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_timeout_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn optional_ms(duration: Option<Duration>) -> u64 {
    duration.map(millis).unwrap_or(0)
}

/// Zero disables the bound
fn bound_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl TetherConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| TetherError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| TetherError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pool sized for many short concurrent calls
    pub fn high_concurrency() -> Self {
        Self {
            pool: PoolConfig::high_concurrency().into(),
            retry: RetrySettings {
                max_attempts: 5,
                initial_delay_ms: 10,
                max_delay_ms: 500,
                multiplier: 1.5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Pool of few connections held for a long time
    pub fn long_lived() -> Self {
        Self {
            pool: PoolConfig::long_lived().into(),
            ..Default::default()
        }
    }

    /// Reject settings the pool, breaker or retry policy would not accept
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(TetherError::Config("endpoint must not be empty".to_string()));
        }
        let invalid = |e: tether_core_resilience::ResilienceError| TetherError::Config(e.to_string());
        self.pool_config().validate().map_err(invalid)?;
        self.breaker_config().validate().map_err(invalid)?;
        self.retry_policy().validate().map_err(invalid)?;
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_open: self.pool.max_open_connections,
            max_idle: self.pool.max_idle(),
            min_idle: self.pool.min_idle_connections,
            max_lifetime: bound_from_ms(self.pool.connection_max_lifetime_ms),
            max_idle_time: bound_from_ms(self.pool.connection_max_idle_time_ms),
            health_check_after: Duration::from_millis(self.pool.health_check_after_ms),
        }
    }

    /// Background sweep period, `None` when disabled
    pub fn reaper_interval(&self) -> Option<Duration> {
        bound_from_ms(self.pool.reaper_interval_ms)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            success_threshold: self.breaker.success_threshold,
            open_timeout: Duration::from_millis(self.breaker.open_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
        .with_multiplier(self.retry.multiplier)
        .with_jitter(self.retry.jitter_enabled);

        if self.retry.transient_only {
            policy.transient_only()
        } else {
            policy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_primitives() {
        let config = TetherConfig::default();
        assert!(config.validate().is_ok());

        let pool = config.pool_config();
        let expected = PoolConfig::default();
        assert_eq!(pool.max_open, expected.max_open);
        assert_eq!(pool.max_idle, expected.max_idle);
        assert_eq!(pool.max_lifetime, expected.max_lifetime);
        assert_eq!(pool.max_idle_time, expected.max_idle_time);

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert!(retry.jitter);
        assert!(retry.classifier.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = TetherConfig::from_toml_str(
            r#"
            endpoint = "orders-db"

            [pool]
            max_open_connections = 2
            max_idle_connections = 1

            [breaker]
            failure_threshold = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "orders-db");
        assert_eq!(config.pool.max_open_connections, 2);
        assert_eq!(config.pool.max_idle_connections, Some(1));
        assert_eq!(config.pool.health_check_after_ms, 30_000);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.success_threshold, 2);
        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_unset_idle_bound_follows_small_max_open() {
        let config = TetherConfig::from_toml_str("[pool]\nmax_open_connections = 2\n").unwrap();
        assert_eq!(config.pool.max_idle_connections, None);
        assert_eq!(config.pool_config().max_idle, 2);
        assert!(config.validate().is_ok());

        let unbounded = TetherConfig::from_toml_str("[pool]\nmax_open_connections = 0\n").unwrap();
        assert_eq!(unbounded.pool_config().max_idle, PoolConfig::default().max_idle);

        let explicit =
            TetherConfig::from_toml_str("[pool]\nmax_open_connections = 2\nmax_idle_connections = 4\n")
                .unwrap();
        assert!(explicit.validate().is_err());
    }

    #[test]
    fn test_zero_disables_bounds() {
        let mut config = TetherConfig::default();
        config.pool.connection_max_lifetime_ms = 0;
        config.pool.connection_max_idle_time_ms = 0;
        config.pool.max_open_connections = 0;

        let pool = config.pool_config();
        assert_eq!(pool.max_lifetime, None);
        assert_eq!(pool.max_idle_time, None);
        assert_eq!(pool.max_open, 0);
        assert!(config.reaper_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_settings_conversion() {
        let mut config = TetherConfig::default();
        config.retry = RetrySettings {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            multiplier: 2.0,
            jitter_enabled: false,
            transient_only: true,
        };

        let policy = config.retry_policy();
        assert_eq!(policy.next_delay(0), Duration::from_millis(10));
        assert_eq!(policy.next_delay(1), Duration::from_millis(20));
        assert!(!policy.is_retryable(&tether_core_resilience::ResilienceError::PoolClosed));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = TetherConfig::default();
        config.pool.max_idle_connections = Some(50);
        assert!(matches!(config.validate(), Err(TetherError::Config(_))));

        let mut config = TetherConfig::default();
        config.breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = TetherConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = TetherConfig::default();
        config.endpoint = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = TetherConfig::from_toml_str("[logging]\nlevel = \"loud\"\n");
        assert!(matches!(result, Err(TetherError::ConfigParse(_))));
    }

    #[test]
    fn test_presets_are_valid() {
        for config in [TetherConfig::high_concurrency(), TetherConfig::long_lived()] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
        assert_eq!(TetherConfig::long_lived().pool.max_open_connections, 4);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
