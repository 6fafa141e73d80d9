/*!
 * Error types for Tether
 */

use std::io;
use std::path::PathBuf;
use tether_core_resilience::ResilienceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TetherError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum TetherError {
    /// Configuration value rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read or written
    #[error("Configuration file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be rendered as TOML
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Logging could not be initialised
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error surfaced by the resilience primitives
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// Simulation run finished with failed calls
    #[error("Simulation finished with {failed} of {total} calls failed")]
    SimulationFailures { failed: u64, total: u64 },
}

impl TetherError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TetherError::Config(_)
            | TetherError::ConfigFile { .. }
            | TetherError::ConfigParse(_)
            | TetherError::ConfigSerialize(_)
            | TetherError::Logging(_)
            | TetherError::Io(_) => EXIT_FATAL,
            TetherError::Resilience(e) if e.is_structural() => EXIT_FATAL,
            TetherError::Resilience(_) | TetherError::SimulationFailures { .. } => EXIT_PARTIAL,
        }
    }
}
