//! Error types for the probing controller.

use std::path::PathBuf;

use thiserror::Error;

use ticketflow_pool::PoolError;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating a `ProbingConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid probing config: {0}")]
    Invalid(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to obtain the scoped context a cycle runs in.
///
/// Always transient: the cycle is skipped and retried on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("execution context unavailable: {0}")]
    Unavailable(String),

    #[error("execution context provider is shutting down")]
    ShuttingDown,
}

/// A resize rejected by one of the admission pools.
///
/// When the write pool rejects after the read pool accepted, the read
/// pool has already been put back to its previous capacity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuationError {
    #[error("read pool rejected resize to {capacity}: {source}")]
    Read {
        capacity: u32,
        #[source]
        source: PoolError,
    },

    #[error("write pool rejected resize to {capacity}: {source}")]
    Write {
        capacity: u32,
        #[source]
        source: PoolError,
    },
}
