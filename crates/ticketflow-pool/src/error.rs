//! Ticket pool error types.

use thiserror::Error;

/// Result type alias for ticket pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur when acquiring from or resizing a pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("ticket pool '{0}' is closed")]
    Closed(String),

    #[error("invalid capacity {capacity} for ticket pool '{pool}'")]
    InvalidCapacity { pool: String, capacity: u32 },
}
