//! Error types for pool state operations.

use thiserror::Error;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by pool capacity validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool capacity is zero, no slot can be allocated")]
    CapacityExhausted,

    #[error("pool capacity cannot shrink from {current} to {requested}")]
    InvalidCapacityShrink { current: u32, requested: u32 },

    #[error("pool capacity {requested} exceeds the maximum of {max}")]
    CapacityTooLarge { requested: u32, max: u32 },
}
