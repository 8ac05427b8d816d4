//! Error types for tierstore

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine itself
#[derive(Debug, Error)]
pub enum Error {
    /// Pool size exceeds the RAM left unreserved by earlier pools
    #[error("pool {name} needs {requested} bytes but only {available} remain")]
    PoolTooLarge {
        /// Pool name
        name: String,
        /// Requested size in bytes
        requested: usize,
        /// Unreserved RAM in bytes
        available: usize,
    },

    /// Pool id was never handed out by `add_pool`
    #[error("unknown pool id {0}")]
    UnknownPool(u8),

    /// Too many pools for the id space
    #[error("pool limit of {0} reached")]
    TooManyPools(usize),

    /// Engine configuration rejected at open time
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}
