//! Error types for tierbench

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the adapter.
///
/// A read miss is not an error; reads return `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// Mode string is not one of striping, tiering, most or caching
    #[error("unknown tier mode: {0:?}")]
    UnknownTierMode(String),

    /// A configuration value is missing, unparsable or out of range
    #[error("invalid config {key}: {reason}")]
    InvalidConfig {
        /// Property key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// A length prefix points past the end of the buffer
    #[error("malformed row encoding at byte {offset}: {reason}")]
    MalformedEncoding {
        /// Offset of the pair that failed to decode
        offset: usize,
        /// Decoder detail
        reason: String,
    },

    /// The row decoded cleanly but did not carry the expected fields
    #[error("incomplete record: expected {expected} fields, found {found}")]
    IncompleteRecord {
        /// Fields requested or declared
        expected: usize,
        /// Fields actually decoded
        found: usize,
    },

    /// A field name or value does not fit the u32 length prefix
    #[error("field of {len} bytes is too large to encode")]
    FieldTooLarge {
        /// Offending length
        len: usize,
    },

    /// The engine could not allocate an item of this size
    #[error("allocation of {size} bytes failed in pool {pool}")]
    AllocationFailed {
        /// Shard the write was routed to
        pool: usize,
        /// Encoded row size
        size: usize,
    },

    /// Scan start key lacks the configured prefix or numeric suffix
    #[error("invalid scan key: {0:?}")]
    InvalidScanKey(String),

    /// Read issued by a worker that never registered
    #[error("worker {0} is not registered")]
    WorkerNotRegistered(usize),

    /// Worker id beyond the registry size
    #[error("worker {worker} out of range (max {capacity})")]
    WorkerOutOfRange {
        /// Worker id
        worker: usize,
        /// Registry size
        capacity: usize,
    },

    /// Shard index beyond the pool count
    #[error("shard {shard} out of range ({count} pools)")]
    ShardOutOfRange {
        /// Requested shard
        shard: usize,
        /// Pool count
        count: usize,
    },

    /// Engine failure
    #[error("engine error: {0}")]
    Engine(#[from] tierstore::Error),
}

impl Error {
    /// True when the stored bytes themselves are damaged.
    ///
    /// A missing field (`IncompleteRecord`) points at a schema mismatch and
    /// leaves the run usable; a truncated buffer does not.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::MalformedEncoding { .. })
    }

    /// True when the phase cannot go on: damaged rows, a write the
    /// engine refused to allocate, or any engine failure.
    pub fn is_fatal(&self) -> bool {
        self.is_corruption() || matches!(self, Error::AllocationFailed { .. } | Error::Engine(_))
    }

    pub(crate) fn invalid_config(key: &str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
