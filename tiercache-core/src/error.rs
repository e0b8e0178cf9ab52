//! Error types for TierCache
//!
//! A cache miss is not an error: reads return `Ok(None)`. Everything that
//! reaches a caller as `Err` is one of the variants below.

/// Errors produced by the coordinator and its tiers
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid cache name: {0}")]
    InvalidName(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Value is not serializable: {0}")]
    Encoding(#[source] CodecError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Errors from the byte-level encoding of values and records
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Malformed row: {0}")]
    Malformed(String),
}

/// Errors from the persistent tier
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store worker is no longer running")]
    WorkerGone,

    #[error("Store operation submitted from its own worker thread")]
    Reentrant,
}

pub type CacheResult<T> = Result<T, CacheError>;
pub type StoreResult<T> = Result<T, StoreError>;
