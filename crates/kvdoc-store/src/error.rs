use kvdoc_types::Key;

/// Errors from document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A consistency parameter asks for more replicas than the store has.
    #[error("{param}={requested} cannot be satisfied with {replicas} replicas")]
    QuorumUnsatisfiable {
        param: &'static str,
        requested: u32,
        replicas: u32,
    },

    /// The object handed to the store is malformed.
    #[error("invalid object {bucket}/{key}: {reason}")]
    InvalidObject {
        bucket: String,
        key: Key,
        reason: String,
    },

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
