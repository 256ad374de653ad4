use kvdoc_schema::SchemaError;
use kvdoc_store::StoreError;
use kvdoc_types::{Key, TypeError};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by sessions, models and documents.
#[derive(Debug, Error)]
pub enum OdmError {
    #[error("{class} {key} not found")]
    NotFound { class: String, key: Key },

    /// `reload` or `raw_data` on a document that was never stored.
    #[error("{class} {key} has not been saved")]
    NotSaved { class: String, key: Key },

    #[error("a live {class} instance already exists for key {key}")]
    DuplicateKey { class: String, key: Key },

    /// A unique field value is already owned by another document.
    #[error("{class}.{field}: {value:?} already exists")]
    Integrity {
        class: String,
        field: String,
        value: String,
    },

    /// A unique field value that cannot be used as an index record key.
    #[error("{class}.{field}: {value:?} cannot be indexed as a unique value")]
    UnindexableValue {
        class: String,
        field: String,
        value: String,
    },

    #[error("{class} has no field {field}")]
    UnknownField { class: String, field: String },

    #[error("{class}.{field} is not a {expected} field")]
    WrongFieldKind {
        class: String,
        field: String,
        expected: &'static str,
    },

    #[error("invalid value for {class}.{field}: {value}")]
    InvalidValue {
        class: String,
        field: String,
        value: Value,
    },

    #[error("{class}.{field} expects a {expected} document, got {actual}")]
    ReferenceMismatch {
        class: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("{class}.{field} is required")]
    MissingField { class: String, field: String },

    #[error("{class} does not store documents in bucket {bucket:?}")]
    UnknownBucket { class: String, bucket: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl OdmError {
    /// `true` if this is `NotFound` for exactly `key`.
    pub fn is_not_found_for(&self, key: &Key) -> bool {
        matches!(self, Self::NotFound { key: k, .. } if k == key)
    }
}

pub type OdmResult<T> = Result<T, OdmError>;
