//! Error types for schema registration.
//!
//! Every variant describes a mistake in the model definitions themselves.
//! None of them is recoverable at runtime: registry construction aborts.

use kvdoc_types::TypeError;
use thiserror::Error;

/// Errors raised while declaring or linking document classes.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Two forward references populate the same inverse collection, or the
    /// collection name is already a field of the referenced class.
    #[error(
        "collection {collection:?} already exists on {class} \
         (requested by {source_class}.{source_field})"
    )]
    CollectionConflict {
        class: String,
        collection: String,
        source_class: String,
        source_field: String,
    },

    /// A unique property also carries relationship metadata.
    #[error("{class}.{field}: unique properties cannot be references")]
    UniqueReference { class: String, field: String },

    /// A reference points at something that is not a concrete document class.
    #[error("{class}.{field}: invalid reference target {target:?}: {reason}")]
    InvalidReference {
        class: String,
        field: String,
        target: String,
        reason: String,
    },

    /// A bucket name is claimed by two classes.
    #[error("bucket {bucket:?} of {class} is already registered to {existing}")]
    DuplicateBucket {
        bucket: String,
        existing: String,
        class: String,
    },

    #[error("class already declared: {0}")]
    DuplicateClass(String),

    #[error("{class}.{field} declared twice")]
    DuplicateField { class: String, field: String },

    #[error("{class} extends unknown class {parent}")]
    UnknownParent { class: String, parent: String },

    #[error("inheritance cycle through {0}")]
    InheritanceCycle(String),

    #[error("unknown document class: {0}")]
    UnknownClass(String),

    #[error(transparent)]
    InvalidName(#[from] TypeError),
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;
