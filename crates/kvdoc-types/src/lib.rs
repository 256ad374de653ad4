//! Foundation types for kvdoc.
//!
//! Every other kvdoc crate depends on `kvdoc-types`.
//!
//! # Key Types
//!
//! - [`Key`]: Stable document key within a bucket
//! - [`KeyStrategy`]: How keys are generated for new documents
//! - [`Link`]: Stored form of a tagged link between objects
//! - [`names`]: Class, field and bucket name rules

pub mod error;
pub mod key;
pub mod link;
pub mod names;

pub use error::TypeError;
pub use key::{Key, KeyStrategy};
pub use link::Link;
pub use names::unique_bucket_name;
