//! Object-document mapping over a key/value-with-links store.
//!
//! Typed documents declared in a [`SchemaRegistry`] are projected onto
//! JSON records in a [`DocumentStore`]. On top of plain persistence the
//! mapping layer keeps store-side copies of relationships consistent:
//!
//! - every forward reference declared with a collection name is mirrored by
//!   an inverse collection on the referenced document;
//! - unique fields are enforced with one index record per value;
//! - saves and deletes cascade to the documents whose collections they
//!   changed, each at most once per call.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kvdoc::{Fields, Session};
//! use kvdoc_schema::{ClassDefinition, Property, RegistryBuilder};
//! use kvdoc_store::InMemoryStore;
//!
//! let registry = RegistryBuilder::new()
//!     .declare(ClassDefinition::new("Page").bucket("pages").property("name", Property::string()))?
//!     .declare(
//!         ClassDefinition::new("User")
//!             .bucket("users")
//!             .property("page", Property::reference("Page").collection_name("users")),
//!     )?
//!     .build()?;
//! let session = Session::new(Arc::new(registry), Arc::new(InMemoryStore::new()));
//!
//! let page = session.model("Page")?.create(Fields::new().value("name", "P"))?;
//! let user = session.model("User")?.create(Fields::new().reference("page", &page))?;
//! user.save()?;
//!
//! assert_eq!(page.reference_keys("users")?, vec![user.key()]);
//! # Ok::<(), kvdoc::OdmError>(())
//! ```
//!
//! # Threading
//!
//! A [`Session`] and its documents are single-threaded (`!Send`). The store
//! behind it is `Send + Sync` and may be shared between sessions.

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
mod lifecycle;
pub mod options;
pub mod session;
pub mod value;

#[cfg(test)]
mod tests;

pub use cache::IdentityCache;
pub use config::{CacheConfig, CascadeConfig, KeysConfig, OdmConfig};
pub use document::Document;
pub use error::{OdmError, OdmResult};
pub use options::{LoadOptions, SaveOptions};
pub use session::{Fields, KeyGenerator, Model, Session};
pub use value::{DocRef, FieldValue};

pub use kvdoc_schema::{SchemaError, SchemaRegistry};
pub use kvdoc_store::DocumentStore;
