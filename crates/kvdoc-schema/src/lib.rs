//! Document class schemas for kvdoc.
//!
//! Applications describe classes with [`ClassDefinition`] and [`Property`],
//! declare them on a [`RegistryBuilder`], and build a [`SchemaRegistry`].
//! Building is the only place relationship topology is discovered: inverse
//! collections are synthesized on referenced classes, unique fields are bound
//! to their index buckets, and bucket ownership is checked.
//!
//! # Example
//!
//! ```
//! use kvdoc_schema::{ClassDefinition, Property, RegistryBuilder};
//!
//! let registry = RegistryBuilder::new()
//!     .declare(ClassDefinition::new("Page").bucket("pages").property("name", Property::string()))?
//!     .declare(
//!         ClassDefinition::new("User")
//!             .bucket("users")
//!             .property("page", Property::reference("Page").collection_name("users")),
//!     )?
//!     .build()?;
//!
//! assert!(registry.class("Page")?.field("users").is_some());
//! # Ok::<(), kvdoc_schema::SchemaError>(())
//! ```

pub mod class;
pub mod error;
pub mod property;
pub mod registry;
pub mod schema;

pub use class::ClassDefinition;
pub use error::{SchemaError, SchemaResult};
pub use property::{Property, PropertyKind, Relation, Target, Validator};
pub use registry::{RegistryBuilder, SchemaRegistry};
pub use schema::{ClassSchema, UniqueField};
