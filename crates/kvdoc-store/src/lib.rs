//! Document store interface for kvdoc.
//!
//! The mapping layer talks to its backend only through the
//! [`DocumentStore`] trait: a key/value store of JSON records grouped into
//! buckets, where each object additionally carries tagged links and
//! secondary index entries.
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every write replaces exactly one object; nothing is atomic across keys.
//! 2. The store never interprets record contents.
//! 3. Consistency knobs ([`ReadOptions`], [`WriteOptions`],
//!    [`DeleteOptions`]) are passed through from the caller unchanged.
//! 4. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod object;
pub mod options;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use object::{IndexQuery, IndexValue, Indexes, Record, StoredObject};
pub use options::{DeleteOptions, Quorum, ReadOptions, WriteOptions};
pub use traits::DocumentStore;
