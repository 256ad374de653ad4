//! The load / save / delete protocol.
//!
//! Every operation here is an `impl Session` block: documents only hold
//! `(class, key)` references to each other, so resolving, saving and
//! cleaning up other documents always goes back through the session and its
//! identity cache.
//!
//! - [`load`]: fetch, register in the cache, populate.
//! - [`save`]: uniqueness, reference synchronization, write, cascade.
//! - [`delete`]: detach from referencing documents, delete, cascade.

mod cascade;
mod delete;
mod load;
mod relations;
mod save;
mod unique;
