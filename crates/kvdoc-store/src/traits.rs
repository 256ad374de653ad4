use kvdoc_types::Key;

use crate::error::StoreResult;
use crate::object::{IndexQuery, StoredObject};
use crate::options::{DeleteOptions, ReadOptions, WriteOptions};

/// Key/value-with-links document store.
///
/// This is the only surface the mapping layer needs from a backend.
/// Implementations must satisfy these invariants:
/// - `put` replaces the whole object (data, links and indexes) atomically
///   for that one key. Nothing spans more than one key.
/// - `put` returns the object as written, with a fresh `vtag` and
///   `last_modified`.
/// - Consistency options are honoured or rejected, never ignored silently.
/// - All backend errors are propagated.
pub trait DocumentStore: Send + Sync {
    /// Read one object. Returns `Ok(None)` if it does not exist.
    fn fetch(
        &self,
        bucket: &str,
        key: &Key,
        options: &ReadOptions,
    ) -> StoreResult<Option<StoredObject>>;

    /// Create or replace one object.
    fn put(&self, object: &StoredObject, options: &WriteOptions) -> StoreResult<StoredObject>;

    /// Delete one object. Returns `true` if it existed.
    fn delete(&self, bucket: &str, key: &Key, options: &DeleteOptions) -> StoreResult<bool>;

    /// Keys in `bucket` whose secondary index `index` matches `query`,
    /// sorted.
    fn index_lookup(&self, bucket: &str, index: &str, query: &IndexQuery) -> StoreResult<Vec<Key>>;

    /// All keys in `bucket`, sorted.
    fn keys(&self, bucket: &str) -> StoreResult<Vec<Key>>;

    /// Check whether an object exists.
    ///
    /// Default implementation calls `fetch()`. Backends may override with a
    /// cheaper head request.
    fn exists(&self, bucket: &str, key: &Key, options: &ReadOptions) -> StoreResult<bool> {
        Ok(self.fetch(bucket, key, options)?.is_some())
    }
}
