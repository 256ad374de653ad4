use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use kvdoc_types::Key;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{IndexQuery, StoredObject};
use crate::options::{DeleteOptions, Quorum, ReadOptions, WriteOptions};
use crate::traits::DocumentStore;

/// Default replica count, matching the usual `n_val` of a replicated store.
pub const DEFAULT_REPLICAS: u32 = 3;

type Buckets = HashMap<String, BTreeMap<Key, StoredObject>>;

/// In-memory, HashMap-based document store.
///
/// Intended for tests and embedding. Buckets are held behind a `RwLock`;
/// objects are cloned on read and write. Quorum options are validated
/// against the configured replica count. Every `put` is counted per object so
/// tests can assert how often a document was written.
pub struct InMemoryStore {
    buckets: RwLock<Buckets>,
    writes: RwLock<HashMap<(String, Key), usize>>,
    version: AtomicU64,
    replicas: u32,
}

impl InMemoryStore {
    /// Create a new empty store with [`DEFAULT_REPLICAS`] replicas.
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    /// Create a new empty store that claims `replicas` copies of every object.
    pub fn with_replicas(replicas: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            writes: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            replicas,
        }
    }

    fn read_buckets(&self) -> StoreResult<RwLockReadGuard<'_, Buckets>> {
        self.buckets
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_buckets(&self) -> StoreResult<RwLockWriteGuard<'_, Buckets>> {
        self.buckets
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn check_quorum(&self, param: &'static str, quorum: Option<Quorum>) -> StoreResult<()> {
        let Some(quorum) = quorum else {
            return Ok(());
        };
        let requested = quorum.resolve(self.replicas);
        if requested == 0 || requested > self.replicas {
            return Err(StoreError::QuorumUnsatisfiable {
                param,
                requested,
                replicas: self.replicas,
            });
        }
        Ok(())
    }

    /// Total number of objects across all buckets.
    pub fn len(&self) -> usize {
        self.read_buckets()
            .map(|b| b.values().map(BTreeMap::len).sum::<usize>())
            .unwrap_or(0)
    }

    /// Returns `true` if no bucket holds any object.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of objects in one bucket.
    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.read_buckets()
            .map(|b| b.get(bucket).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// How many times `bucket/key` has been written.
    pub fn write_count(&self, bucket: &str, key: &Key) -> usize {
        self.writes
            .read()
            .map(|w| w.get(&(bucket.to_string(), key.clone())).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Forget all write counts, keeping the data.
    pub fn reset_write_counts(&self) {
        if let Ok(mut writes) = self.writes.write() {
            writes.clear();
        }
    }

    /// Remove all objects and counters.
    pub fn clear(&self) {
        if let Ok(mut buckets) = self.buckets.write() {
            buckets.clear();
        }
        self.reset_write_counts();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    fn fetch(
        &self,
        bucket: &str,
        key: &Key,
        options: &ReadOptions,
    ) -> StoreResult<Option<StoredObject>> {
        self.check_quorum("r", options.r)?;
        let buckets = self.read_buckets()?;
        Ok(buckets.get(bucket).and_then(|b| b.get(key)).cloned())
    }

    fn put(&self, object: &StoredObject, options: &WriteOptions) -> StoreResult<StoredObject> {
        self.check_quorum("w", options.w)?;
        self.check_quorum("dw", options.dw)?;
        if object.bucket.is_empty() {
            return Err(StoreError::InvalidObject {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                reason: "empty bucket name".into(),
            });
        }

        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let mut written = object.clone();
        written.vtag = Some(format!("{version:016x}"));
        written.last_modified = Some(Utc::now());

        self.write_buckets()?
            .entry(object.bucket.clone())
            .or_default()
            .insert(object.key.clone(), written.clone());

        let mut writes = self
            .writes
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        *writes
            .entry((object.bucket.clone(), object.key.clone()))
            .or_insert(0) += 1;

        debug!(bucket = %object.bucket, key = %object.key, version, "object stored");
        Ok(written)
    }

    fn delete(&self, bucket: &str, key: &Key, options: &DeleteOptions) -> StoreResult<bool> {
        self.check_quorum("rw", options.rw)?;
        let mut buckets = self.write_buckets()?;
        let existed = buckets
            .get_mut(bucket)
            .is_some_and(|b| b.remove(key).is_some());
        debug!(bucket, key = %key, existed, "object deleted");
        Ok(existed)
    }

    fn index_lookup(&self, bucket: &str, index: &str, query: &IndexQuery) -> StoreResult<Vec<Key>> {
        let buckets = self.read_buckets()?;
        let Some(objects) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .values()
            .filter(|obj| {
                obj.indexes
                    .get(index)
                    .is_some_and(|values| values.iter().any(|v| query.matches(v)))
            })
            .map(|obj| obj.key.clone())
            .collect())
    }

    fn keys(&self, bucket: &str) -> StoreResult<Vec<Key>> {
        let buckets = self.read_buckets()?;
        Ok(buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("object_count", &self.len())
            .field("replicas", &self.replicas)
            .finish()
    }
}
