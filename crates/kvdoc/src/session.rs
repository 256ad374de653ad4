use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use kvdoc_schema::{ClassSchema, PropertyKind, SchemaRegistry};
use kvdoc_store::{DocumentStore, IndexQuery};
use kvdoc_types::{Key, KeyStrategy};
use serde_json::Value;
use tracing::debug;

use crate::cache::IdentityCache;
use crate::config::OdmConfig;
use crate::document::{Cell, Document, DocumentState};
use crate::error::{OdmError, OdmResult};
use crate::options::LoadOptions;

struct SessionInner {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn DocumentStore>,
    config: OdmConfig,
    cache: RefCell<IdentityCache<RefCell<DocumentState>>>,
}

/// A unit of work over one store: the schema registry, the store client,
/// configuration, and the identity cache.
///
/// Sessions are single-threaded. Clones share the same cache.
///
/// The cache holds every live document strongly. Registering a document
/// sweeps unreferenced clean documents once the cache reaches
/// [`CacheConfig::sweep_threshold`](crate::CacheConfig) and again each time it
/// doubles. With the threshold at 0, long-running sessions should call
/// [`Session::sweep`] after dropping handles.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self::build(registry, store, OdmConfig::default())
    }

    pub fn with_config(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn DocumentStore>,
        config: OdmConfig,
    ) -> OdmResult<Self> {
        config.validate()?;
        Ok(Self::build(registry, store, config))
    }

    fn build(registry: Arc<SchemaRegistry>, store: Arc<dyn DocumentStore>, config: OdmConfig) -> Self {
        let cache = IdentityCache::with_sweep_threshold(config.cache.sweep_threshold);
        Self {
            inner: Rc::new(SessionInner {
                registry,
                store,
                config,
                cache: RefCell::new(cache),
            }),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    pub fn config(&self) -> &OdmConfig {
        &self.inner.config
    }

    /// Entry point for one document class.
    pub fn model(&self, class: &str) -> OdmResult<Model> {
        let schema = self.inner.registry.class(class)?.clone();
        Ok(Model {
            session: self.clone(),
            schema,
        })
    }

    /// Live instances across all classes.
    pub fn cached_count(&self) -> usize {
        self.inner.cache.borrow().total()
    }

    /// Drop cached documents no handle refers to. Returns how many were
    /// dropped.
    pub fn sweep(&self) -> usize {
        self.inner.cache.borrow_mut().sweep()
    }

    pub(crate) fn cached(&self, class: &str, key: &Key) -> Option<Document> {
        let cell = self.inner.cache.borrow().get(class, key)?;
        Some(Document::from_cell(cell, self.clone()))
    }

    pub(crate) fn is_cached(&self, class: &str, key: &Key) -> bool {
        self.inner.cache.borrow().contains(class, key)
    }

    /// Make `cell` the canonical instance for its key.
    pub(crate) fn register(&self, cell: &Cell) -> OdmResult<()> {
        let (class, key) = {
            let state = cell.borrow();
            (state.schema.name().to_string(), state.key.clone())
        };
        let mut cache = self.inner.cache.borrow_mut();
        cache.put(&class, key, cell.clone())?;
        // a borrowed cell is in use somewhere
        cache.sweep_if_due(|cell| cell.try_borrow().map_or(true, |state| state.dirty));
        Ok(())
    }

    /// Evict `cell` if it is the canonical instance for its key.
    pub(crate) fn evict_instance(&self, cell: &Cell) -> bool {
        let (class, key) = {
            let state = cell.borrow();
            (state.schema.name().to_string(), state.key.clone())
        };
        self.inner
            .cache
            .borrow_mut()
            .remove_instance(&class, &key, cell)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("classes", &self.inner.registry.len())
            .field("cached", &self.cached_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Operations on one document class.
#[derive(Clone)]
pub struct Model {
    session: Session,
    schema: Arc<ClassSchema>,
}

impl Model {
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &ClassSchema {
        &self.schema
    }

    /// Construct a new, unsaved document and make it the live instance for
    /// its key.
    pub fn create(&self, fields: Fields) -> OdmResult<Document> {
        let key = fields.resolve_key(self.session.config().keys.strategy)?;
        if self.session.is_cached(self.name(), &key) {
            return Err(OdmError::DuplicateKey {
                class: self.name().to_string(),
                key,
            });
        }

        let cell = Rc::new(RefCell::new(DocumentState::new(self.schema.clone(), key.clone())));
        let doc = Document::from_cell(cell, self.session.clone());
        fields.apply(&doc)?;

        if fields.saved {
            let read = self.session.config().read;
            let object = self
                .session
                .store()
                .fetch(self.schema.default_bucket(), &key, &read)?
                .ok_or_else(|| OdmError::NotFound {
                    class: self.name().to_string(),
                    key: key.clone(),
                })?;
            let mut state = doc.state_mut();
            state.stored = Some(object);
            state.saved = true;
        }

        self.session.register(&doc.cell)?;
        debug!(class = self.name(), key = %key, "created document");
        Ok(doc)
    }

    /// Load a document. With `cached`, a live instance is returned as is;
    /// otherwise it is reloaded first.
    pub fn load(&self, key: &Key, cached: bool) -> OdmResult<Document> {
        self.load_with(key, LoadOptions::new().cached(cached))
    }

    pub fn load_with(&self, key: &Key, options: LoadOptions) -> OdmResult<Document> {
        self.session.load_document(&self.schema, key, &options)
    }

    /// The live instance for `key`, loading it if needed.
    pub fn get(&self, key: &Key) -> OdmResult<Document> {
        self.load(key, true)
    }

    /// Load `key` and merge `fields` into it, or construct it from `fields`
    /// if it does not exist.
    pub fn get_or_new(&self, key: &Key, fields: Fields) -> OdmResult<Document> {
        match self.get(key) {
            Ok(doc) => {
                doc.merge(fields)?;
                Ok(doc)
            }
            Err(err) if err.is_not_found_for(key) => self.create(fields.key(key.clone())),
            Err(err) => Err(err),
        }
    }

    /// Whether `key` exists in the default bucket.
    pub fn exists(&self, key: &Key) -> OdmResult<bool> {
        self.exists_in(key, self.schema.default_bucket())
    }

    pub fn exists_in(&self, key: &Key, bucket: &str) -> OdmResult<bool> {
        if !self.schema.has_bucket(bucket) {
            return Err(OdmError::UnknownBucket {
                class: self.name().to_string(),
                bucket: bucket.to_string(),
            });
        }
        let read = self.session.config().read;
        Ok(self.session.store().exists(bucket, key, &read)?)
    }

    /// The live instance for `key`, without touching the store.
    pub fn cached(&self, key: &Key) -> Option<Document> {
        self.session.cached(self.name(), key)
    }

    pub fn evict(&self, key: &Key) -> bool {
        self.session
            .inner
            .cache
            .borrow_mut()
            .remove(self.name(), key)
            .is_some()
    }

    /// Keys in the default bucket whose secondary index matches `query`.
    pub fn index_lookup(&self, index: &str, query: &IndexQuery) -> OdmResult<Vec<Key>> {
        Ok(self
            .session
            .store()
            .index_lookup(self.schema.default_bucket(), index, query)?)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("class", &self.name()).finish()
    }
}

/// Derives a key from the scalar values a document is created with.
pub type KeyGenerator = fn(&BTreeMap<String, Value>) -> String;

#[derive(Clone, Debug, Default)]
enum KeySource {
    #[default]
    Generated,
    Given(Key),
    Derived(KeyGenerator),
}

#[derive(Clone, Debug)]
enum FieldInput {
    Value(Value),
    Reference(Document),
}

/// Field assignments for constructing or updating a document.
#[derive(Clone, Debug, Default)]
pub struct Fields {
    key: KeySource,
    values: Vec<(String, FieldInput)>,
    saved: bool,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: Key) -> Self {
        self.key = KeySource::Given(key);
        self
    }

    /// Derive the key from the assigned scalar values.
    pub fn key_with(mut self, generator: KeyGenerator) -> Self {
        self.key = KeySource::Derived(generator);
        self
    }

    pub fn value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values
            .push((field.into(), FieldInput::Value(value.into())));
        self
    }

    /// Point a reference field at `target`. On a multi-reference field the
    /// target is appended.
    pub fn reference(mut self, field: impl Into<String>, target: &Document) -> Self {
        self.values
            .push((field.into(), FieldInput::Reference(target.clone())));
        self
    }

    /// The document already exists in the store: attach its stored version
    /// without reading its data.
    pub fn saved(mut self) -> Self {
        self.saved = true;
        self
    }

    pub(crate) fn resolve_key(&self, strategy: KeyStrategy) -> OdmResult<Key> {
        match &self.key {
            KeySource::Generated => Ok(strategy.generate()),
            KeySource::Given(key) => Ok(key.clone()),
            KeySource::Derived(generator) => {
                let scalars: BTreeMap<String, Value> = self
                    .values
                    .iter()
                    .filter_map(|(field, input)| match input {
                        FieldInput::Value(value) => Some((field.clone(), value.clone())),
                        FieldInput::Reference(_) => None,
                    })
                    .collect();
                Ok(Key::new(generator(&scalars))?)
            }
        }
    }

    pub(crate) fn apply(&self, doc: &Document) -> OdmResult<()> {
        let schema = doc.schema();
        for (field, input) in &self.values {
            match input {
                FieldInput::Value(value) => doc.set(field, value.clone())?,
                FieldInput::Reference(target) => match schema.field(field).map(|p| p.kind()) {
                    Some(PropertyKind::MultiReference(_)) => {
                        doc.push_reference(field, target)?;
                    }
                    _ => doc.set_reference(field, Some(target))?,
                },
            }
        }
        Ok(())
    }
}
