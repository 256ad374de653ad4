use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use kvdoc_schema::{ClassSchema, Property, PropertyKind};
use kvdoc_store::{ReadOptions, Record, StoredObject};
use kvdoc_types::Key;
use tracing::debug;

use crate::document::{Document, DocumentState};
use crate::error::{OdmError, OdmResult};
use crate::options::LoadOptions;
use crate::session::Session;
use crate::value::{stored_keys, DocRef, FieldValue};

fn not_found(class: &str, key: &Key) -> OdmError {
    OdmError::NotFound {
        class: class.to_string(),
        key: key.clone(),
    }
}

impl Session {
    pub(crate) fn load_document(
        &self,
        schema: &Arc<ClassSchema>,
        key: &Key,
        options: &LoadOptions,
    ) -> OdmResult<Document> {
        let read = options.read.or(self.config().read);

        if let Some(doc) = self.cached(schema.name(), key) {
            if options.cached {
                return Ok(doc);
            }
            doc.reload_with(read)?;
            if doc.is_deleted() {
                return Err(not_found(schema.name(), key));
            }
            return Ok(doc);
        }

        let bucket = match options.bucket.as_deref() {
            Some(bucket) if !schema.has_bucket(bucket) => {
                return Err(OdmError::UnknownBucket {
                    class: schema.name().to_string(),
                    bucket: bucket.to_string(),
                });
            }
            Some(bucket) => bucket,
            None => schema.default_bucket(),
        };
        let object = self
            .store()
            .fetch(bucket, key, &read)?
            .ok_or_else(|| not_found(schema.name(), key))?;
        self.adopt(schema, object)
    }

    /// Build the live instance for a fetched object.
    ///
    /// The blank instance is cached before it is populated so that loads
    /// triggered by its own references find it.
    fn adopt(&self, schema: &Arc<ClassSchema>, object: StoredObject) -> OdmResult<Document> {
        let cell = Rc::new(RefCell::new(DocumentState::new(
            schema.clone(),
            object.key.clone(),
        )));
        self.register(&cell)?;
        let doc = Document::from_cell(cell, self.clone());
        if let Err(err) = self.populate(&doc, object) {
            self.evict_instance(&doc.cell);
            return Err(err);
        }
        debug!(class = schema.name(), key = %doc.key(), "loaded document");
        Ok(doc)
    }

    /// Replace a document's in-memory state with a stored version.
    pub(crate) fn populate(&self, doc: &Document, object: StoredObject) -> OdmResult<()> {
        let schema = doc.schema();

        let mut data = BTreeMap::new();
        for (name, property) in schema.fields() {
            let raw = object.data.get(name);
            let value = match property.kind() {
                PropertyKind::Reference(_) => match stored_keys(raw).into_iter().next() {
                    Some(key) => FieldValue::Reference(Some(self.decode_ref(property, key)?)),
                    None => FieldValue::Reference(None),
                },
                PropertyKind::MultiReference(_) => FieldValue::References(
                    stored_keys(raw)
                        .into_iter()
                        .map(|key| self.decode_ref(property, key))
                        .collect::<OdmResult<Vec<_>>>()?,
                ),
                _ => FieldValue::Value(match raw {
                    Some(value) => property.standardize(value.clone()),
                    None => property.default_value(),
                }),
            };
            data.insert(name.to_string(), value);
        }

        let extra: Record = object
            .data
            .iter()
            .filter(|(name, _)| schema.field(name).is_none())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut links = BTreeSet::new();
        let mut other_links = Vec::new();
        for link in &object.links {
            match self.registry().class_for_bucket(&link.bucket) {
                Some(target) => {
                    links.insert((DocRef::new(target.name(), link.key.clone()), link.tag.clone()));
                }
                None => other_links.push(link.clone()),
            }
        }

        let mut state = doc.state_mut();
        state.data = data;
        state.extra = extra;
        state.links = links;
        state.other_links = other_links;
        state.indexes = object.indexes.clone();
        state.stored = Some(object);
        state.saved = true;
        state.deleted = false;
        state.dirty = false;
        Ok(())
    }

    /// Strict references are resolved now, so a missing target fails the
    /// load. Non-strict ones are kept as keys.
    fn decode_ref(&self, property: &Property, key: Key) -> OdmResult<DocRef> {
        let target = DocRef::new(property.reference_class().unwrap_or_default(), key);
        if property.is_strict() {
            return Ok(self.resolve(&target)?.doc_ref());
        }
        Ok(self
            .cached_in_lineage(&target)
            .map_or(target, |doc| doc.doc_ref()))
    }

    pub(crate) fn cached_in_lineage(&self, target: &DocRef) -> Option<Document> {
        self.registry()
            .lineage(&target.class)
            .into_iter()
            .find_map(|schema| self.cached(schema.name(), &target.key))
    }

    /// The live instance a reference points at, loading it if needed.
    ///
    /// The target may belong to any class in the lineage of `target.class`
    /// and to any of that class's buckets.
    pub(crate) fn resolve(&self, target: &DocRef) -> OdmResult<Document> {
        self.registry().class(&target.class)?;
        if let Some(doc) = self.cached_in_lineage(target) {
            return Ok(doc);
        }
        let read = self.config().read;
        for schema in self.registry().lineage(&target.class) {
            for bucket in schema.buckets() {
                if let Some(object) = self.store().fetch(bucket, &target.key, &read)? {
                    return self.adopt(schema, object);
                }
            }
        }
        Err(not_found(&target.class, &target.key))
    }

    /// Like [`resolve`](Self::resolve), but a missing target of a non-strict
    /// reference is `None`.
    pub(crate) fn resolve_ref(&self, target: &DocRef, strict: bool) -> OdmResult<Option<Document>> {
        match self.resolve(target) {
            Ok(doc) => Ok(Some(doc)),
            Err(err) if !strict && err.is_not_found_for(&target.key) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Whether the referenced document exists in the store.
    pub(crate) fn ref_exists(&self, target: &DocRef) -> OdmResult<bool> {
        let read = self.config().read;
        for schema in self.registry().lineage(&target.class) {
            for bucket in schema.buckets() {
                if self.store().exists(bucket, &target.key, &read)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub(crate) fn reload_document(&self, doc: &Document, read: ReadOptions) -> OdmResult<()> {
        let read = read.or(self.config().read);
        let (class, key, bucket) = {
            let state = doc.state();
            let Some(stored) = &state.stored else {
                return Err(OdmError::NotSaved {
                    class: state.schema.name().to_string(),
                    key: state.key.clone(),
                });
            };
            (
                state.schema.name().to_string(),
                state.key.clone(),
                stored.bucket.clone(),
            )
        };

        match self.store().fetch(&bucket, &key, &read)? {
            Some(object) => self.populate(doc, object),
            None => {
                doc.state_mut().mark_deleted();
                self.evict_instance(&doc.cell);
                debug!(class = %class, key = %key, "record gone on reload, document deleted");
                Ok(())
            }
        }
    }
}
