use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use kvdoc_schema::{ClassSchema, Property, PropertyKind, SchemaRegistry};
use kvdoc_store::{DeleteOptions, IndexValue, Indexes, ReadOptions, Record, StoredObject};
use kvdoc_types::{Key, Link};
use serde_json::Value;

use crate::error::{OdmError, OdmResult};
use crate::options::SaveOptions;
use crate::session::{Fields, Session};
use crate::value::{DocRef, FieldValue};

pub(crate) type Cell = Rc<RefCell<DocumentState>>;

/// Everything one live document holds in memory.
pub(crate) struct DocumentState {
    pub(crate) schema: Arc<ClassSchema>,
    pub(crate) key: Key,
    pub(crate) data: BTreeMap<String, FieldValue>,
    /// Stored fields the schema does not declare, kept verbatim.
    pub(crate) extra: Record,
    /// Last version read from or written to the store.
    pub(crate) stored: Option<StoredObject>,
    pub(crate) links: BTreeSet<(DocRef, String)>,
    /// Links into buckets no class owns.
    pub(crate) other_links: Vec<Link>,
    pub(crate) indexes: Indexes,
    pub(crate) saved: bool,
    pub(crate) deleted: bool,
    pub(crate) dirty: bool,
}

fn initial_value(property: &Property) -> FieldValue {
    match property.kind() {
        PropertyKind::Reference(_) => FieldValue::Reference(None),
        PropertyKind::MultiReference(_) => FieldValue::References(Vec::new()),
        _ => FieldValue::Value(property.default_value()),
    }
}

fn empty_value(property: &Property) -> FieldValue {
    match property.kind() {
        PropertyKind::Reference(_) => FieldValue::Reference(None),
        PropertyKind::MultiReference(_) => FieldValue::References(Vec::new()),
        _ => FieldValue::Value(Value::Null),
    }
}

fn initial_data(schema: &ClassSchema) -> BTreeMap<String, FieldValue> {
    schema
        .fields()
        .map(|(name, property)| (name.to_string(), initial_value(property)))
        .collect()
}

pub(crate) fn unknown_field(schema: &ClassSchema, field: &str) -> OdmError {
    OdmError::UnknownField {
        class: schema.name().to_string(),
        field: field.to_string(),
    }
}

fn wrong_kind(schema: &ClassSchema, field: &str, expected: &'static str) -> OdmError {
    OdmError::WrongFieldKind {
        class: schema.name().to_string(),
        field: field.to_string(),
        expected,
    }
}

impl DocumentState {
    pub(crate) fn new(schema: Arc<ClassSchema>, key: Key) -> Self {
        let data = initial_data(&schema);
        Self {
            schema,
            key,
            data,
            extra: Record::new(),
            stored: None,
            links: BTreeSet::new(),
            other_links: Vec::new(),
            indexes: Indexes::new(),
            saved: false,
            deleted: false,
            dirty: false,
        }
    }

    pub(crate) fn doc_ref(&self) -> DocRef {
        DocRef::new(self.schema.name(), self.key.clone())
    }

    /// The record to persist: declared fields in stored form over `extra`.
    pub(crate) fn serialize(&self) -> Record {
        let mut record = self.extra.clone();
        for (name, value) in &self.data {
            record.insert(name.clone(), value.to_json());
        }
        record
    }

    pub(crate) fn missing_required(&self) -> Option<String> {
        self.schema
            .fields()
            .find(|(name, property)| {
                property.is_required() && self.data.get(*name).map_or(true, FieldValue::is_null)
            })
            .map(|(name, _)| name.to_string())
    }

    pub(crate) fn refs(&self, field: &str) -> Vec<DocRef> {
        self.data.get(field).map(FieldValue::refs).unwrap_or_default()
    }

    /// Add `target` to a reference field unless a document with its key is
    /// already there. Returns `true` if the field changed.
    pub(crate) fn add_ref(&mut self, field: &str, target: DocRef) -> OdmResult<bool> {
        let changed = match self.data.get_mut(field) {
            Some(FieldValue::References(refs)) => {
                if refs.iter().any(|r| r.key == target.key) {
                    false
                } else {
                    refs.push(target);
                    true
                }
            }
            Some(FieldValue::Reference(slot)) => {
                if slot.as_ref().is_some_and(|r| r.key == target.key) {
                    false
                } else {
                    *slot = Some(target);
                    true
                }
            }
            Some(FieldValue::Value(_)) => return Err(wrong_kind(&self.schema, field, "reference")),
            None => return Err(unknown_field(&self.schema, field)),
        };
        self.dirty |= changed;
        Ok(changed)
    }

    /// Remove every reference to `key` from a reference field. Returns `true`
    /// if the field changed.
    pub(crate) fn remove_ref(&mut self, field: &str, key: &Key) -> OdmResult<bool> {
        let changed = match self.data.get_mut(field) {
            Some(FieldValue::References(refs)) => {
                let before = refs.len();
                refs.retain(|r| &r.key != key);
                refs.len() != before
            }
            Some(FieldValue::Reference(slot)) => {
                if slot.as_ref().is_some_and(|r| &r.key == key) {
                    *slot = None;
                    true
                } else {
                    false
                }
            }
            Some(FieldValue::Value(_)) => return Err(wrong_kind(&self.schema, field, "reference")),
            None => return Err(unknown_field(&self.schema, field)),
        };
        self.dirty |= changed;
        Ok(changed)
    }

    pub(crate) fn external_links(&self, registry: &SchemaRegistry) -> Vec<Link> {
        self.links
            .iter()
            .filter_map(|(target, tag)| {
                let schema = registry.get(&target.class)?;
                Some(Link::new(schema.default_bucket(), target.key.clone(), tag.clone()))
            })
            .chain(self.other_links.iter().cloned())
            .collect()
    }

    /// Forget the stored version and every field value.
    pub(crate) fn mark_deleted(&mut self) {
        self.data = initial_data(&self.schema);
        self.extra.clear();
        self.links.clear();
        self.other_links.clear();
        self.indexes.clear();
        self.stored = None;
        self.saved = false;
        self.deleted = true;
        self.dirty = false;
    }
}

/// Which reference shapes an accessor works on.
#[derive(Clone, Copy)]
enum RefShape {
    Single,
    Multi,
    Any,
}

/// Handle to a live document.
///
/// Handles are cheap to clone; every handle for the same key within a
/// session points at the same canonical instance held by the identity cache.
/// Equality compares class and key.
#[derive(Clone)]
pub struct Document {
    pub(crate) cell: Cell,
    pub(crate) session: Session,
}

impl Document {
    pub(crate) fn from_cell(cell: Cell, session: Session) -> Self {
        Self { cell, session }
    }

    pub(crate) fn state(&self) -> Ref<'_, DocumentState> {
        self.cell.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, DocumentState> {
        self.cell.borrow_mut()
    }

    pub fn key(&self) -> Key {
        self.state().key.clone()
    }

    pub fn class_name(&self) -> String {
        self.state().schema.name().to_string()
    }

    pub fn schema(&self) -> Arc<ClassSchema> {
        self.state().schema.clone()
    }

    pub fn doc_ref(&self) -> DocRef {
        self.state().doc_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `true` once the document has been written or loaded, until deleted.
    pub fn is_saved(&self) -> bool {
        self.state().saved
    }

    pub fn is_deleted(&self) -> bool {
        self.state().deleted
    }

    /// `true` if in-memory state differs from the last written record.
    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    /// Whether both handles point at the same in-memory instance.
    pub fn same_instance(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    // ---- Fields ----

    /// Value of a field in stored form (references as keys). Undeclared
    /// fields read from the stored record are returned as is.
    pub fn get(&self, field: &str) -> OdmResult<Value> {
        let state = self.state();
        if let Some(value) = state.data.get(field) {
            return Ok(value.to_json());
        }
        state
            .extra
            .get(field)
            .cloned()
            .ok_or_else(|| unknown_field(&state.schema, field))
    }

    /// Assign a scalar field. The value is validated and standardized.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> OdmResult<()> {
        let schema = self.schema();
        let property = schema
            .field(field)
            .ok_or_else(|| unknown_field(&schema, field))?;
        if property.is_reference() {
            return Err(wrong_kind(&schema, field, "scalar"));
        }
        let value = value.into();
        if !property.validate(&value) {
            return Err(OdmError::InvalidValue {
                class: schema.name().to_string(),
                field: field.to_string(),
                value,
            });
        }
        let value = property.standardize(value);
        let mut state = self.state_mut();
        state.data.insert(field.to_string(), FieldValue::Value(value));
        state.dirty = true;
        Ok(())
    }

    /// Clear a field: null, no reference, or an empty list.
    pub fn unset(&self, field: &str) -> OdmResult<()> {
        let schema = self.schema();
        let property = schema
            .field(field)
            .ok_or_else(|| unknown_field(&schema, field))?;
        let mut state = self.state_mut();
        state.data.insert(field.to_string(), empty_value(property));
        state.dirty = true;
        Ok(())
    }

    fn reference_property<'s>(
        schema: &'s ClassSchema,
        field: &str,
        shape: RefShape,
    ) -> OdmResult<&'s Property> {
        let property = schema
            .field(field)
            .ok_or_else(|| unknown_field(schema, field))?;
        match (shape, property.kind()) {
            (RefShape::Single | RefShape::Any, PropertyKind::Reference(_)) => Ok(property),
            (RefShape::Multi | RefShape::Any, PropertyKind::MultiReference(_)) => Ok(property),
            (RefShape::Single, _) => Err(wrong_kind(schema, field, "reference")),
            (RefShape::Multi, _) => Err(wrong_kind(schema, field, "multi-reference")),
            (RefShape::Any, _) => Err(wrong_kind(schema, field, "reference")),
        }
    }

    fn check_target(&self, schema: &ClassSchema, field: &str, property: &Property, target: &DocRef) -> OdmResult<()> {
        let expected = property.reference_class().unwrap_or_default();
        if self
            .session
            .registry()
            .is_descendant_or_self(&target.class, expected)
        {
            Ok(())
        } else {
            Err(OdmError::ReferenceMismatch {
                class: schema.name().to_string(),
                field: field.to_string(),
                expected: expected.to_string(),
                actual: target.class.clone(),
            })
        }
    }

    /// The document a single reference field points at.
    ///
    /// A non-strict reference whose target no longer exists yields `None`.
    pub fn reference(&self, field: &str) -> OdmResult<Option<Document>> {
        let schema = self.schema();
        let property = Self::reference_property(&schema, field, RefShape::Single)?;
        let Some(target) = self.state().refs(field).into_iter().next() else {
            return Ok(None);
        };
        self.session.resolve_ref(&target, property.is_strict())
    }

    pub fn reference_key(&self, field: &str) -> OdmResult<Option<Key>> {
        let schema = self.schema();
        Self::reference_property(&schema, field, RefShape::Single)?;
        Ok(self.state().refs(field).into_iter().next().map(|r| r.key))
    }

    pub fn set_reference(&self, field: &str, target: Option<&Document>) -> OdmResult<()> {
        let schema = self.schema();
        let property = Self::reference_property(&schema, field, RefShape::Single)?;
        let target = match target {
            Some(doc) => {
                let target = doc.doc_ref();
                self.check_target(&schema, field, property, &target)?;
                Some(target)
            }
            None => None,
        };
        let mut state = self.state_mut();
        state
            .data
            .insert(field.to_string(), FieldValue::Reference(target));
        state.dirty = true;
        Ok(())
    }

    /// Documents held by a multi-reference field, in order. Missing targets
    /// of a non-strict field are skipped.
    pub fn references(&self, field: &str) -> OdmResult<Vec<Document>> {
        let schema = self.schema();
        let property = Self::reference_property(&schema, field, RefShape::Multi)?;
        let targets = self.state().refs(field);
        let mut docs = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(doc) = self.session.resolve_ref(&target, property.is_strict())? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Keys held by any reference field.
    pub fn reference_keys(&self, field: &str) -> OdmResult<Vec<Key>> {
        let schema = self.schema();
        Self::reference_property(&schema, field, RefShape::Any)?;
        Ok(self.state().refs(field).into_iter().map(|r| r.key).collect())
    }

    /// Append `target` to a multi-reference field unless its key is already
    /// present. Returns `true` if the field changed.
    pub fn push_reference(&self, field: &str, target: &Document) -> OdmResult<bool> {
        let schema = self.schema();
        let property = Self::reference_property(&schema, field, RefShape::Multi)?;
        let target = target.doc_ref();
        self.check_target(&schema, field, property, &target)?;
        self.state_mut().add_ref(field, target)
    }

    /// Drop the document with `key` from a reference field. Returns `true`
    /// if the field changed.
    pub fn remove_reference(&self, field: &str, key: &Key) -> OdmResult<bool> {
        let schema = self.schema();
        Self::reference_property(&schema, field, RefShape::Any)?;
        self.state_mut().remove_ref(field, key)
    }

    /// Value of a field in the last stored version.
    pub fn raw_data(&self, field: &str) -> OdmResult<Option<Value>> {
        let state = self.state();
        let stored = state.stored.as_ref().ok_or_else(|| OdmError::NotSaved {
            class: state.schema.name().to_string(),
            key: state.key.clone(),
        })?;
        Ok(stored.get(field).cloned())
    }

    /// Apply a set of field assignments. The key and `saved` flag of
    /// `fields` are ignored.
    pub fn merge(&self, fields: Fields) -> OdmResult<()> {
        fields.apply(self)
    }

    // ---- Links ----

    /// Add a tagged link. Returns `false` if it was already present.
    pub fn add_link(&self, target: &Document, tag: impl Into<String>) -> bool {
        let link = (target.doc_ref(), tag.into());
        let mut state = self.state_mut();
        let added = state.links.insert(link);
        state.dirty |= added;
        added
    }

    pub fn remove_link(&self, target: &Document, tag: &str) -> bool {
        let link = (target.doc_ref(), tag.to_string());
        let mut state = self.state_mut();
        let removed = state.links.remove(&link);
        state.dirty |= removed;
        removed
    }

    pub fn link_refs(&self) -> Vec<(DocRef, String)> {
        self.state().links.iter().cloned().collect()
    }

    /// Linked documents with their tags. Targets that no longer exist are
    /// skipped.
    pub fn links(&self) -> OdmResult<Vec<(Document, String)>> {
        let mut docs = Vec::new();
        for (target, tag) in self.link_refs() {
            if let Some(doc) = self.session.resolve_ref(&target, false)? {
                docs.push((doc, tag));
            }
        }
        Ok(docs)
    }

    /// Links in the store's `(bucket, key, tag)` form.
    pub fn external_links(&self) -> Vec<Link> {
        self.state().external_links(self.session.registry())
    }

    // ---- Secondary indexes ----

    /// Index this document under `value`. Returns `false` if it already was.
    pub fn add_index(&self, index: impl Into<String>, value: impl Into<IndexValue>) -> bool {
        let mut state = self.state_mut();
        let added = state
            .indexes
            .entry(index.into())
            .or_default()
            .insert(value.into());
        state.dirty |= added;
        added
    }

    pub fn remove_index(&self, index: &str, value: &IndexValue) -> bool {
        let mut state = self.state_mut();
        let Some(values) = state.indexes.get_mut(index) else {
            return false;
        };
        let removed = values.remove(value);
        if values.is_empty() {
            state.indexes.remove(index);
        }
        state.dirty |= removed;
        removed
    }

    /// Drop every value of one index.
    pub fn clear_index(&self, index: &str) -> bool {
        let mut state = self.state_mut();
        let removed = state.indexes.remove(index).is_some();
        state.dirty |= removed;
        removed
    }

    pub fn indexes(&self) -> Indexes {
        self.state().indexes.clone()
    }

    // ---- Lifecycle ----

    /// Save this document and cascade to the documents it modifies.
    pub fn save(&self) -> OdmResult<()> {
        self.save_with(SaveOptions::default())
    }

    pub fn save_with(&self, options: SaveOptions) -> OdmResult<()> {
        self.session.save_document(self, &options)
    }

    /// Re-read the stored version. A document whose record is gone becomes
    /// deleted.
    pub fn reload(&self) -> OdmResult<()> {
        self.reload_with(ReadOptions::default())
    }

    pub fn reload_with(&self, options: ReadOptions) -> OdmResult<()> {
        self.session.reload_document(self, options)
    }

    /// Delete the stored record and detach this document from every
    /// document referencing it. The instance stays usable and can be
    /// saved again.
    pub fn delete(&self) -> OdmResult<()> {
        self.delete_with(DeleteOptions::default())
    }

    pub fn delete_with(&self, options: DeleteOptions) -> OdmResult<()> {
        self.session.delete_document(self, &options)
    }

    /// Drop this instance from the identity cache. Returns `false` if it was
    /// not the cached instance.
    pub fn evict(&self) -> bool {
        self.session.evict_instance(&self.cell)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other) || self.doc_ref() == other.doc_ref()
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(state) => f
                .debug_struct("Document")
                .field("class", &state.schema.name())
                .field("key", &state.key)
                .field("saved", &state.saved)
                .field("deleted", &state.deleted)
                .finish(),
            Err(_) => f.write_str("Document(<borrowed>)"),
        }
    }
}
