use std::collections::HashSet;

use kvdoc_schema::ClassSchema;
use kvdoc_store::Record;
use kvdoc_types::Key;
use tracing::debug;

use super::cascade::Followup;
use crate::document::Document;
use crate::error::OdmResult;
use crate::session::Session;
use crate::value::{stored_keys, DocRef};

impl Session {
    /// Bring the mirrored side of every reference field in line with `doc`.
    ///
    /// Forward fields with a collection add `doc` to each target's inverse
    /// collection. For every key the previous stored version referenced but
    /// the current one does not, `doc` is removed from the mirrored field of
    /// that document.
    pub(crate) fn sync_references(
        &self,
        doc: &Document,
        schema: &ClassSchema,
        key: &Key,
        previous: Option<&Record>,
    ) -> OdmResult<Vec<Followup>> {
        let self_ref = doc.doc_ref();
        let mut followups = Vec::new();

        for field in schema.reference_fields() {
            let Some(property) = schema.field(field) else {
                continue;
            };
            let mut current = doc.state().refs(field);
            if property.is_inverse() {
                current = self.prune_missing(doc, field, current)?;
            }

            let current_keys: HashSet<Key> = match property.collection() {
                Some(collection) => {
                    let mut kept = HashSet::new();
                    for target in current {
                        if !property.is_strict() && !self.ref_exists(&target)? {
                            debug!(field, target = ?target, "skipping missing non-strict reference");
                            continue;
                        }
                        let target_doc = self.resolve(&target)?;
                        kept.insert(target.key.clone());
                        if target_doc.state_mut().add_ref(collection, self_ref.clone())? {
                            followups.push(Followup::cascade(target_doc));
                        }
                    }
                    kept
                }
                None => current.into_iter().map(|r| r.key).collect(),
            };

            let (Some(mirror), Some(target_class)) =
                (property.mirror_field(), property.reference_class())
            else {
                continue;
            };
            for stale in stored_keys(previous.and_then(|p| p.get(field))) {
                if current_keys.contains(&stale) {
                    continue;
                }
                let target = match self.resolve(&DocRef::new(target_class, stale.clone())) {
                    Ok(target) => target,
                    Err(err) if err.is_not_found_for(&stale) => {
                        debug!(field, key = %stale, "stale reference target already gone");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                if target.state_mut().remove_ref(mirror, key)? {
                    followups.push(Followup::endpoint(target));
                }
            }
        }
        Ok(followups)
    }

    /// Drop entries of an inverse collection whose document is neither live
    /// nor stored any more. Returns the entries kept.
    fn prune_missing(&self, doc: &Document, field: &str, refs: Vec<DocRef>) -> OdmResult<Vec<DocRef>> {
        let mut kept = Vec::with_capacity(refs.len());
        for target in refs {
            if self.cached_in_lineage(&target).is_some() || self.ref_exists(&target)? {
                kept.push(target);
                continue;
            }
            debug!(field, target = ?target, "dropping missing entry from inverse collection");
            doc.state_mut().remove_ref(field, &target.key)?;
        }
        Ok(kept)
    }

    /// Remove `doc` from the mirrored field of every document its reference
    /// fields hold. Returns the documents that changed, without duplicates
    /// and never `doc` itself.
    pub(crate) fn detach_references(&self, doc: &Document, schema: &ClassSchema, key: &Key) -> OdmResult<Vec<Document>> {
        let mut affected: Vec<Document> = Vec::new();
        for field in schema.reference_fields() {
            let Some(mirror) = schema.field(field).and_then(|p| p.mirror_field()) else {
                continue;
            };
            let targets = doc.state().refs(field);
            for target in targets {
                let target_doc = match self.resolve(&target) {
                    Ok(target_doc) => target_doc,
                    Err(err) if err.is_not_found_for(&target.key) => continue,
                    Err(err) => return Err(err),
                };
                if target_doc.same_instance(doc) {
                    continue;
                }
                let changed = target_doc.state_mut().remove_ref(mirror, key)?;
                if changed && !affected.iter().any(|d| d.same_instance(&target_doc)) {
                    affected.push(target_doc);
                }
            }
        }
        Ok(affected)
    }
}
