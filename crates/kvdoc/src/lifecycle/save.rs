use kvdoc_store::{Record, StoredObject, WriteOptions};
use tracing::debug;

use super::cascade::{Cascade, Followup};
use crate::document::Document;
use crate::error::{OdmError, OdmResult};
use crate::options::SaveOptions;
use crate::session::Session;

impl Session {
    /// Save `doc`, then the documents the save modified.
    pub(crate) fn save_document(&self, doc: &Document, options: &SaveOptions) -> OdmResult<()> {
        let write = options.write.or(self.config().write);
        let mut cascade = Cascade::new(doc, self.config().cascade.max_depth);
        let followups = self.save_one(doc, &write, options.bucket.as_deref())?;
        if options.endpoint {
            if !followups.is_empty() {
                debug!(
                    doc = ?doc.doc_ref(),
                    dropped = followups.len(),
                    "endpoint save, not cascading"
                );
            }
        } else {
            cascade.enqueue(followups, 1);
        }
        cascade.run(self, &write)
    }

    /// One pass of the save protocol for a single document. Returns the
    /// other documents it modified.
    pub(crate) fn save_one(
        &self,
        doc: &Document,
        write: &WriteOptions,
        bucket: Option<&str>,
    ) -> OdmResult<Vec<Followup>> {
        let (schema, key, previous, stored_bucket) = {
            let state = doc.state();
            if let Some(field) = state.missing_required() {
                return Err(OdmError::MissingField {
                    class: state.schema.name().to_string(),
                    field,
                });
            }
            (
                state.schema.clone(),
                state.key.clone(),
                state.stored.as_ref().map(|o| o.data.clone()),
                state.stored.as_ref().map(|o| o.bucket.clone()),
            )
        };

        let bucket = match (stored_bucket, bucket) {
            (Some(stored), _) => stored,
            (None, Some(requested)) if schema.has_bucket(requested) => requested.to_string(),
            (None, Some(requested)) => {
                return Err(OdmError::UnknownBucket {
                    class: schema.name().to_string(),
                    bucket: requested.to_string(),
                });
            }
            (None, None) => schema.default_bucket().to_string(),
        };

        let uniques = self.plan_uniques(doc, &schema, &key, previous.as_ref())?;
        let followups = self.sync_references(doc, &schema, &key, previous.as_ref())?;

        let object = {
            let state = doc.state();
            let mut object = state
                .stored
                .clone()
                .unwrap_or_else(|| StoredObject::new(bucket.clone(), key.clone(), Record::new()));
            object.set_data(state.serialize());
            object.set_links(state.external_links(self.registry()));
            object.set_indexes(state.indexes.clone());
            object
        };
        let written = self.store().put(&object, write)?;

        self.apply_uniques(&uniques, &key, write)?;

        if !self.is_cached(schema.name(), &key) {
            // a deleted instance being saved again becomes live again
            self.register(&doc.cell)?;
        }
        {
            let mut state = doc.state_mut();
            state.stored = Some(written);
            state.saved = true;
            state.deleted = false;
            state.dirty = false;
        }
        debug!(
            class = schema.name(),
            key = %key,
            bucket = %bucket,
            followups = followups.len(),
            "saved document"
        );
        Ok(followups)
    }

    /// Write a document's current record without running the save protocol.
    pub(crate) fn rewrite_record(&self, doc: &Document, write: &WriteOptions) -> OdmResult<()> {
        let object = {
            let state = doc.state();
            let Some(stored) = &state.stored else {
                return Ok(());
            };
            let mut object = stored.clone();
            object.set_data(state.serialize());
            object.set_links(state.external_links(self.registry()));
            object.set_indexes(state.indexes.clone());
            object
        };
        let written = self.store().put(&object, write)?;
        let mut state = doc.state_mut();
        state.stored = Some(written);
        state.dirty = false;
        Ok(())
    }
}
