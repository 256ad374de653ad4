use kvdoc_store::DeleteOptions;
use tracing::debug;

use super::cascade::{Cascade, Followup};
use crate::document::Document;
use crate::error::OdmResult;
use crate::session::Session;

impl Session {
    pub(crate) fn delete_document(&self, doc: &Document, options: &DeleteOptions) -> OdmResult<()> {
        let rw = options.or(self.config().delete);
        let (schema, key, stored) = {
            let state = doc.state();
            let Some(stored) = &state.stored else {
                debug!(class = state.schema.name(), key = %state.key, "delete of unsaved document ignored");
                return Ok(());
            };
            (state.schema.clone(), state.key.clone(), stored.clone())
        };

        let affected = self.detach_references(doc, &schema, &key)?;

        self.evict_instance(&doc.cell);
        self.store().delete(&stored.bucket, &key, &rw)?;

        let current = doc.state().serialize();
        self.delete_unique_records(&schema, &key, &[&current, &stored.data], &rw)?;

        doc.state_mut().mark_deleted();
        debug!(
            class = schema.name(),
            key = %key,
            affected = affected.len(),
            "deleted document"
        );

        let write = self.config().write;
        let mut cascade = Cascade::new(doc, self.config().cascade.max_depth);
        cascade.enqueue(affected.into_iter().map(Followup::endpoint).collect(), 1);
        cascade.run(self, &write)
    }
}
