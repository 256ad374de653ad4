//! Unique-field index records.
//!
//! Each value of a unique field owns one record in the field's index bucket,
//! keyed by the value and holding `{"key": owner}`. A document only ever
//! deletes records it owns.

use std::collections::BTreeSet;

use kvdoc_schema::ClassSchema;
use kvdoc_store::{DeleteOptions, Record, StoredObject, WriteOptions};
use kvdoc_types::Key;
use serde_json::Value;
use tracing::debug;

use crate::document::Document;
use crate::error::{OdmError, OdmResult};
use crate::session::Session;
use crate::value::FieldValue;

const OWNER_FIELD: &str = "key";

/// Index record key for a unique value. Null and the empty string are
/// absent values. A value that cannot be a key comes back as `Err` with its
/// text.
pub(crate) fn unique_value_key(value: Option<&Value>) -> Result<Option<Key>, String> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.is_empty() => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Key::new(text.clone()).map(Some).map_err(|_| text)
}

/// Index record changes one save will make, as `(bucket, value)` pairs.
#[derive(Debug, Default)]
pub(crate) struct UniquePlan {
    create: Vec<(String, Key)>,
    delete: Vec<(String, Key)>,
}

impl Session {
    /// Check every unique field against the index and plan record changes.
    /// Fails before anything is written if a value belongs to another key.
    pub(crate) fn plan_uniques(
        &self,
        doc: &Document,
        schema: &ClassSchema,
        key: &Key,
        previous: Option<&Record>,
    ) -> OdmResult<UniquePlan> {
        let mut plan = UniquePlan::default();
        for unique in schema.unique_fields() {
            let current = doc.state().data.get(&unique.field).map(FieldValue::to_json);
            let current = unique_value_key(current.as_ref()).map_err(|value| {
                OdmError::UnindexableValue {
                    class: schema.name().to_string(),
                    field: unique.field.clone(),
                    value,
                }
            })?;
            // no record was ever written for a stored value that is not a key
            let prior = unique_value_key(previous.and_then(|p| p.get(&unique.field)))
                .ok()
                .flatten();

            let Some(current) = current else {
                plan.delete
                    .extend(prior.map(|value| (unique.bucket.clone(), value)));
                continue;
            };
            if prior.as_ref() != Some(&current) {
                if let Some(owner) = self.unique_owner(&unique.bucket, &current)? {
                    if owner != key.as_str() {
                        return Err(OdmError::Integrity {
                            class: schema.name().to_string(),
                            field: unique.field.clone(),
                            value: current.to_string(),
                        });
                    }
                }
                plan.delete
                    .extend(prior.map(|value| (unique.bucket.clone(), value)));
            }
            plan.create.push((unique.bucket.clone(), current));
        }
        Ok(plan)
    }

    /// Owner key stored in an index record, if the record exists.
    fn unique_owner(&self, bucket: &str, value: &Key) -> OdmResult<Option<String>> {
        let read = self.config().read;
        let record = self.store().fetch(bucket, value, &read)?;
        Ok(record.map(|object| {
            object
                .get(OWNER_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        }))
    }

    pub(crate) fn apply_uniques(
        &self,
        plan: &UniquePlan,
        owner: &Key,
        write: &WriteOptions,
    ) -> OdmResult<()> {
        let read = self.config().read;
        for (bucket, value) in &plan.create {
            if self.store().fetch(bucket, value, &read)?.is_some() {
                continue;
            }
            let mut data = Record::new();
            data.insert(OWNER_FIELD.into(), Value::String(owner.to_string()));
            self.store()
                .put(&StoredObject::new(bucket.clone(), value.clone(), data), write)?;
            debug!(bucket = %bucket, value = %value, owner = %owner, "created unique index record");
        }
        let rw = self.config().delete;
        for (bucket, value) in &plan.delete {
            self.delete_owned_record(bucket, value, owner, &rw)?;
        }
        Ok(())
    }

    /// Delete the index records for the unique values found in any of
    /// `records`, where `owner` owns them.
    pub(crate) fn delete_unique_records(
        &self,
        schema: &ClassSchema,
        owner: &Key,
        records: &[&Record],
        rw: &DeleteOptions,
    ) -> OdmResult<()> {
        for unique in schema.unique_fields() {
            let mut values = BTreeSet::new();
            for record in records {
                if let Ok(Some(value)) = unique_value_key(record.get(&unique.field)) {
                    values.insert(value);
                }
            }
            for value in values {
                self.delete_owned_record(&unique.bucket, &value, owner, rw)?;
            }
        }
        Ok(())
    }

    fn delete_owned_record(
        &self,
        bucket: &str,
        value: &Key,
        owner: &Key,
        rw: &DeleteOptions,
    ) -> OdmResult<bool> {
        match self.unique_owner(bucket, value)? {
            Some(current) if current == owner.as_str() => {
                self.store().delete(bucket, value, rw)?;
                debug!(bucket = %bucket, value = %value, owner = %owner, "deleted unique index record");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
