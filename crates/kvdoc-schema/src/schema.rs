use std::collections::BTreeMap;

use crate::property::Property;

/// A unique field and the bucket holding its index records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueField {
    pub field: String,
    pub bucket: String,
}

/// The linked schema of one concrete document class.
///
/// Built by [`RegistryBuilder::build`](crate::RegistryBuilder::build) and
/// immutable afterwards. Inherited fields are merged in and `SelfClass`
/// targets are resolved, so every reference field names a concrete class.
#[derive(Clone, Debug)]
pub struct ClassSchema {
    pub(crate) name: String,
    pub(crate) buckets: Vec<String>,
    pub(crate) parent: Option<String>,
    pub(crate) fields: BTreeMap<String, Property>,
    /// Field names in declaration order, ancestors first.
    pub(crate) order: Vec<String>,
    pub(crate) unique_fields: Vec<UniqueField>,
    pub(crate) forward_refs: Vec<String>,
    pub(crate) inverse_refs: Vec<String>,
}

impl ClassSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    /// The bucket new documents are written to.
    pub fn default_bucket(&self) -> &str {
        // registration rejects classes without buckets
        self.buckets.first().map_or("", String::as_str)
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.iter().any(|b| b == bucket)
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&Property> {
        self.fields.get(name)
    }

    /// Fields with their properties, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Property)> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.fields.get(name).map(|p| (name.as_str(), p)))
    }

    pub fn field_names(&self) -> &[String] {
        &self.order
    }

    pub fn unique_fields(&self) -> &[UniqueField] {
        &self.unique_fields
    }

    pub fn is_unique(&self, field: &str) -> bool {
        self.unique_fields.iter().any(|u| u.field == field)
    }

    pub fn unique_bucket(&self, field: &str) -> Option<&str> {
        self.unique_fields
            .iter()
            .find(|u| u.field == field)
            .map(|u| u.bucket.as_str())
    }

    /// Fields holding references to other classes.
    pub fn forward_refs(&self) -> &[String] {
        &self.forward_refs
    }

    /// Collections synthesized from other classes' forward references.
    pub fn inverse_refs(&self) -> &[String] {
        &self.inverse_refs
    }

    /// Forward references followed by inverse collections.
    pub fn reference_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.forward_refs
            .iter()
            .chain(&self.inverse_refs)
            .map(String::as_str)
    }
}
