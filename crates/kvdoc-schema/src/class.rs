use crate::property::Property;

/// A document class as written by the application, before linking.
///
/// A definition with no bucket is abstract: it only contributes fields to
/// the classes that extend it.
#[derive(Clone, Debug)]
pub struct ClassDefinition {
    pub name: String,
    pub buckets: Vec<String>,
    pub parent: Option<String>,
    pub properties: Vec<(String, Property)>,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buckets: Vec::new(),
            parent: None,
            properties: Vec::new(),
        }
    }

    /// Add a storage bucket. The first bucket added is the default.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.buckets.push(bucket.into());
        self
    }

    pub fn buckets<I, S>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buckets.extend(buckets.into_iter().map(Into::into));
        self
    }

    /// Inherit the fields of `parent`.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn property(mut self, field: impl Into<String>, property: Property) -> Self {
        self.properties.push((field.into(), property));
        self
    }

    pub fn is_abstract(&self) -> bool {
        self.buckets.is_empty()
    }
}
