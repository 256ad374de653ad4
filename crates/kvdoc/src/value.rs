use std::fmt;

use kvdoc_types::Key;
use serde_json::Value;

/// A non-owning pointer to a document: its class and key.
///
/// References inside document data are held in this form and resolved
/// through the session's identity cache, so the in-memory object graph never
/// contains strong cycles.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    pub class: String,
    pub key: Key,
}

impl DocRef {
    pub fn new(class: impl Into<String>, key: Key) -> Self {
        Self {
            class: class.into(),
            key,
        }
    }
}

impl fmt::Debug for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class, self.key)
    }
}

/// In-memory value of one document field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Value(Value),
    Reference(Option<DocRef>),
    References(Vec<DocRef>),
}

impl FieldValue {
    /// The stored form: references become keys.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Reference(None) => Value::Null,
            Self::Reference(Some(r)) => Value::String(r.key.to_string()),
            Self::References(refs) => Value::Array(
                refs.iter()
                    .map(|r| Value::String(r.key.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null) | Self::Reference(None))
    }

    /// Referenced documents, in order. Empty for scalar values.
    pub fn refs(&self) -> Vec<DocRef> {
        match self {
            Self::Value(_) | Self::Reference(None) => Vec::new(),
            Self::Reference(Some(r)) => vec![r.clone()],
            Self::References(refs) => refs.clone(),
        }
    }
}

/// Keys held by a reference field in its stored form: a key string, an array
/// of key strings, or null. Anything else holds no keys.
pub(crate) fn stored_keys(value: Option<&Value>) -> Vec<Key> {
    match value {
        Some(Value::String(s)) => Key::new(s.as_str()).into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| Key::new(s).ok())
            .collect(),
        _ => Vec::new(),
    }
}
