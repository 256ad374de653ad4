use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use kvdoc_types::{Key, Link};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-name to JSON value mapping persisted as one object's data.
pub type Record = serde_json::Map<String, Value>;

/// Secondary index name to the set of values the object is indexed under.
pub type Indexes = BTreeMap<String, BTreeSet<IndexValue>>;

/// A secondary index value: integer or binary (string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    Int(i64),
    Bin(String),
}

impl IndexValue {
    /// Conventional index-name suffix for this value kind.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Int(_) => "_int",
            Self::Bin(_) => "_bin",
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bin(v) => f.write_str(v),
        }
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        Self::Bin(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        Self::Bin(v)
    }
}

/// Secondary index lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexQuery {
    Exact(IndexValue),
    /// Inclusive range. Both bounds must be of the same kind.
    Range { start: IndexValue, end: IndexValue },
}

impl IndexQuery {
    pub fn exact(value: impl Into<IndexValue>) -> Self {
        Self::Exact(value.into())
    }

    pub fn range(start: impl Into<IndexValue>, end: impl Into<IndexValue>) -> Self {
        Self::Range {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether `value` satisfies this query.
    pub fn matches(&self, value: &IndexValue) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Range { start, end } => match (start, end, value) {
                (IndexValue::Int(s), IndexValue::Int(e), IndexValue::Int(v)) => s <= v && v <= e,
                (IndexValue::Bin(s), IndexValue::Bin(e), IndexValue::Bin(v)) => s <= v && v <= e,
                _ => false,
            },
        }
    }
}

/// One object as the store persists it.
///
/// The store never interprets `data`; the mapping layer owns its shape.
/// `vtag` and `last_modified` are assigned by the store on every write and
/// are `None` on an object that has not been written yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub key: Key,
    pub data: Record,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub indexes: Indexes,
    #[serde(default)]
    pub vtag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoredObject {
    /// A new, not yet written object.
    pub fn new(bucket: impl Into<String>, key: Key, data: Record) -> Self {
        Self {
            bucket: bucket.into(),
            key,
            data,
            links: Vec::new(),
            indexes: Indexes::new(),
            vtag: None,
            last_modified: None,
        }
    }

    /// Value of one data field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn set_data(&mut self, data: Record) {
        self.data = data;
    }

    pub fn set_links(&mut self, links: Vec<Link>) {
        self.links = links;
    }

    pub fn set_indexes(&mut self, indexes: Indexes) {
        self.indexes = indexes;
    }

    /// Returns `true` once the store has assigned a version tag.
    pub fn is_written(&self) -> bool {
        self.vtag.is_some()
    }
}
