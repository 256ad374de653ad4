use serde::{Deserialize, Serialize};

use crate::key::Key;

/// A tagged link from one stored object to another, in the form the store
/// persists it: target bucket, target key and a free-form tag.
///
/// Links are independent of typed references. They carry no inverse and
/// take no part in integrity maintenance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub bucket: String,
    pub key: Key,
    pub tag: String,
}

impl Link {
    pub fn new(bucket: impl Into<String>, key: Key, tag: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key,
            tag: tag.into(),
        }
    }
}
