use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identifier of a stored document within its bucket.
///
/// Keys are opaque non-empty strings. They are either supplied by the caller
/// or generated (see [`KeyStrategy`]).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Validate and wrap a caller-supplied key.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TypeError::InvalidKey {
                key,
                reason: "key must not be empty".into(),
            });
        }
        if key.chars().any(char::is_control) {
            return Err(TypeError::InvalidKey {
                key,
                reason: "key must not contain control characters".into(),
            });
        }
        Ok(Self(key))
    }

    /// Generate a fresh key with the default strategy (UUID v7, simple form).
    pub fn generate() -> Self {
        KeyStrategy::default().generate()
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Key {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Key {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// How keys are generated for documents constructed without one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Time-ordered UUID v7, hex without dashes.
    #[default]
    UuidV7,
    /// Random UUID v4, hex without dashes.
    UuidV4,
}

impl KeyStrategy {
    /// Produce a new key.
    pub fn generate(self) -> Key {
        let uuid = match self {
            Self::UuidV7 => uuid::Uuid::now_v7(),
            Self::UuidV4 => uuid::Uuid::new_v4(),
        };
        Key(uuid.simple().to_string())
    }
}
