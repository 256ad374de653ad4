//! Session configuration.
//!
//! ```toml
//! [read]
//! r = "quorum"
//!
//! [write]
//! w = "all"
//! dw = "one"
//!
//! [cascade]
//! max_depth = 16
//!
//! [keys]
//! strategy = "uuid_v4"
//!
//! [cache]
//! sweep_threshold = 1024
//! ```

use kvdoc_store::{DeleteOptions, ReadOptions, WriteOptions};
use kvdoc_types::KeyStrategy;
use serde::{Deserialize, Serialize};

use crate::error::{OdmError, OdmResult};

/// Default cap on cascade hops from the document being saved.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 16;

/// Default live-instance count that triggers the first automatic sweep.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdmConfig {
    /// Consistency knobs used when a call does not specify them.
    pub read: ReadOptions,
    pub write: WriteOptions,
    pub delete: DeleteOptions,
    pub cascade: CascadeConfig,
    pub keys: KeysConfig,
    pub cache: CacheConfig,
}

impl OdmConfig {
    pub fn from_toml_str(input: &str) -> OdmResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| OdmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OdmResult<()> {
        if self.cascade.max_depth == 0 {
            return Err(OdmError::Config("cascade.max_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Hops a cascade may travel away from the document being saved.
    pub max_depth: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub strategy: KeyStrategy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Live instances at which the cache first sweeps itself when a document
    /// is registered. Unreferenced documents with unsaved edits are kept.
    /// 0 leaves sweeping to [`Session::sweep`](crate::Session::sweep).
    pub sweep_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvdoc_store::Quorum;

    #[test]
    fn default_config() {
        let c = OdmConfig::default();
        assert_eq!(c.cascade.max_depth, 16);
        assert_eq!(c.keys.strategy, KeyStrategy::UuidV7);
        assert_eq!(c.cache.sweep_threshold, 1024);
        assert_eq!(c.read, ReadOptions::default());
        assert!(c.write.w.is_none());
    }

    #[test]
    fn parses_toml() {
        let c = OdmConfig::from_toml_str(
            r#"
            [read]
            r = "quorum"

            [write]
            w = "all"
            dw = { n = 2 }

            [delete]
            rw = "one"

            [cascade]
            max_depth = 4

            [keys]
            strategy = "uuid_v4"

            [cache]
            sweep_threshold = 0
            "#,
        )
        .unwrap();
        assert_eq!(c.read.r, Some(Quorum::Quorum));
        assert_eq!(c.write.w, Some(Quorum::All));
        assert_eq!(c.write.dw, Some(Quorum::N(2)));
        assert_eq!(c.delete.rw, Some(Quorum::One));
        assert_eq!(c.cascade.max_depth, 4);
        assert_eq!(c.keys.strategy, KeyStrategy::UuidV4);
        assert_eq!(c.cache.sweep_threshold, 0);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let c = OdmConfig::from_toml_str("[cascade]\n").unwrap();
        assert_eq!(c, OdmConfig::default());
    }

    #[test]
    fn rejects_zero_depth_and_bad_input() {
        let err = OdmConfig::from_toml_str("[cascade]\nmax_depth = 0\n").unwrap_err();
        assert!(matches!(err, OdmError::Config(_)));

        let err = OdmConfig::from_toml_str("[keys]\nstrategy = \"sequential\"\n").unwrap_err();
        assert!(matches!(err, OdmError::Config(_)));
    }
}
