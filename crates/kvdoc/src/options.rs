use kvdoc_store::{ReadOptions, WriteOptions};

/// Per-call options for loading a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Return a live cached instance as is instead of reloading it.
    pub cached: bool,
    pub read: ReadOptions,
    /// Load from this bucket instead of the class's default bucket.
    pub bucket: Option<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn read(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }
}

/// Per-call options for saving a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub write: WriteOptions,
    /// Bucket of a first save. Ignored once the document is stored.
    pub bucket: Option<String>,
    /// Save only this document: documents it modifies are not saved.
    pub endpoint: bool,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn endpoint(mut self) -> Self {
        self.endpoint = true;
        self
    }
}
