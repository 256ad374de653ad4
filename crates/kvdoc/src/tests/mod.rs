//! Session-level tests against the in-memory store.

mod cascade;

use std::sync::Arc;

use kvdoc_schema::{ClassDefinition, Property, RegistryBuilder, SchemaRegistry};
use kvdoc_store::{DocumentStore, InMemoryStore, ReadOptions, Record};
use kvdoc_types::Key;

use crate::config::OdmConfig;
use crate::session::Session;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub(crate) fn key(k: &str) -> Key {
    Key::new(k).unwrap()
}

pub(crate) struct Fixture {
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) session: Session,
}

impl Fixture {
    pub(crate) fn new(registry: SchemaRegistry) -> Self {
        Self::with_config(registry, OdmConfig::default())
    }

    pub(crate) fn with_config(registry: SchemaRegistry, config: OdmConfig) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryStore::new());
        let session = Session::with_config(Arc::new(registry), store.clone(), config).unwrap();
        Self { store, session }
    }

    /// The stored record of `key` in `bucket`.
    pub(crate) fn record(&self, bucket: &str, k: &Key) -> Option<Record> {
        self.store
            .fetch(bucket, k, &ReadOptions::default())
            .unwrap()
            .map(|o| o.data)
    }
}

pub(crate) fn page_user_registry() -> SchemaRegistry {
    RegistryBuilder::new()
        .declare(
            ClassDefinition::new("Page")
                .bucket("pages")
                .property("name", Property::string()),
        )
        .unwrap()
        .declare(
            ClassDefinition::new("User")
                .bucket("users")
                .property("name", Property::string())
                .property("page", Property::reference("Page").collection_name("users")),
        )
        .unwrap()
        .build()
        .unwrap()
}

pub(crate) fn node_registry() -> SchemaRegistry {
    RegistryBuilder::new()
        .declare(
            ClassDefinition::new("Node")
                .bucket("nodes")
                .property("name", Property::string())
                .property("next", Property::self_reference().collection_name("prev")),
        )
        .unwrap()
        .build()
        .unwrap()
}
