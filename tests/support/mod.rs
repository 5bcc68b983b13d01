#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use docmapper::metadata::{EntityMetadata, InMemoryDriver};
use docmapper::model::{ChangeSet, Model, ModelKey};
use docmapper::store::{PropertyMap, Query};
use docmapper::{InMemoryPersister, MetadataRegistry, Persister, PersisterError, Record, Store, StoreConfig};
use serde_json::Value;

pub const SCHEMA: &str = r#"{
    "entities": {
        "widget": {
            "persistence": { "key": "memory", "collection": "widgets" },
            "mixins": ["timestamps"],
            "defaultValues": { "count": 1 },
            "attributes": {
                "name": { "type": "string" },
                "count": { "type": "integer" },
                "active": { "type": "boolean", "default": true },
                "total": { "type": "integer", "computed": true },
                "scratch": { "type": "string", "persist": false }
            },
            "relationships": {
                "owner": { "type": "one", "entity": "person" },
                "parts": { "type": "many", "entity": "widget" },
                "notes": { "type": "many", "entity": "note", "inverse": true, "field": "widget" },
                "pet": { "type": "one", "entity": "animal" }
            },
            "embeds": {
                "address": {
                    "type": "one",
                    "entity": { "name": "address", "attributes": { "city": { "type": "string" } } }
                }
            }
        },
        "person": {
            "persistence": { "key": "memory", "collection": "people" },
            "attributes": { "name": { "type": "string" } }
        },
        "note": {
            "persistence": { "key": "memory", "collection": "notes" },
            "attributes": { "body": { "type": "string" } },
            "relationships": { "widget": { "type": "one", "entity": "widget" } }
        },
        "animal": {
            "abstract": true,
            "polymorphic": true,
            "persistence": { "key": "memory", "collection": "animals" },
            "attributes": { "name": { "type": "string" } }
        },
        "animal-cat": { "extends": "animal", "attributes": { "lives": { "type": "integer" } } },
        "animal-dog": { "extends": "animal" },
        "bird": {
            "persistence": { "key": "memory", "collection": "birds" },
            "attributes": { "name": { "type": "string" } }
        },
        "vehicle": {
            "abstract": true,
            "polymorphic": true,
            "persistence": { "key": "memory", "collection": "vehicles" },
            "attributes": { "make": { "type": "string" } }
        },
        "vehicle-car": { "extends": "vehicle", "attributes": { "doors": { "type": "integer" } } }
    },
    "mixins": {
        "timestamps": { "attributes": { "createdAt": { "type": "date" } } }
    }
}"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn registry() -> Arc<MetadataRegistry> {
    init_logging();
    let driver = InMemoryDriver::from_json(SCHEMA).expect("fixture schema parses");
    Arc::new(MetadataRegistry::new(driver))
}

pub fn props(value: Value) -> PropertyMap {
    value.as_object().cloned().unwrap_or_default()
}

/// One persister call as the store made it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: &'static str,
    pub key: Option<ModelKey>,
    pub changes: Option<ChangeSet>,
}

/// In-memory persister that records calls and can be told to fail or stall.
#[derive(Clone, Default)]
pub struct RecordingPersister {
    pub inner: InMemoryPersister,
    calls: Rc<RefCell<Vec<Call>>>,
    fail_on: Rc<Cell<Option<&'static str>>>,
    delay: Rc<Cell<Option<(&'static str, Duration)>>>,
}

impl RecordingPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.operation == operation).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Fail every subsequent call of `operation` until reset with `None`.
    pub fn fail_on(&self, operation: Option<&'static str>) {
        self.fail_on.set(operation);
    }

    /// Stall every subsequent call of `operation` until reset with `None`.
    pub fn delay_on(&self, delay: Option<(&'static str, Duration)>) {
        self.delay.set(delay);
    }

    pub fn seed(&self, collection: &str, type_key: &str, id: &str, properties: Value) {
        self.inner
            .insert(collection, Record::new(type_key, id, props(properties)))
            .expect("seed record");
    }

    fn record(&self, operation: &'static str, model: Option<&Model>) -> Result<(), PersisterError> {
        self.calls.borrow_mut().push(Call {
            operation,
            key: model.map(|m| m.key().clone()),
            changes: model.map(Model::change_set),
        });
        if let Some((delayed, delay)) = self.delay.get() {
            if delayed == operation {
                std::thread::sleep(delay);
            }
        }
        if self.fail_on.get() == Some(operation) {
            return Err(PersisterError::new(format!("{operation} failed")));
        }
        Ok(())
    }
}

impl Persister for RecordingPersister {
    fn retrieve(&self, metadata: &EntityMetadata, id: &str) -> Result<Option<Record>, PersisterError> {
        self.record("retrieve", None)?;
        self.inner.retrieve(metadata, id)
    }

    fn all(&self, metadata: &EntityMetadata, ids: Option<&[String]>) -> Result<Vec<Record>, PersisterError> {
        self.record("all", None)?;
        self.inner.all(metadata, ids)
    }

    fn inverse(
        &self,
        owner: &EntityMetadata,
        related: &EntityMetadata,
        ids: &[String],
        field: &str,
    ) -> Result<Vec<Record>, PersisterError> {
        self.record("inverse", None)?;
        self.inner.inverse(owner, related, ids, field)
    }

    fn query(&self, metadata: &EntityMetadata, query: &Query) -> Result<Vec<Record>, PersisterError> {
        self.record("query", None)?;
        self.inner.query(metadata, query)
    }

    fn create(&self, model: &Model) -> Result<(), PersisterError> {
        self.record("create", Some(model))?;
        self.inner.create(model)
    }

    fn update(&self, model: &Model) -> Result<(), PersisterError> {
        self.record("update", Some(model))?;
        self.inner.update(model)
    }

    fn delete(&self, model: &Model) -> Result<(), PersisterError> {
        self.record("delete", Some(model))?;
        self.inner.delete(model)
    }

    fn generate_id(&self) -> Result<String, PersisterError> {
        self.record("generate_id", None)?;
        self.inner.generate_id()
    }
}

pub fn store() -> (Store, RecordingPersister) {
    store_with(StoreConfig::default())
}

pub fn store_with(config: StoreConfig) -> (Store, RecordingPersister) {
    let persister = RecordingPersister::new();
    let store = Store::with_config(registry(), persister.clone(), config);
    (store, persister)
}
