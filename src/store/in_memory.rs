//! InMemoryPersister - HashMap-backed persister for testing and development.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::persister::TYPE_PROPERTY;
use super::{Persister, PropertyMap, Query, Record, SortOrder};
use crate::error::PersisterError;
use crate::metadata::EntityMetadata;
use crate::model::{ChangeSet, Model, ModelKey};

/// In-memory persister backed by a HashMap.
///
/// Storage key is `"collection:id"`; every stored map carries a `_type` discriminator so
/// polymorphic hierarchies can share a collection. Clone-friendly via Arc.
#[derive(Clone)]
pub struct InMemoryPersister {
    storage: Arc<RwLock<HashMap<String, PropertyMap>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for InMemoryPersister {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn make_key(collection: &str, id: &str) -> String {
        format!("{}:{}", collection, id)
    }

    fn split_key(key: &str) -> Option<(&str, &str)> {
        key.split_once(':')
    }

    fn poisoned() -> PersisterError {
        PersisterError::new("lock poisoned")
    }

    /// Seed a record directly, bypassing the model layer.
    pub fn insert(&self, collection: &str, record: Record) -> Result<(), PersisterError> {
        let mut properties = record.properties;
        properties.insert(TYPE_PROPERTY.to_string(), Value::String(record.type_key));
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        storage.insert(Self::make_key(collection, &record.id), properties);
        Ok(())
    }

    /// Raw stored properties, `_type` included.
    pub fn stored(&self, collection: &str, id: &str) -> Result<Option<PropertyMap>, PersisterError> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        Ok(storage.get(&Self::make_key(collection, id)).cloned())
    }

    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn accepts(metadata: &EntityMetadata, properties: &PropertyMap) -> bool {
        match properties.get(TYPE_PROPERTY).and_then(Value::as_str) {
            Some(stored) => stored == metadata.type_key || metadata.owned_types.contains(stored),
            None => true,
        }
    }

    fn to_record(metadata: &EntityMetadata, id: &str, properties: &PropertyMap) -> Record {
        let type_key = properties
            .get(TYPE_PROPERTY)
            .and_then(Value::as_str)
            .unwrap_or(&metadata.type_key);
        Record::new(type_key, id, properties.clone())
    }

    /// Every record of `metadata`'s type, ordered by id.
    fn scan(&self, metadata: &EntityMetadata) -> Result<Vec<Record>, PersisterError> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        let collection = metadata.collection();
        let mut records: Vec<Record> = storage
            .iter()
            .filter_map(|(key, properties)| {
                let (stored_collection, id) = Self::split_key(key)?;
                (stored_collection == collection && Self::accepts(metadata, properties))
                    .then(|| Self::to_record(metadata, id, properties))
            })
            .collect();
        records.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Ok(records)
    }

    fn write(&self, model: &Model, must_exist: bool) -> Result<(), PersisterError> {
        let metadata = model.metadata();
        let key = Self::make_key(metadata.collection(), model.id());
        let changes = model.change_set();

        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        let mut properties = match (storage.get(&key), must_exist) {
            (Some(existing), true) => existing.clone(),
            (None, false) => PropertyMap::new(),
            (Some(_), false) => {
                return Err(PersisterError::new(format!("record {key} already exists")));
            }
            (None, true) => return Err(PersisterError::new(format!("record {key} not found"))),
        };

        apply_changes(&mut properties, &changes);
        properties.insert(
            TYPE_PROPERTY.to_string(),
            Value::String(model.type_key().to_string()),
        );
        storage.insert(key, properties);
        Ok(())
    }
}

impl Persister for InMemoryPersister {
    fn retrieve(&self, metadata: &EntityMetadata, id: &str) -> Result<Option<Record>, PersisterError> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        let key = Self::make_key(metadata.collection(), id);
        Ok(storage
            .get(&key)
            .filter(|properties| Self::accepts(metadata, properties))
            .map(|properties| Self::to_record(metadata, id, properties)))
    }

    fn all(&self, metadata: &EntityMetadata, ids: Option<&[String]>) -> Result<Vec<Record>, PersisterError> {
        let Some(ids) = ids else {
            return self.scan(metadata);
        };
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.retrieve(metadata, id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn inverse(
        &self,
        owner: &EntityMetadata,
        related: &EntityMetadata,
        ids: &[String],
        field: &str,
    ) -> Result<Vec<Record>, PersisterError> {
        let references = |value: &Value| {
            ModelKey::from_value(value).is_some_and(|key| {
                (key.type_key == owner.type_key || owner.owned_types.contains(&key.type_key))
                    && ids.contains(&key.id)
            })
        };
        Ok(self
            .scan(related)?
            .into_iter()
            .filter(|record| record.properties.get(field).is_some_and(|value| references(value)))
            .collect())
    }

    fn query(&self, metadata: &EntityMetadata, query: &Query) -> Result<Vec<Record>, PersisterError> {
        let mut records: Vec<Record> = self
            .scan(metadata)?
            .into_iter()
            .filter(|record| {
                query.criteria.iter().all(|(key, expected)| match key.as_str() {
                    "id" => expected.as_str() == Some(record.id.as_str()),
                    _ => record.properties.get(key) == Some(expected),
                })
            })
            .collect();

        for (key, order) in query.sort.iter().rev() {
            records.sort_by(|a, b| {
                let ordering = compare_values(a.properties.get(key), b.properties.get(key));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let records = records.into_iter().skip(query.offset);
        let mut records: Vec<Record> = match query.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        };

        if let Some(fields) = &query.fields {
            for record in &mut records {
                record
                    .properties
                    .retain(|key, _| key == TYPE_PROPERTY || fields.contains(key));
            }
        }
        Ok(records)
    }

    fn create(&self, model: &Model) -> Result<(), PersisterError> {
        self.write(model, false)
    }

    fn update(&self, model: &Model) -> Result<(), PersisterError> {
        self.write(model, true)
    }

    fn delete(&self, model: &Model) -> Result<(), PersisterError> {
        let key = Self::make_key(model.metadata().collection(), model.id());
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        match storage.remove(&key) {
            Some(_) => Ok(()),
            None => Err(PersisterError::new(format!("record {key} not found"))),
        }
    }

    fn generate_id(&self) -> Result<String, PersisterError> {
        let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        Ok(id.to_string())
    }
}

/// Write a change set onto stored properties. `Null`/`None` removes the key.
fn apply_changes(properties: &mut PropertyMap, changes: &ChangeSet) {
    let mut put = |key: &str, value: Value| {
        if value.is_null() {
            properties.remove(key);
        } else {
            properties.insert(key.to_string(), value);
        }
    };

    for (key, change) in &changes.attributes {
        put(key, change.new.clone());
    }
    for (key, change) in &changes.has_one {
        put(key, change.new.as_ref().map_or(Value::Null, ModelKey::to_value));
    }
    for (key, change) in &changes.has_many {
        put(key, Value::Array(change.new.iter().map(ModelKey::to_value).collect()));
    }
    for (key, change) in &changes.embed_one {
        put(key, change.new.clone());
    }
    for (key, change) in &changes.embed_many {
        put(key, Value::Array(change.new.clone()));
    }
}

/// Numeric ids sort numerically, everything else lexically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Absent and null sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = |value: Option<&Value>| match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    };
    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}
