use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ModelKey;

/// Old/new pair for one field since the last load or rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

impl<T> Change<T> {
    pub fn new(old: T, new: T) -> Self {
        Change { old, new }
    }
}

/// Everything a persister needs to write a model back, grouped by field kind and sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// `Null` on either side means absent.
    pub attributes: BTreeMap<String, Change<Value>>,
    pub has_one: BTreeMap<String, Change<Option<ModelKey>>>,
    pub has_many: BTreeMap<String, Change<Vec<ModelKey>>>,
    /// `Null` on either side means absent.
    pub embed_one: BTreeMap<String, Change<Value>>,
    pub embed_many: BTreeMap<String, Change<Vec<Value>>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.has_one.is_empty()
            && self.has_many.is_empty()
            && self.embed_one.is_empty()
            && self.embed_many.is_empty()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.attributes.len()
            + self.has_one.len()
            + self.has_many.len()
            + self.embed_one.len()
            + self.embed_many.len()
    }
}
