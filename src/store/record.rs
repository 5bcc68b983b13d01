use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ModelKey;

/// Flattened property map of a record: attributes by value, relationships as `{type, id}`
/// references, embeds as nested objects.
pub type PropertyMap = Map<String, Value>;

/// The unit a [`Persister`](super::Persister) hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub type_key: String,
    pub id: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Record {
    pub fn new(type_key: impl Into<String>, id: impl Into<String>, properties: PropertyMap) -> Self {
        Record {
            type_key: type_key.into(),
            id: id.into(),
            properties,
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(&self.type_key, &self.id)
    }
}
