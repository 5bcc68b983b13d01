use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Collection, Properties};
use crate::metadata::{EmbedMetadata, EmbeddedPropMetadata};

/// A value object nested inside a model, described by inline [`EmbedMetadata`].
///
/// Embedded models have no identity of their own; two are equal when their current values are.
#[derive(Debug, Clone)]
pub struct EmbeddedModel {
    metadata: Arc<EmbedMetadata>,
    attributes: Properties<Value>,
    embed_one: Properties<EmbeddedModel>,
    embed_many: BTreeMap<String, Collection<EmbeddedModel>>,
}

impl PartialEq for EmbeddedModel {
    fn eq(&self, other: &Self) -> bool {
        self.metadata.name == other.metadata.name && self.to_value() == other.to_value()
    }
}

impl EmbeddedModel {
    pub fn new(metadata: Arc<EmbedMetadata>) -> Self {
        let embed_many = metadata
            .embeds
            .values()
            .filter(|prop| prop.cardinality.is_many())
            .map(|prop| (prop.key.clone(), Collection::new()))
            .collect();

        EmbeddedModel {
            metadata,
            attributes: Properties::new(),
            embed_one: Properties::new(),
            embed_many,
        }
    }

    /// Build from input, converting attributes to their declared types. Keys the metadata
    /// does not describe are dropped.
    pub fn from_value(metadata: Arc<EmbedMetadata>, value: &Value) -> Result<Self, String> {
        Self::build(metadata, value, true)
    }

    /// Build from a stored value, keeping attribute values as stored.
    pub(crate) fn from_stored(metadata: Arc<EmbedMetadata>, value: &Value) -> Result<Self, String> {
        Self::build(metadata, value, false)
    }

    fn build(metadata: Arc<EmbedMetadata>, value: &Value, convert: bool) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("embed `{}` expects an object", metadata.name))?;

        let mut attributes = BTreeMap::new();
        let mut embed_one = BTreeMap::new();
        let mut embed_many = BTreeMap::new();

        for (key, attr) in &metadata.attributes {
            match object.get(key) {
                None | Some(Value::Null) => {}
                Some(raw) if convert => {
                    attributes.insert(key.clone(), attr.data_type.convert(raw.clone())?);
                }
                Some(raw) => {
                    attributes.insert(key.clone(), raw.clone());
                }
            }
        }

        for (key, prop) in &metadata.embeds {
            let raw = object.get(key).unwrap_or(&Value::Null);
            if prop.cardinality.is_one() {
                if !raw.is_null() {
                    embed_one.insert(key.clone(), Self::build(prop.embed.clone(), raw, convert)?);
                }
            } else {
                embed_many.insert(key.clone(), Collection::with_original(Self::many(prop, raw, convert)?));
            }
        }

        Ok(EmbeddedModel {
            metadata,
            attributes: Properties::with_original(attributes),
            embed_one: Properties::with_original(embed_one),
            embed_many,
        })
    }

    pub(crate) fn many_from_value(prop: &EmbeddedPropMetadata, value: &Value) -> Result<Vec<Self>, String> {
        Self::many(prop, value, true)
    }

    pub(crate) fn many_from_stored(prop: &EmbeddedPropMetadata, value: &Value) -> Result<Vec<Self>, String> {
        Self::many(prop, value, false)
    }

    fn many(prop: &EmbeddedPropMetadata, value: &Value, convert: bool) -> Result<Vec<Self>, String> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| Self::build(prop.embed.clone(), item, convert))
                .collect(),
            _ => Err(format!("embed `{}` expects an array", prop.key)),
        }
    }

    pub fn metadata(&self) -> &EmbedMetadata {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute, converting to its declared type. `Null` removes it.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), String> {
        let attr = self
            .metadata
            .attribute(key)
            .ok_or_else(|| format!("embed `{}` has no attribute `{key}`", self.metadata.name))?;
        if value.is_null() {
            self.attributes.remove(key);
            return Ok(());
        }
        let converted = attr.data_type.convert(value)?;
        self.attributes.set(key, Some(converted));
        Ok(())
    }

    pub fn embed_one(&self, key: &str) -> Option<&EmbeddedModel> {
        self.embed_one.get(key)
    }

    pub fn set_embed_one(&mut self, key: &str, value: Option<EmbeddedModel>) -> Result<(), String> {
        match self.metadata.embed(key) {
            Some(prop) if prop.cardinality.is_one() => {
                self.embed_one.set(key, value);
                Ok(())
            }
            _ => Err(format!("embed `{}` has no single embed `{key}`", self.metadata.name)),
        }
    }

    pub fn embed_many(&self, key: &str) -> Option<&[EmbeddedModel]> {
        self.embed_many.get(key).map(Collection::models)
    }

    pub fn embed_many_mut(&mut self, key: &str) -> Option<&mut Collection<EmbeddedModel>> {
        self.embed_many.get_mut(key)
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes.are_dirty()
            || self.embed_one.are_dirty()
            || self.embed_many.values().any(Collection::is_dirty)
    }

    pub fn rollback(&mut self) {
        self.attributes.rollback();
        self.embed_one.rollback();
        self.embed_many.values_mut().for_each(Collection::rollback);
    }

    /// Current state as a plain object.
    pub fn to_value(&self) -> Value {
        let mut object: Map<String, Value> = self.attributes.values().into_iter().collect();
        for (key, embed) in self.embed_one.values() {
            object.insert(key, embed.to_value());
        }
        for (key, collection) in &self.embed_many {
            let items = collection.models().iter().map(EmbeddedModel::to_value).collect();
            object.insert(key.clone(), Value::Array(items));
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeMetadata, Cardinality, DataType};
    use serde_json::json;

    fn address() -> Arc<EmbedMetadata> {
        let mut geo = EmbedMetadata::new("geo");
        geo.attributes
            .insert("lat".into(), AttributeMetadata::new("lat", DataType::Float));

        let mut meta = EmbedMetadata::new("address");
        meta.attributes
            .insert("city".into(), AttributeMetadata::new("city", DataType::String));
        meta.attributes
            .insert("zip".into(), AttributeMetadata::new("zip", DataType::Integer));
        meta.embeds.insert(
            "points".into(),
            EmbeddedPropMetadata::new("points", Cardinality::Many, geo),
        );
        Arc::new(meta)
    }

    #[test]
    fn reads_and_writes_values() {
        let value = json!({"city": "Oslo", "zip": "150", "points": [{"lat": 59.9}], "extra": 1});
        let mut embed = EmbeddedModel::from_value(address(), &value).unwrap();
        assert_eq!(embed.get("zip"), Some(&json!(150)));
        assert_eq!(embed.embed_many("points").map(<[_]>::len), Some(1));
        assert!(!embed.is_dirty());

        embed.set("city", json!("Bergen")).unwrap();
        assert!(embed.is_dirty());
        assert_eq!(embed.to_value()["city"], "Bergen");
        assert!(embed.to_value().get("extra").is_none());

        embed.rollback();
        assert_eq!(embed.get("city"), Some(&json!("Oslo")));
    }

    #[test]
    fn stored_values_are_kept_as_stored() {
        let value = json!({"zip": "abc", "points": [{"lat": "north"}]});
        assert!(EmbeddedModel::from_value(address(), &value).is_err());

        let embed = EmbeddedModel::from_stored(address(), &value).unwrap();
        assert_eq!(embed.get("zip"), Some(&json!("abc")));
        assert_eq!(embed.embed_many("points").unwrap()[0].get("lat"), Some(&json!("north")));
        assert!(!embed.is_dirty());
    }

    #[test]
    fn equality_is_by_value() {
        let a = EmbeddedModel::from_value(address(), &json!({"city": "Oslo"})).unwrap();
        let mut b = EmbeddedModel::new(address());
        assert_ne!(a, b);
        b.set("city", json!("Oslo")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(EmbeddedModel::from_value(address(), &json!("Oslo")).is_err());
        let mut embed = EmbeddedModel::new(address());
        assert!(embed.set("zip", json!("abc")).is_err());
        assert!(embed.set("street", json!("x")).is_err());
        assert!(!embed.is_dirty());
    }
}
