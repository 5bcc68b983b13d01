use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AttributeMetadata, EmbeddedPropMetadata, MetadataError, RelationshipMetadata};

/// Field keys that name a record's identity and can never be declared as fields.
pub const RESERVED_KEYS: [&str; 2] = ["type", "id"];

/// A single schema field. A key maps to exactly one kind of field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldDescriptor {
    Attribute(AttributeMetadata),
    Relationship(RelationshipMetadata),
    Embed(EmbeddedPropMetadata),
}

impl FieldDescriptor {
    pub fn key(&self) -> &str {
        match self {
            FieldDescriptor::Attribute(attr) => &attr.key,
            FieldDescriptor::Relationship(rel) => &rel.key,
            FieldDescriptor::Embed(embed) => &embed.key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldDescriptor::Attribute(_) => "attribute",
            FieldDescriptor::Relationship(_) => "relationship",
            FieldDescriptor::Embed(_) => "embed",
        }
    }
}

/// Coordinates the persister uses to locate records of a type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceMetadata {
    /// Which persister handles the type (e.g. `mongodb`).
    pub key: Option<String>,
    pub db: Option<String>,
    pub collection: Option<String>,
}

impl PersistenceMetadata {
    /// Overlay the values set on `other`.
    pub fn merge(&mut self, other: &PersistenceMetadata) {
        if other.key.is_some() {
            self.key.clone_from(&other.key);
        }
        if other.db.is_some() {
            self.db.clone_from(&other.db);
        }
        if other.collection.is_some() {
            self.collection.clone_from(&other.collection);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.db.is_none() && self.collection.is_none()
    }
}

/// Coordinates for an external search index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub key: Option<String>,
    pub index: Option<String>,
}

impl SearchMetadata {
    pub fn merge(&mut self, other: &SearchMetadata) {
        if other.key.is_some() {
            self.key.clone_from(&other.key);
        }
        if other.index.is_some() {
            self.index.clone_from(&other.index);
        }
    }
}

/// Fully described schema of one entity type.
///
/// Built by the [`MetadataRegistry`](super::MetadataRegistry) and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub type_key: String,
    pub extends: Option<String>,
    pub is_abstract: bool,
    pub polymorphic: bool,
    pub owned_types: BTreeSet<String>,
    pub persistence: PersistenceMetadata,
    pub search: SearchMetadata,
    pub defaults: BTreeMap<String, Value>,
    pub mixins: BTreeSet<String>,
    pub fields: BTreeMap<String, FieldDescriptor>,
}

impl EntityMetadata {
    pub fn new(type_key: impl Into<String>) -> Self {
        EntityMetadata {
            type_key: type_key.into(),
            extends: None,
            is_abstract: false,
            polymorphic: false,
            owned_types: BTreeSet::new(),
            persistence: PersistenceMetadata::default(),
            search: SearchMetadata::default(),
            defaults: BTreeMap::new(),
            mixins: BTreeSet::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn is_child(&self) -> bool {
        self.extends.is_some()
    }

    /// The collection records of this type live in.
    pub fn collection(&self) -> &str {
        self.persistence
            .collection
            .as_deref()
            .unwrap_or(&self.type_key)
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeMetadata> {
        match self.fields.get(key) {
            Some(FieldDescriptor::Attribute(attr)) => Some(attr),
            _ => None,
        }
    }

    pub fn relationship(&self, key: &str) -> Option<&RelationshipMetadata> {
        match self.fields.get(key) {
            Some(FieldDescriptor::Relationship(rel)) => Some(rel),
            _ => None,
        }
    }

    pub fn embed(&self, key: &str) -> Option<&EmbeddedPropMetadata> {
        match self.fields.get(key) {
            Some(FieldDescriptor::Embed(embed)) => Some(embed),
            _ => None,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeMetadata> {
        self.fields.values().filter_map(|field| match field {
            FieldDescriptor::Attribute(attr) => Some(attr),
            _ => None,
        })
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipMetadata> {
        self.fields.values().filter_map(|field| match field {
            FieldDescriptor::Relationship(rel) => Some(rel),
            _ => None,
        })
    }

    pub fn embeds(&self) -> impl Iterator<Item = &EmbeddedPropMetadata> {
        self.fields.values().filter_map(|field| match field {
            FieldDescriptor::Embed(embed) => Some(embed),
            _ => None,
        })
    }

    /// Default value for an attribute: entity-level defaults win over the attribute's own.
    pub fn default_value(&self, key: &str) -> Option<&Value> {
        self.defaults
            .get(key)
            .or_else(|| self.attribute(key).and_then(|attr| attr.default.as_ref()))
    }

    /// Add a field, rejecting reserved keys and keys already used by any field kind.
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<(), MetadataError> {
        let key = field.key();
        if RESERVED_KEYS.contains(&key) {
            return Err(MetadataError::ReservedFieldKey {
                owner: self.type_key.clone(),
                key: key.to_string(),
            });
        }
        if let Some(existing) = self.fields.get(key) {
            return Err(MetadataError::FieldCollision {
                owner: self.type_key.clone(),
                key: key.to_string(),
                existing: existing.kind(),
            });
        }
        self.fields.insert(key.to_string(), field);
        Ok(())
    }

    /// Fold an already merged parent into this (more derived) metadata.
    ///
    /// Fields are only ever added; a field declared on both sides is a collision.
    pub fn inherit(&mut self, parent: &EntityMetadata) -> Result<(), MetadataError> {
        for field in parent.fields.values() {
            self.add_field(field.clone())?;
        }

        let mut persistence = parent.persistence.clone();
        persistence.merge(&self.persistence);
        self.persistence = persistence;

        let mut search = parent.search.clone();
        search.merge(&self.search);
        self.search = search;

        for (key, value) in &parent.defaults {
            self.defaults
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.mixins.extend(parent.mixins.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Cardinality, DataType};
    use serde_json::json;

    fn attr(key: &str) -> FieldDescriptor {
        FieldDescriptor::Attribute(AttributeMetadata::new(key, DataType::String))
    }

    #[test]
    fn rejects_reserved_keys() {
        let mut meta = EntityMetadata::new("widget");
        let err = meta.add_field(attr("id")).unwrap_err();
        assert!(matches!(err, MetadataError::ReservedFieldKey { .. }));
    }

    #[test]
    fn rejects_collisions_across_kinds() {
        let mut meta = EntityMetadata::new("widget");
        meta.add_field(attr("owner")).unwrap();
        let rel = RelationshipMetadata::new("owner", Cardinality::One, "person");
        let err = meta.add_field(FieldDescriptor::Relationship(rel)).unwrap_err();
        assert_eq!(
            err,
            MetadataError::FieldCollision {
                owner: "widget".into(),
                key: "owner".into(),
                existing: "attribute",
            }
        );
    }

    #[test]
    fn inherit_adds_parent_fields_and_overlays_persistence() {
        let mut parent = EntityMetadata::new("vehicle");
        parent.add_field(attr("make")).unwrap();
        parent.persistence.key = Some("memory".into());
        parent.persistence.collection = Some("vehicles".into());
        parent.defaults.insert("make".into(), json!("generic"));

        let mut child = EntityMetadata::new("vehicle-car");
        child.extends = Some("vehicle".into());
        child.add_field(attr("doors")).unwrap();
        child.persistence.db = Some("garage".into());

        child.inherit(&parent).unwrap();

        assert!(child.has_field("make"));
        assert!(child.has_field("doors"));
        assert_eq!(child.fields.len(), 2);
        assert_eq!(child.collection(), "vehicles");
        assert_eq!(child.persistence.db.as_deref(), Some("garage"));
        assert_eq!(child.default_value("make"), Some(&json!("generic")));
    }

    #[test]
    fn collection_defaults_to_type_key() {
        assert_eq!(EntityMetadata::new("widget").collection(), "widget");
    }
}
