//! Raw, per-type schema definitions as a metadata driver hands them to the registry.
//!
//! Definitions are plain serde structures so any schema source (JSON, YAML, code) can produce
//! them. They are only turned into [`EntityMetadata`] by the registry, which owns validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    AttributeMetadata, Cardinality, DataType, EmbedMetadata, EmbeddedPropMetadata, EntityMetadata,
    FieldDescriptor, MetadataError, PersistenceMetadata, RelationshipMetadata, SearchMetadata,
};

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub polymorphic: bool,
    #[serde(default)]
    pub persistence: Option<PersistenceMetadata>,
    #[serde(default)]
    pub search: Option<SearchMetadata>,
    #[serde(default)]
    pub default_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub mixins: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDefinition>,
    #[serde(default)]
    pub embeds: BTreeMap<String, EmbedFieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default = "yes")]
    pub serialize: bool,
    #[serde(default = "yes")]
    pub persist: bool,
}

impl AttributeDefinition {
    pub fn new(data_type: impl Into<String>) -> Self {
        AttributeDefinition {
            data_type: data_type.into(),
            description: None,
            default: None,
            computed: false,
            searchable: false,
            serialize: true,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    pub entity: String,
    #[serde(default)]
    pub inverse: bool,
    /// Owning field on the related type; required when `inverse` is set.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default = "yes")]
    pub serialize: bool,
}

impl RelationshipDefinition {
    pub fn new(cardinality: Cardinality, entity: impl Into<String>) -> Self {
        RelationshipDefinition {
            cardinality,
            entity: entity.into(),
            inverse: false,
            field: None,
            description: None,
            searchable: false,
            serialize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFieldDefinition {
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    pub entity: EmbedDefinition,
    #[serde(default = "yes")]
    pub serialize: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedDefinition {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub embeds: BTreeMap<String, EmbedFieldDefinition>,
}

/// A reusable bundle of fields composed into entity definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixinDefinition {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDefinition>,
    #[serde(default)]
    pub embeds: BTreeMap<String, EmbedFieldDefinition>,
}

// ============================================================================
// Definition -> metadata conversion
// ============================================================================

impl EntityDefinition {
    /// Build the (unmerged, unvalidated) metadata for `type_key`.
    ///
    /// Only local concerns are checked here: data type names, reserved keys and collisions
    /// between this definition's own fields.
    pub fn to_metadata(&self, type_key: &str) -> Result<EntityMetadata, MetadataError> {
        let mut meta = EntityMetadata::new(type_key);
        meta.extends.clone_from(&self.extends);
        meta.is_abstract = self.is_abstract;
        meta.polymorphic = self.polymorphic;
        if let Some(persistence) = &self.persistence {
            meta.persistence = persistence.clone();
        }
        if let Some(search) = &self.search {
            meta.search = search.clone();
        }
        meta.defaults = self.default_values.clone();
        meta.mixins = self.mixins.iter().cloned().collect();

        add_fields(
            &mut meta,
            &self.attributes,
            &self.relationships,
            &self.embeds,
        )?;
        Ok(meta)
    }
}

impl MixinDefinition {
    /// Copy this mixin's fields into `meta`, rejecting duplicate keys.
    pub fn apply_to(&self, meta: &mut EntityMetadata) -> Result<(), MetadataError> {
        add_fields(meta, &self.attributes, &self.relationships, &self.embeds)
    }
}

fn add_fields(
    meta: &mut EntityMetadata,
    attributes: &BTreeMap<String, AttributeDefinition>,
    relationships: &BTreeMap<String, RelationshipDefinition>,
    embeds: &BTreeMap<String, EmbedFieldDefinition>,
) -> Result<(), MetadataError> {
    for (key, def) in attributes {
        let attr = attribute(&meta.type_key, key, def)?;
        meta.add_field(FieldDescriptor::Attribute(attr))?;
    }
    for (key, def) in relationships {
        let mut rel = RelationshipMetadata::new(key.clone(), def.cardinality, def.entity.clone());
        rel.is_inverse = def.inverse;
        rel.inverse_field.clone_from(&def.field);
        rel.description.clone_from(&def.description);
        rel.searchable = def.searchable;
        rel.serialize = def.serialize;
        meta.add_field(FieldDescriptor::Relationship(rel))?;
    }
    for (key, def) in embeds {
        let embed = embed_prop(&meta.type_key, key, def)?;
        meta.add_field(FieldDescriptor::Embed(embed))?;
    }
    Ok(())
}

fn attribute(
    owner: &str,
    key: &str,
    def: &AttributeDefinition,
) -> Result<AttributeMetadata, MetadataError> {
    let data_type: DataType =
        def.data_type
            .parse()
            .map_err(|data_type| MetadataError::InvalidDataType {
                owner: owner.to_string(),
                key: key.to_string(),
                data_type,
            })?;

    let mut attr = AttributeMetadata::new(key, data_type);
    attr.description.clone_from(&def.description);
    attr.default.clone_from(&def.default);
    attr.computed = def.computed;
    attr.searchable = def.searchable;
    attr.serialize = def.serialize;
    attr.persist = def.persist;
    Ok(attr)
}

fn embed_prop(
    owner: &str,
    key: &str,
    def: &EmbedFieldDefinition,
) -> Result<EmbeddedPropMetadata, MetadataError> {
    let embed_owner = format!("{}.{}", owner, key);
    let mut embed = EmbedMetadata::new(def.entity.name.clone());

    for (attr_key, attr_def) in &def.entity.attributes {
        embed
            .attributes
            .insert(attr_key.clone(), attribute(&embed_owner, attr_key, attr_def)?);
    }
    for (nested_key, nested_def) in &def.entity.embeds {
        if embed.attributes.contains_key(nested_key) {
            return Err(MetadataError::FieldCollision {
                owner: embed_owner,
                key: nested_key.clone(),
                existing: "attribute",
            });
        }
        embed.embeds.insert(
            nested_key.clone(),
            embed_prop(&embed_owner, nested_key, nested_def)?,
        );
    }

    let mut prop = EmbeddedPropMetadata::new(key, def.cardinality, embed);
    prop.serialize = def.serialize;
    Ok(prop)
}
