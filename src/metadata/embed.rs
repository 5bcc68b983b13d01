use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AttributeMetadata, Cardinality};

/// Structure of an embedded document: attributes plus nested embeds, no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedMetadata {
    pub name: String,
    pub attributes: BTreeMap<String, AttributeMetadata>,
    pub embeds: BTreeMap<String, EmbeddedPropMetadata>,
}

impl EmbedMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        EmbedMetadata {
            name: name.into(),
            attributes: BTreeMap::new(),
            embeds: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeMetadata> {
        self.attributes.get(key)
    }

    pub fn embed(&self, key: &str) -> Option<&EmbeddedPropMetadata> {
        self.embeds.get(key)
    }
}

/// An embed field on an entity or on another embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedPropMetadata {
    pub key: String,
    pub cardinality: Cardinality,
    pub embed: Arc<EmbedMetadata>,
    pub serialize: bool,
}

impl EmbeddedPropMetadata {
    pub fn new(key: impl Into<String>, cardinality: Cardinality, embed: EmbedMetadata) -> Self {
        EmbeddedPropMetadata {
            key: key.into(),
            cardinality,
            embed: Arc::new(embed),
            serialize: true,
        }
    }
}
