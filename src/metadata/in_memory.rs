//! InMemoryDriver - definition-backed metadata driver for testing and embedded schemas.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{EntityDefinition, MetadataDriver, MetadataError, MixinDefinition};

/// A whole schema as one document: entity definitions plus mixins, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDefinition>,
    #[serde(default)]
    pub mixins: BTreeMap<String, MixinDefinition>,
}

/// Metadata driver holding its definitions in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriver {
    entities: BTreeMap<String, EntityDefinition>,
    mixins: BTreeMap<String, MixinDefinition>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: SchemaDocument) -> Self {
        InMemoryDriver {
            entities: document.entities,
            mixins: document.mixins,
        }
    }

    /// Parse a JSON schema document (`{"entities": {...}, "mixins": {...}}`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<SchemaDocument>(json).map(Self::from_document)
    }

    pub fn with_type(mut self, type_key: impl Into<String>, definition: EntityDefinition) -> Self {
        self.entities.insert(type_key.into(), definition);
        self
    }

    pub fn with_mixin(mut self, name: impl Into<String>, definition: MixinDefinition) -> Self {
        self.mixins.insert(name.into(), definition);
        self
    }

    fn hierarchy(&self, type_key: &str) -> Result<Vec<String>, MetadataError> {
        if !self.entities.contains_key(type_key) {
            return Ok(Vec::new());
        }

        let mut chain = vec![type_key.to_string()];
        let mut seen = BTreeSet::from([type_key]);
        let mut current = type_key;

        while let Some(parent) = self
            .entities
            .get(current)
            .and_then(|def| def.extends.as_deref())
        {
            if !seen.insert(parent) {
                return Err(MetadataError::CyclicHierarchy(type_key.to_string()));
            }
            chain.push(parent.to_string());
            current = parent;
        }

        chain.reverse();
        Ok(chain)
    }
}

impl MetadataDriver for InMemoryDriver {
    fn load_metadata_for_type(
        &self,
        type_key: &str,
    ) -> Result<Option<EntityDefinition>, MetadataError> {
        Ok(self.entities.get(type_key).cloned())
    }

    fn load_metadata_for_mixin(&self, name: &str) -> Result<Option<MixinDefinition>, MetadataError> {
        Ok(self.mixins.get(name).cloned())
    }

    fn type_hierarchy(&self, type_key: &str) -> Result<Vec<String>, MetadataError> {
        self.hierarchy(type_key)
    }

    fn owned_types(&self, type_key: &str) -> Result<Vec<String>, MetadataError> {
        let mut owned = Vec::new();
        for (candidate, def) in &self.entities {
            if def.is_abstract {
                continue;
            }
            if self.hierarchy(candidate)?.iter().any(|t| t == type_key) {
                owned.push(candidate.clone());
            }
        }
        Ok(owned)
    }

    fn all_type_names(&self) -> Result<Vec<String>, MetadataError> {
        Ok(self.entities.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_of(parent: &str) -> EntityDefinition {
        EntityDefinition {
            extends: Some(parent.to_string()),
            ..EntityDefinition::default()
        }
    }

    fn driver() -> InMemoryDriver {
        InMemoryDriver::new()
            .with_type(
                "vehicle",
                EntityDefinition {
                    is_abstract: true,
                    polymorphic: true,
                    ..EntityDefinition::default()
                },
            )
            .with_type("vehicle-car", child_of("vehicle"))
            .with_type("vehicle-truck", child_of("vehicle"))
            .with_type("widget", EntityDefinition::default())
    }

    #[test]
    fn hierarchy_is_root_first() {
        let driver = driver();
        assert_eq!(
            driver.type_hierarchy("vehicle-car").unwrap(),
            vec!["vehicle".to_string(), "vehicle-car".to_string()]
        );
        assert_eq!(driver.type_hierarchy("widget").unwrap(), vec!["widget"]);
        assert!(driver.type_hierarchy("missing").unwrap().is_empty());
    }

    #[test]
    fn owned_types_skip_abstract_roots() {
        let driver = driver();
        assert_eq!(
            driver.owned_types("vehicle").unwrap(),
            vec!["vehicle-car".to_string(), "vehicle-truck".to_string()]
        );
    }

    #[test]
    fn cyclic_hierarchy_is_an_error() {
        let driver = InMemoryDriver::new()
            .with_type("a", child_of("b"))
            .with_type("b", child_of("a"));
        assert_eq!(
            driver.type_hierarchy("a"),
            Err(MetadataError::CyclicHierarchy("a".into()))
        );
    }

    #[test]
    fn parses_schema_documents() {
        let driver = InMemoryDriver::from_json(
            r#"{
                "entities": { "widget": { "attributes": { "name": { "type": "string" } } } },
                "mixins": { "timestamps": { "attributes": { "createdAt": { "type": "date" } } } }
            }"#,
        )
        .unwrap();
        assert!(driver.load_metadata_for_type("widget").unwrap().is_some());
        assert!(driver.load_metadata_for_mixin("timestamps").unwrap().is_some());
        assert_eq!(driver.all_type_names().unwrap(), vec!["widget"]);
    }
}
