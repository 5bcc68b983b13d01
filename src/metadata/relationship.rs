use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a relationship (or embed) holds a single value or a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn is_one(&self) -> bool {
        matches!(self, Cardinality::One)
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Cardinality::Many)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::One => f.write_str("one"),
            Cardinality::Many => f.write_str("many"),
        }
    }
}

/// Schema description of a relationship to another entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    pub key: String,
    pub cardinality: Cardinality,
    /// The related entity type.
    pub entity_type: String,
    /// Inverse relationships are stored on the related side and resolved by query.
    pub is_inverse: bool,
    /// The owning field on the related type, set for inverse relationships.
    pub inverse_field: Option<String>,
    /// Mirrors the related type's polymorphism; filled in by the registry.
    pub polymorphic: bool,
    pub owned_types: BTreeSet<String>,
    pub description: Option<String>,
    pub searchable: bool,
    pub serialize: bool,
}

impl RelationshipMetadata {
    pub fn new(key: impl Into<String>, cardinality: Cardinality, entity_type: impl Into<String>) -> Self {
        RelationshipMetadata {
            key: key.into(),
            cardinality,
            entity_type: entity_type.into(),
            is_inverse: false,
            inverse_field: None,
            polymorphic: false,
            owned_types: BTreeSet::new(),
            description: None,
            searchable: false,
            serialize: true,
        }
    }

    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.is_inverse = true;
        self.inverse_field = Some(field.into());
        self
    }

    /// Whether a model of `candidate` type may be related through this field.
    pub fn accepts(&self, candidate: &str) -> bool {
        if self.polymorphic {
            self.owned_types.contains(candidate)
        } else {
            self.entity_type == candidate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_type_when_not_polymorphic() {
        let rel = RelationshipMetadata::new("owner", Cardinality::One, "person");
        assert!(rel.accepts("person"));
        assert!(!rel.accepts("person-admin"));
    }

    #[test]
    fn accepts_owned_types_when_polymorphic() {
        let mut rel = RelationshipMetadata::new("pet", Cardinality::One, "pet");
        rel.polymorphic = true;
        rel.owned_types = ["cat".to_string(), "dog".to_string()].into();
        assert!(rel.accepts("cat"));
        assert!(!rel.accepts("bird"));
        assert!(!rel.accepts("pet"));
    }

    #[test]
    fn inverse_builder() {
        let rel = RelationshipMetadata::new("posts", Cardinality::Many, "post").inverse("author");
        assert!(rel.is_inverse);
        assert_eq!(rel.inverse_field.as_deref(), Some("author"));
    }
}
