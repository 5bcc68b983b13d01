//! Structural schema rules, run once per type at registry load time.

use super::{
    Cardinality, EmbedMetadata, EntityMetadata, MetadataError, NamingPolicy, RESERVED_KEYS,
};

/// Field keys start with a letter and continue with letters, digits, `_` or `-`.
pub fn is_valid_field_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

/// Check every key on the type (and inside its embeds) for format and reserved names.
pub fn field_keys(meta: &EntityMetadata) -> Result<(), MetadataError> {
    for key in meta.fields.keys() {
        check_key(&meta.type_key, key)?;
    }
    for embed in meta.embeds() {
        embed_keys(&format!("{}.{}", meta.type_key, embed.key), &embed.embed)?;
    }
    Ok(())
}

fn embed_keys(owner: &str, embed: &EmbedMetadata) -> Result<(), MetadataError> {
    for key in embed.attributes.keys().chain(embed.embeds.keys()) {
        check_key(owner, key)?;
    }
    for (key, nested) in &embed.embeds {
        embed_keys(&format!("{}.{}", owner, key), &nested.embed)?;
    }
    Ok(())
}

fn check_key(owner: &str, key: &str) -> Result<(), MetadataError> {
    if RESERVED_KEYS.contains(&key) {
        return Err(MetadataError::ReservedFieldKey {
            owner: owner.to_string(),
            key: key.to_string(),
        });
    }
    if !is_valid_field_key(key) {
        return Err(MetadataError::InvalidFieldKey {
            owner: owner.to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Polymorphism and inheritance rules for a single level of the hierarchy.
pub fn hierarchy(
    meta: &EntityMetadata,
    parent: Option<&EntityMetadata>,
    policy: &NamingPolicy,
) -> Result<(), MetadataError> {
    if meta.is_abstract && !meta.polymorphic {
        return Err(MetadataError::AbstractNotPolymorphic(meta.type_key.clone()));
    }

    let Some(parent) = parent else {
        return Ok(());
    };

    if !parent.polymorphic {
        return Err(MetadataError::ParentNotPolymorphic {
            child: meta.type_key.clone(),
            parent: parent.type_key.clone(),
        });
    }
    if meta.polymorphic {
        return Err(MetadataError::PolymorphicChild(meta.type_key.clone()));
    }
    if !policy.allows(&parent.type_key, &meta.type_key) {
        return Err(MetadataError::NamingPolicy {
            child: meta.type_key.clone(),
            parent: parent.type_key.clone(),
        });
    }
    Ok(())
}

/// Every merged type needs to know which persister handles it.
pub fn persistence(meta: &EntityMetadata) -> Result<(), MetadataError> {
    if meta.persistence.key.is_none() {
        return Err(MetadataError::MissingSection {
            owner: meta.type_key.clone(),
            section: "persistence.key",
        });
    }
    Ok(())
}

/// Relationship integrity against the merged metadata of related types.
///
/// `lineage` is the owner's hierarchy, root-first and including the owner itself. `related`
/// looks up merged (but not necessarily validated) metadata for a type.
pub fn relationships<F>(
    meta: &EntityMetadata,
    lineage: &[String],
    related: F,
) -> Result<(), MetadataError>
where
    F: Fn(&str) -> Result<Option<EntityMetadata>, MetadataError>,
{
    for rel in meta.relationships() {
        let Some(target) = related(&rel.entity_type)? else {
            return Err(MetadataError::UnknownRelatedType {
                owner: meta.type_key.clone(),
                key: rel.key.clone(),
                target: rel.entity_type.clone(),
            });
        };

        if !rel.is_inverse {
            continue;
        }

        let invalid = |reason: &str| MetadataError::InvalidInverse {
            owner: meta.type_key.clone(),
            key: rel.key.clone(),
            reason: reason.to_string(),
        };

        if rel.cardinality != Cardinality::Many {
            return Err(invalid("inverse relationships must be `many`"));
        }
        let Some(field) = rel.inverse_field.as_deref() else {
            return Err(invalid("missing inverse `field`"));
        };
        let Some(owning) = target.relationship(field) else {
            return Err(invalid(&format!(
                "`{}` has no relationship `{}`",
                target.type_key, field
            )));
        };
        if owning.is_inverse {
            return Err(invalid(&format!(
                "`{}.{}` is itself inverse",
                target.type_key, field
            )));
        }
        if owning.cardinality != Cardinality::One {
            return Err(invalid(&format!(
                "`{}.{}` must be a `one` relationship",
                target.type_key, field
            )));
        }
        if !lineage.iter().any(|t| *t == owning.entity_type) {
            return Err(invalid(&format!(
                "`{}.{}` points at `{}`",
                target.type_key, field, owning.entity_type
            )));
        }
    }
    Ok(())
}
