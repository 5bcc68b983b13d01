use thiserror::Error;

/// Errors raised while loading, validating or caching schema metadata.
///
/// Everything except [`MetadataError::SchemaNotFound`] describes a malformed schema and is
/// expected to halt configuration rather than be handled per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("no schema definition found for type `{0}`")]
    SchemaNotFound(String),

    #[error("invalid field key `{key}` on `{owner}`")]
    InvalidFieldKey { owner: String, key: String },

    #[error("field key `{key}` on `{owner}` is reserved")]
    ReservedFieldKey { owner: String, key: String },

    #[error("field `{key}` on `{owner}` collides with an existing {existing} field")]
    FieldCollision {
        owner: String,
        key: String,
        existing: &'static str,
    },

    #[error("attribute `{key}` on `{owner}` declares unknown data type `{data_type}`")]
    InvalidDataType {
        owner: String,
        key: String,
        data_type: String,
    },

    #[error("type `{0}` is abstract but not polymorphic")]
    AbstractNotPolymorphic(String),

    #[error("type `{child}` extends `{parent}`, which is not polymorphic")]
    ParentNotPolymorphic { child: String, parent: String },

    #[error("type `{0}` extends a parent and cannot itself be polymorphic")]
    PolymorphicChild(String),

    #[error("type `{child}` violates the naming policy for children of `{parent}`")]
    NamingPolicy { child: String, parent: String },

    #[error("invalid inverse relationship `{key}` on `{owner}`: {reason}")]
    InvalidInverse {
        owner: String,
        key: String,
        reason: String,
    },

    #[error("relationship `{key}` on `{owner}` targets unknown type `{target}`")]
    UnknownRelatedType {
        owner: String,
        key: String,
        target: String,
    },

    #[error("mixin `{mixin}` used by `{owner}` was not found")]
    MixinNotFound { owner: String, mixin: String },

    #[error("type `{owner}` is missing required section `{section}`")]
    MissingSection { owner: String, section: &'static str },

    #[error("type hierarchy of `{0}` is cyclic")]
    CyclicHierarchy(String),

    #[error("metadata cache error: {0}")]
    Cache(String),

    #[error("metadata registry lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl MetadataError {
    /// Whether this error describes a malformed schema (as opposed to a missing one).
    pub fn is_schema_error(&self) -> bool {
        !matches!(
            self,
            MetadataError::SchemaNotFound(_)
                | MetadataError::Cache(_)
                | MetadataError::LockPoisoned(_)
        )
    }
}
