use super::{EntityDefinition, MetadataError, MixinDefinition};

/// Source of raw schema definitions consumed by the [`MetadataRegistry`](super::MetadataRegistry).
///
/// Drivers own schema I/O (files, embedded documents, remote config); the registry owns
/// validation, merging and caching.
pub trait MetadataDriver: Send + Sync {
    /// Raw definition for a single type, without anything inherited. `None` if unknown.
    fn load_metadata_for_type(&self, type_key: &str)
        -> Result<Option<EntityDefinition>, MetadataError>;

    /// Raw definition of a named mixin. `None` if unknown.
    fn load_metadata_for_mixin(&self, name: &str) -> Result<Option<MixinDefinition>, MetadataError>;

    /// The `extends` chain ending at `type_key`, ordered root-first.
    ///
    /// Returns an empty list when `type_key` is unknown.
    fn type_hierarchy(&self, type_key: &str) -> Result<Vec<String>, MetadataError>;

    /// Concrete (non-abstract) types owned by a polymorphic type, the type itself included
    /// when it is not abstract.
    fn owned_types(&self, type_key: &str) -> Result<Vec<String>, MetadataError>;

    /// Every type the driver knows about.
    fn all_type_names(&self) -> Result<Vec<String>, MetadataError>;
}
