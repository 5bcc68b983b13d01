//! Metadata - schema descriptors and the registry that resolves them.
//!
//! Raw per-type [`EntityDefinition`]s come from a [`MetadataDriver`]. The [`MetadataRegistry`]
//! composes mixins, validates each level of the `extends` chain, merges ancestors into
//! descendants and caches the result as an immutable [`EntityMetadata`].
//!
//! ## Example
//!
//! ```ignore
//! use docmapper::metadata::{InMemoryDriver, MetadataRegistry};
//!
//! let driver = InMemoryDriver::from_json(include_str!("schema.json"))?;
//! let registry = MetadataRegistry::new(driver);
//! let car = registry.resolve("vehicle-car")?;
//! assert!(car.attribute("make").is_some());
//! ```

mod attribute;
mod cache;
mod config;
mod definition;
mod driver;
mod embed;
mod entity;
mod error;
mod in_memory;
mod registry;
mod relationship;
pub mod validate;

pub use attribute::{AttributeMetadata, DataType};
pub use cache::{InMemoryMetadataCache, MetadataCache};
pub use config::{NamingPolicy, RegistryConfig};
pub use definition::{
    AttributeDefinition, EmbedDefinition, EmbedFieldDefinition, EntityDefinition,
    MixinDefinition, RelationshipDefinition,
};
pub use driver::MetadataDriver;
pub use embed::{EmbedMetadata, EmbeddedPropMetadata};
pub use entity::{
    EntityMetadata, FieldDescriptor, PersistenceMetadata, SearchMetadata, RESERVED_KEYS,
};
pub use error::MetadataError;
pub use in_memory::{InMemoryDriver, SchemaDocument};
pub use registry::MetadataRegistry;
pub use relationship::{Cardinality, RelationshipMetadata};
