//! Metadata-driven document mapping.
//!
//! Entity types and their fields come from schema definitions resolved by a
//! [`MetadataRegistry`]. A [`Store`] maps records from a [`Persister`] onto [`Model`]s,
//! one instance per record, and writes back only what changed.

mod error;
pub mod metadata;
pub mod model;
pub mod store;

pub use error::{PersisterError, StoreError};
pub use metadata::{EntityMetadata, MetadataError, MetadataRegistry, RegistryConfig};
pub use model::{ChangeSet, EmbeddedModel, Model, ModelKey, ModelState};
pub use store::{InMemoryPersister, LifecycleEvent, Persister, Query, Record, Store, StoreConfig};

// Re-export the EventEmitter lifecycle events can be forwarded to
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
