use super::{Query, Record};
use crate::error::PersisterError;
use crate::metadata::EntityMetadata;
use crate::model::Model;

/// Discriminator property carrying the concrete type of a polymorphic record.
pub const TYPE_PROPERTY: &str = "_type";

/// Backing-store adapter consumed by the [`Store`](super::Store).
///
/// Calls are synchronous and never retried. Writes receive the [`Model`] so they can read
/// [`Model::change_set`] or [`Model::to_properties`].
pub trait Persister {
    fn retrieve(&self, metadata: &EntityMetadata, id: &str) -> Result<Option<Record>, PersisterError>;

    /// Records with the given ids, or every record of the type when `ids` is `None`.
    fn all(&self, metadata: &EntityMetadata, ids: Option<&[String]>) -> Result<Vec<Record>, PersisterError>;

    /// Records of `related` whose `field` references one of `ids` on `owner`.
    fn inverse(
        &self,
        owner: &EntityMetadata,
        related: &EntityMetadata,
        ids: &[String],
        field: &str,
    ) -> Result<Vec<Record>, PersisterError>;

    fn query(&self, metadata: &EntityMetadata, query: &Query) -> Result<Vec<Record>, PersisterError>;

    fn create(&self, model: &Model) -> Result<(), PersisterError>;

    fn update(&self, model: &Model) -> Result<(), PersisterError>;

    fn delete(&self, model: &Model) -> Result<(), PersisterError>;

    fn generate_id(&self) -> Result<String, PersisterError>;

    /// Normalise an id received as a string into the backing store's form.
    fn convert_id(&self, id: &str) -> String {
        id.to_string()
    }

    /// The concrete type of `record`. Polymorphic types read the `_type` discriminator.
    fn extract_type(&self, metadata: &EntityMetadata, record: &Record) -> String {
        if !metadata.polymorphic {
            return record.type_key.clone();
        }
        record
            .properties
            .get(TYPE_PROPERTY)
            .and_then(|value| value.as_str())
            .unwrap_or(&record.type_key)
            .to_string()
    }
}
