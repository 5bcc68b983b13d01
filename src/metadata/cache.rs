//! External metadata cache for sharing resolved metadata beyond one registry instance.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{EntityMetadata, MetadataError};

/// Byte-oriented cache for resolved [`EntityMetadata`], keyed by type.
///
/// Implementations may live out of process (Redis, memcached, a file); the registry encodes
/// entries as JSON.
pub trait MetadataCache: Send + Sync {
    fn get(&self, type_key: &str) -> Result<Option<Vec<u8>>, MetadataError>;

    fn put(&self, type_key: &str, bytes: Vec<u8>) -> Result<(), MetadataError>;

    fn evict(&self, type_key: &str) -> Result<(), MetadataError>;

    fn clear(&self) -> Result<(), MetadataError>;
}

pub(crate) fn encode(metadata: &EntityMetadata) -> Result<Vec<u8>, MetadataError> {
    serde_json::to_vec(metadata).map_err(|e| MetadataError::Cache(e.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<EntityMetadata, MetadataError> {
    serde_json::from_slice(bytes).map_err(|e| MetadataError::Cache(e.to_string()))
}

/// HashMap-backed cache. Clone-friendly via Arc, so clones share entries.
#[derive(Clone, Default)]
pub struct InMemoryMetadataCache {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for InMemoryMetadataCache {
    fn get(&self, type_key: &str) -> Result<Option<Vec<u8>>, MetadataError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MetadataError::LockPoisoned("cache read"))?;
        Ok(entries.get(type_key).cloned())
    }

    fn put(&self, type_key: &str, bytes: Vec<u8>) -> Result<(), MetadataError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MetadataError::LockPoisoned("cache write"))?;
        entries.insert(type_key.to_string(), bytes);
        Ok(())
    }

    fn evict(&self, type_key: &str) -> Result<(), MetadataError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MetadataError::LockPoisoned("cache write"))?;
        entries.remove(type_key);
        Ok(())
    }

    fn clear(&self) -> Result<(), MetadataError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MetadataError::LockPoisoned("cache write"))?;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeMetadata, DataType, FieldDescriptor};

    #[test]
    fn encode_decode_preserves_metadata() {
        let mut meta = EntityMetadata::new("widget");
        meta.add_field(FieldDescriptor::Attribute(AttributeMetadata::new(
            "name",
            DataType::String,
        )))
        .unwrap();

        let decoded = decode(&encode(&meta).unwrap()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn clone_shares_entries() {
        let cache = InMemoryMetadataCache::new();
        let clone = cache.clone();

        cache.put("widget", b"{}".to_vec()).unwrap();
        assert_eq!(clone.get("widget").unwrap(), Some(b"{}".to_vec()));

        clone.evict("widget").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(MetadataError::Cache(_))));
    }
}
