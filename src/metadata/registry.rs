use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use log::{debug, trace};

use super::cache::{self, MetadataCache};
use super::{
    validate, EntityMetadata, FieldDescriptor, MetadataDriver, MetadataError, RegistryConfig,
};

/// Resolves entity types into fully merged, validated [`EntityMetadata`].
///
/// Resolution walks the `extends` chain root-first, validates and merges each level, and
/// caches every level under its own key. The cache is read-mostly after warm-up, so a
/// registry is meant to be built once and shared (`Arc<MetadataRegistry>`) across requests.
/// First-time resolution is serialised so concurrent callers never merge the same type twice.
pub struct MetadataRegistry {
    driver: Box<dyn MetadataDriver>,
    config: RegistryConfig,
    resolved: RwLock<HashMap<String, Arc<EntityMetadata>>>,
    external: Option<Box<dyn MetadataCache>>,
    loading: Mutex<()>,
}

impl MetadataRegistry {
    pub fn new(driver: impl MetadataDriver + 'static) -> Self {
        Self::with_config(driver, RegistryConfig::default())
    }

    pub fn with_config(driver: impl MetadataDriver + 'static, config: RegistryConfig) -> Self {
        MetadataRegistry {
            driver: Box::new(driver),
            config,
            resolved: RwLock::new(HashMap::new()),
            external: None,
            loading: Mutex::new(()),
        }
    }

    /// Back the in-process cache with an external one.
    pub fn with_cache(mut self, cache: impl MetadataCache + 'static) -> Self {
        self.external = Some(Box::new(cache));
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Fully merged metadata for `type_key`.
    pub fn resolve(&self, type_key: &str) -> Result<Arc<EntityMetadata>, MetadataError> {
        if let Some(meta) = self.cached(type_key)? {
            trace!("MetadataRegistry: cache hit for {}", type_key);
            return Ok(meta);
        }

        let _guard = self
            .loading
            .lock()
            .map_err(|_| MetadataError::LockPoisoned("load"))?;

        // Another caller may have finished the merge while we waited.
        if let Some(meta) = self.cached(type_key)? {
            return Ok(meta);
        }

        let start = Instant::now();
        let meta = self.load(type_key)?;
        debug!(
            "MetadataRegistry: Resolved {} in {:?}",
            type_key,
            start.elapsed()
        );
        Ok(meta)
    }

    /// Whether a definition exists for `type_key`.
    pub fn exists(&self, type_key: &str) -> bool {
        matches!(self.cached(type_key), Ok(Some(_)))
            || matches!(self.driver.load_metadata_for_type(type_key), Ok(Some(_)))
    }

    /// Whether `child` extends `ancestor`, directly or transitively. A type does not descend
    /// from itself.
    pub fn is_descendant_of(&self, child: &str, ancestor: &str) -> Result<bool, MetadataError> {
        if child == ancestor {
            return Ok(false);
        }
        Ok(self
            .driver
            .type_hierarchy(child)?
            .iter()
            .any(|t| t == ancestor))
    }

    pub fn all_type_names(&self) -> Result<Vec<String>, MetadataError> {
        self.driver.all_type_names()
    }

    /// Resolve every known type, surfacing any schema error up front.
    pub fn warm(&self) -> Result<usize, MetadataError> {
        let names = self.all_type_names()?;
        for name in &names {
            self.resolve(name)?;
        }
        debug!("MetadataRegistry: Warmed {} types", names.len());
        Ok(names.len())
    }

    /// Drop `type_key` and every cached descendant of it.
    pub fn evict(&self, type_key: &str) -> Result<(), MetadataError> {
        let mut resolved = self
            .resolved
            .write()
            .map_err(|_| MetadataError::LockPoisoned("evict"))?;

        let mut evicted = Vec::new();
        for key in resolved.keys() {
            if key == type_key || self.driver.type_hierarchy(key)?.iter().any(|t| t == type_key) {
                evicted.push(key.clone());
            }
        }
        for key in &evicted {
            resolved.remove(key);
            if let Some(external) = &self.external {
                external.evict(key)?;
            }
        }
        if let Some(external) = &self.external {
            external.evict(type_key)?;
        }
        debug!("MetadataRegistry: Evicted {:?}", evicted);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), MetadataError> {
        self.resolved
            .write()
            .map_err(|_| MetadataError::LockPoisoned("clear"))?
            .clear();
        if let Some(external) = &self.external {
            external.clear()?;
        }
        Ok(())
    }

    // ========================================================================
    // Loading
    // ========================================================================

    fn cached(&self, type_key: &str) -> Result<Option<Arc<EntityMetadata>>, MetadataError> {
        let resolved = self
            .resolved
            .read()
            .map_err(|_| MetadataError::LockPoisoned("read"))?;
        Ok(resolved.get(type_key).cloned())
    }

    fn remember(&self, meta: Arc<EntityMetadata>, write_through: bool) -> Result<(), MetadataError> {
        if write_through {
            if let Some(external) = &self.external {
                external.put(&meta.type_key, cache::encode(&meta)?)?;
            }
        }
        self.resolved
            .write()
            .map_err(|_| MetadataError::LockPoisoned("write"))?
            .insert(meta.type_key.clone(), meta);
        Ok(())
    }

    fn from_external(&self, type_key: &str) -> Result<Option<Arc<EntityMetadata>>, MetadataError> {
        let Some(external) = &self.external else {
            return Ok(None);
        };
        match external.get(type_key)? {
            Some(bytes) => Ok(Some(Arc::new(cache::decode(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Resolve the whole lineage of `type_key`. Caller holds the loading lock.
    fn load(&self, type_key: &str) -> Result<Arc<EntityMetadata>, MetadataError> {
        let lineage = self.driver.type_hierarchy(type_key)?;
        if lineage.is_empty() {
            return Err(MetadataError::SchemaNotFound(type_key.to_string()));
        }
        debug!("MetadataRegistry: Loading hierarchy {:?}", lineage);

        let mut parent: Option<Arc<EntityMetadata>> = None;
        for (depth, level) in lineage.iter().enumerate() {
            if let Some(meta) = self.cached(level)? {
                parent = Some(meta);
                continue;
            }
            if let Some(meta) = self.from_external(level)? {
                self.remember(Arc::clone(&meta), false)?;
                parent = Some(meta);
                continue;
            }

            let merged = self.build(level, parent.as_deref())?;
            validate::persistence(&merged)?;
            validate::relationships(&merged, &lineage[..=depth], |related| self.peek(related))?;

            let merged = Arc::new(merged);
            self.remember(Arc::clone(&merged), true)?;
            parent = Some(merged);
        }

        parent.ok_or_else(|| MetadataError::SchemaNotFound(type_key.to_string()))
    }

    /// Merged metadata without relationship validation and without caching. Used to look at
    /// related types while validating, so mutually related types never recurse.
    fn peek(&self, type_key: &str) -> Result<Option<EntityMetadata>, MetadataError> {
        if let Some(meta) = self.cached(type_key)? {
            return Ok(Some((*meta).clone()));
        }

        let lineage = self.driver.type_hierarchy(type_key)?;
        let mut merged: Option<EntityMetadata> = None;
        for level in &lineage {
            merged = Some(self.build(level, merged.as_ref())?);
        }
        Ok(merged)
    }

    /// Build one level: definition, mixins, structural checks, then fold in the parent.
    fn build(
        &self,
        type_key: &str,
        parent: Option<&EntityMetadata>,
    ) -> Result<EntityMetadata, MetadataError> {
        let definition = self
            .driver
            .load_metadata_for_type(type_key)?
            .ok_or_else(|| MetadataError::SchemaNotFound(type_key.to_string()))?;

        let mut meta = definition.to_metadata(type_key)?;
        for name in &definition.mixins {
            let mixin = self.driver.load_metadata_for_mixin(name)?.ok_or_else(|| {
                MetadataError::MixinNotFound {
                    owner: type_key.to_string(),
                    mixin: name.clone(),
                }
            })?;
            mixin.apply_to(&mut meta)?;
        }

        validate::field_keys(&meta)?;
        validate::hierarchy(&meta, parent, &self.config.naming_policy)?;
        self.link_relationships(&mut meta)?;

        if let Some(parent) = parent {
            meta.inherit(parent)?;
        }
        if meta.polymorphic {
            meta.owned_types = self.driver.owned_types(type_key)?.into_iter().collect();
        }
        Ok(meta)
    }

    /// Copy polymorphism of related types onto this level's own relationships.
    fn link_relationships(&self, meta: &mut EntityMetadata) -> Result<(), MetadataError> {
        for field in meta.fields.values_mut() {
            let FieldDescriptor::Relationship(rel) = field else {
                continue;
            };
            let Some(target) = self.driver.load_metadata_for_type(&rel.entity_type)? else {
                continue;
            };
            if target.polymorphic {
                rel.polymorphic = true;
                rel.owned_types = self
                    .driver
                    .owned_types(&rel.entity_type)?
                    .into_iter()
                    .collect();
            }
        }
        Ok(())
    }
}
