use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

use super::events::EventDispatcher;
use super::identity_map::IdentityMap;
use super::{LifecycleEvent, Persister, Query, Record, StoreConfig};
use crate::error::{PersisterError, StoreError};
use crate::metadata::{EntityMetadata, MetadataRegistry, RelationshipMetadata};
use crate::model::{Model, ModelContext, ModelKey, ModelState};

/// Identity map and unit of work over a [`Persister`].
///
/// A store hands out exactly one [`Model`] per `(type, id)` and drives every write through
/// [`Store::commit`]. It is single-threaded and meant to live for one logical unit of work;
/// the [`MetadataRegistry`] behind it is shared.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    me: Weak<StoreInner>,
    registry: Arc<MetadataRegistry>,
    persister: Box<dyn Persister>,
    config: StoreConfig,
    identity_map: RefCell<IdentityMap>,
    events: EventDispatcher,
}

impl Store {
    pub fn new(registry: Arc<MetadataRegistry>, persister: impl Persister + 'static) -> Self {
        Self::with_config(registry, persister, StoreConfig::default())
    }

    pub fn with_config(
        registry: Arc<MetadataRegistry>,
        persister: impl Persister + 'static,
        config: StoreConfig,
    ) -> Self {
        let inner = Rc::new_cyclic(|me| StoreInner {
            me: me.clone(),
            registry,
            persister: Box::new(persister),
            config,
            identity_map: RefCell::new(IdentityMap::default()),
            events: EventDispatcher::default(),
        });
        Store { inner }
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The tracked model for `(type, id)`, fetching it on first request.
    pub fn find(&self, type_key: &str, id: &str) -> Result<Model, StoreError> {
        self.inner.find(type_key, id)
    }

    /// Models for `ids`, or every record of the type when `ids` is `None`. Ids without a
    /// backing record are skipped.
    pub fn find_all(&self, type_key: &str, ids: Option<&[&str]>) -> Result<Vec<Model>, StoreError> {
        let inner = &self.inner;
        let metadata = inner.registry.resolve(type_key)?;
        let ids: Option<Vec<String>> =
            ids.map(|ids| ids.iter().map(|id| inner.persister.convert_id(id)).collect());
        let records = inner.call("all", |p| p.all(&metadata, ids.as_deref()))?;
        inner.materialize_all(&metadata, records)
    }

    pub fn find_query(&self, type_key: &str, query: &Query) -> Result<Vec<Model>, StoreError> {
        let inner = &self.inner;
        let metadata = inner.registry.resolve(type_key)?;
        let records = inner.call("query", |p| p.query(&metadata, query))?;
        inner.materialize_all(&metadata, records)
    }

    /// A new model in state `new`, tracked immediately. The persister generates an id when
    /// none is given.
    pub fn create(&self, type_key: &str, id: Option<&str>) -> Result<Model, StoreError> {
        self.inner.create(type_key, id)
    }

    /// Load, mark for deletion and commit.
    pub fn delete(&self, type_key: &str, id: &str) -> Result<(), StoreError> {
        self.find(type_key, id)?.delete()
    }

    /// Write `model` back according to its state. No-op when nothing is pending.
    pub fn commit(&self, model: &Model) -> Result<(), StoreError> {
        self.inner.commit(model)
    }

    /// Materialise a has-many field of `owner`.
    pub fn load_collection(&self, owner: &Model, key: &str) -> Result<Vec<Model>, StoreError> {
        owner.has_many(key)
    }

    pub fn validate_relationship(
        &self,
        relationship: &RelationshipMetadata,
        candidate: &str,
    ) -> Result<(), StoreError> {
        self.inner.validate_relationship(relationship, candidate)
    }

    /// The tracked model for `(type, id)`, or an empty placeholder that loads on first access.
    ///
    /// A polymorphic root type is read straight away so the model is tracked under its
    /// concrete type.
    pub fn reference(&self, type_key: &str, id: &str) -> Result<Model, StoreError> {
        let id = self.inner.persister.convert_id(id);
        self.inner.reference(&ModelKey::new(type_key, id))
    }

    pub fn contains(&self, type_key: &str, id: &str) -> bool {
        self.inner
            .identity_map
            .borrow()
            .contains(&ModelKey::new(type_key, id))
    }

    /// Number of tracked models, placeholders included.
    pub fn len(&self) -> usize {
        self.inner.identity_map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a synchronous listener for `event`.
    pub fn on(&self, event: LifecycleEvent, listener: impl Fn(LifecycleEvent, &Model) + 'static) {
        self.inner.events.on(event, listener);
    }

    /// Re-broadcast every lifecycle event through `emitter`, payload `"type:id"`.
    #[cfg(feature = "emitter")]
    pub fn forward_to(&self, emitter: EventEmitter) {
        self.inner.events.forward_to(emitter);
    }
}

impl StoreInner {
    fn context(&self) -> Weak<dyn ModelContext> {
        self.me.clone()
    }

    fn timed<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn Persister) -> T,
    ) -> (T, Option<Duration>) {
        let started = Instant::now();
        let result = f(self.persister.as_ref());
        let elapsed = started.elapsed();

        if self.config.slow_call_threshold.is_some_and(|t| elapsed > t) {
            log::warn!("Store: persister call `{}` took {:?}", operation, elapsed);
        }
        let overrun = self
            .config
            .operation_timeout
            .is_some_and(|t| elapsed > t)
            .then_some(elapsed);
        (result, overrun)
    }

    /// Run a read, failing with [`StoreError::Timeout`] and discarding the result when it
    /// overruns the configured timeout.
    fn call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn Persister) -> Result<T, PersisterError>,
    ) -> Result<T, StoreError> {
        match self.timed(operation, f) {
            (_, Some(elapsed)) => Err(StoreError::Timeout { operation, elapsed }),
            (result, None) => Ok(result?),
        }
    }

    /// Run a write. A write that completes after the timeout has still been applied by the
    /// backend, so its outcome is kept.
    fn write(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn Persister) -> Result<(), PersisterError>,
    ) -> Result<(), StoreError> {
        let (result, overrun) = self.timed(operation, f);
        if let Some(elapsed) = overrun {
            log::warn!(
                "Store: persister write `{}` completed after the timeout ({:?})",
                operation,
                elapsed
            );
        }
        Ok(result?)
    }

    fn placeholder(&self, key: &ModelKey) -> Result<Model, StoreError> {
        let metadata = self.registry.resolve(&key.type_key)?;
        let model = Model::new(key.clone(), metadata, self.context());
        Ok(self.identity_map.borrow_mut().register(model))
    }

    /// The tracked model for `id` under `metadata`'s type or any type it owns.
    fn tracked(&self, metadata: &EntityMetadata, id: &str) -> Option<Model> {
        let candidates = std::iter::once(metadata.type_key.as_str())
            .chain(metadata.owned_types.iter().map(String::as_str));
        self.identity_map.borrow().find_any(candidates, id)
    }

    fn find(&self, type_key: &str, id: &str) -> Result<Model, StoreError> {
        let metadata = self.registry.resolve(type_key)?;
        let id = self.persister.convert_id(id);

        if let Some(model) = self.tracked(&metadata, &id) {
            log::trace!("Store: identity map hit for {}", model.key());
            model.touch()?;
            return Ok(model);
        }

        let record = self
            .call("retrieve", |p| p.retrieve(&metadata, &id))?
            .ok_or_else(|| StoreError::RecordNotFound {
                type_key: type_key.to_string(),
                id: id.clone(),
            })?;
        self.materialize(&metadata, record)
    }

    /// Turn a record into its tracked model, hydrating it only if it is not loaded yet.
    fn materialize(&self, metadata: &EntityMetadata, record: Record) -> Result<Model, StoreError> {
        let type_key = self.persister.extract_type(metadata, &record);
        if type_key != metadata.type_key && !self.registry.is_descendant_of(&type_key, &metadata.type_key)? {
            log::warn!(
                "Store: record {}:{} has type `{}`, outside `{}`",
                metadata.type_key,
                record.id,
                type_key,
                metadata.type_key
            );
            return Err(StoreError::RecordNotFound {
                type_key: metadata.type_key.clone(),
                id: record.id,
            });
        }

        let tracked = self.identity_map.borrow().get(&ModelKey::new(&type_key, &record.id));
        let model = match tracked {
            Some(model) if !model.state().empty => return Ok(model),
            Some(model) => model,
            None => self.placeholder(&ModelKey::new(&type_key, &record.id))?,
        };

        model.hydrate(&record.properties, self)?;
        log::debug!("Store: loaded {}", model.key());
        self.events.dispatch(LifecycleEvent::PostLoad, &model);
        Ok(model)
    }

    fn materialize_all(&self, metadata: &EntityMetadata, records: Vec<Record>) -> Result<Vec<Model>, StoreError> {
        records
            .into_iter()
            .map(|record| self.materialize(metadata, record))
            .collect()
    }

    fn create(&self, type_key: &str, id: Option<&str>) -> Result<Model, StoreError> {
        let metadata = self.registry.resolve(type_key)?;
        if metadata.is_abstract {
            return Err(StoreError::AbstractType(type_key.to_string()));
        }

        let id = match id {
            Some(id) => self.persister.convert_id(id),
            None => self.call("generate_id", |p| p.generate_id())?,
        };
        let key = ModelKey::new(type_key, id);
        if self.identity_map.borrow().contains(&key) {
            return Err(StoreError::transition(&key, "a model with this key is already tracked"));
        }

        let model = Model::created(key, metadata, self.context());
        model.apply_defaults()?;
        self.identity_map.borrow_mut().register(model.clone());
        log::debug!("Store: created {}", model.key());
        Ok(model)
    }

    /// Re-read `model` and replace its original state.
    fn refresh(&self, model: &Model) -> Result<(), StoreError> {
        let record = self
            .call("retrieve", |p| p.retrieve(model.metadata(), model.id()))?
            .ok_or_else(|| StoreError::RecordNotFound {
                type_key: model.type_key().to_string(),
                id: model.id().to_string(),
            })?;
        model.hydrate(&record.properties, self)?;
        self.events.dispatch(LifecycleEvent::PostLoad, model);
        Ok(())
    }

    fn commit(&self, model: &Model) -> Result<(), StoreError> {
        let state = model.state();
        if state.deleted {
            return Ok(());
        }

        if state.new {
            self.events.dispatch(LifecycleEvent::PreCommit, model);
            self.events.dispatch(LifecycleEvent::PreCreate, model);
            self.write("create", |p| p.create(model))?;
            model.update_state(|state| state.new = false);
            self.refresh(model)?;
            log::debug!("Store: committed create of {}", model.key());
            self.events.dispatch(LifecycleEvent::PostCreate, model);
        } else if state.deleting {
            self.events.dispatch(LifecycleEvent::PreCommit, model);
            self.events.dispatch(LifecycleEvent::PreDelete, model);
            self.write("delete", |p| p.delete(model))?;
            model.rollback();
            model.update_state(ModelState::mark_deleted);
            log::debug!("Store: committed delete of {}", model.key());
            self.events.dispatch(LifecycleEvent::PostDelete, model);
        } else if model.is_dirty() {
            self.events.dispatch(LifecycleEvent::PreCommit, model);
            self.events.dispatch(LifecycleEvent::PreUpdate, model);
            self.write("update", |p| p.update(model))?;
            self.refresh(model)?;
            log::debug!("Store: committed update of {}", model.key());
            self.events.dispatch(LifecycleEvent::PostUpdate, model);
        } else {
            log::trace!("Store: nothing to commit for {}", model.key());
            return Ok(());
        }

        self.events.dispatch(LifecycleEvent::PostCommit, model);
        Ok(())
    }

    fn load_inverse(&self, owner: &Model, rel: &RelationshipMetadata) -> Result<Vec<Model>, StoreError> {
        let related = self.registry.resolve(&rel.entity_type)?;
        let field = rel.inverse_field.as_deref().unwrap_or_default();
        let ids = [owner.id().to_string()];
        let records = self.call("inverse", |p| p.inverse(owner.metadata(), &related, &ids, field))?;
        self.materialize_all(&related, records)
    }

    fn load_placeholders(&self, owner: &Model, rel: &RelationshipMetadata, placeholders: &[Model]) -> Result<(), StoreError> {
        let mut by_type: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for model in placeholders {
            by_type
                .entry(model.type_key())
                .or_default()
                .push(model.id().to_string());
        }

        for (type_key, ids) in by_type {
            let metadata = self.registry.resolve(type_key)?;
            let records = self.call("all", |p| p.all(&metadata, Some(ids.as_slice())))?;
            self.materialize_all(&metadata, records)?;
        }

        for model in placeholders.iter().filter(|m| m.state().empty) {
            log::warn!(
                "Store: {} references missing record {} through `{}`",
                owner.key(),
                model.key(),
                rel.key
            );
        }
        Ok(())
    }
}

impl ModelContext for StoreInner {
    fn load(&self, model: &Model) -> Result<(), StoreError> {
        let record = self
            .call("retrieve", |p| p.retrieve(model.metadata(), model.id()))?
            .ok_or_else(|| StoreError::RecordNotFound {
                type_key: model.type_key().to_string(),
                id: model.id().to_string(),
            })?;
        model.hydrate(&record.properties, self)?;
        log::debug!("Store: loaded placeholder {}", model.key());
        self.events.dispatch(LifecycleEvent::PostLoad, model);
        Ok(())
    }

    fn commit(&self, model: &Model) -> Result<(), StoreError> {
        StoreInner::commit(self, model)
    }

    fn reload(&self, model: &Model) -> Result<(), StoreError> {
        self.refresh(model)
    }

    fn load_collection(
        &self,
        owner: &Model,
        relationship: &RelationshipMetadata,
        placeholders: &[Model],
    ) -> Result<Vec<Model>, StoreError> {
        if relationship.is_inverse {
            return self.load_inverse(owner, relationship);
        }
        if !placeholders.is_empty() {
            self.load_placeholders(owner, relationship, placeholders)?;
        }
        Ok(Vec::new())
    }

    fn reference(&self, key: &ModelKey) -> Result<Model, StoreError> {
        let metadata = self.registry.resolve(&key.type_key)?;
        if let Some(model) = self.tracked(&metadata, &key.id) {
            return Ok(model);
        }
        if !metadata.owned_types.is_empty() {
            // A polymorphic root only learns the concrete type from the record.
            match self.find(&key.type_key, &key.id) {
                Ok(model) => return Ok(model),
                Err(StoreError::RecordNotFound { .. }) => {
                    log::warn!("Store: reference to missing record {}", key);
                }
                Err(err) => return Err(err),
            }
        }
        self.placeholder(key)
    }

    fn validate_relationship(
        &self,
        relationship: &RelationshipMetadata,
        candidate: &str,
    ) -> Result<(), StoreError> {
        if relationship.accepts(candidate) {
            return Ok(());
        }
        let expected = if relationship.polymorphic {
            let owned: Vec<&str> = relationship.owned_types.iter().map(String::as_str).collect();
            format!("one of [{}]", owned.join(", "))
        } else {
            format!("`{}`", relationship.entity_type)
        };
        Err(StoreError::InvalidRelationshipType {
            field: relationship.key.clone(),
            expected,
            candidate: candidate.to_string(),
        })
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        // Models link to each other strongly; unlink them so the graph can be freed.
        for model in self.identity_map.get_mut().models() {
            model.detach();
        }
    }
}
