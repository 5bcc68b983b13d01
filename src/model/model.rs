use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Change, ChangeSet, Collection, EmbeddedModel, HasMany, ModelKey, ModelState, Properties};
use crate::error::StoreError;
use crate::metadata::{
    AttributeMetadata, Cardinality, EmbeddedPropMetadata, EntityMetadata, FieldDescriptor,
    RelationshipMetadata,
};

/// Services a model needs from the unit of work that owns it.
///
/// The [`Store`](crate::store::Store) is the production implementation; anything else that
/// can fetch and write records may stand in for it.
pub trait ModelContext {
    /// Fetch the record behind an empty placeholder and hydrate it.
    fn load(&self, model: &Model) -> Result<(), StoreError>;

    /// Run the commit state machine for `model`.
    fn commit(&self, model: &Model) -> Result<(), StoreError>;

    /// Re-read `model` from the backing store, discarding pending changes.
    fn reload(&self, model: &Model) -> Result<(), StoreError>;

    /// Materialise a has-many field. `placeholders` are the owning members still holding
    /// identity only; inverse relationships ignore them and query by foreign key.
    fn load_collection(
        &self,
        owner: &Model,
        relationship: &RelationshipMetadata,
        placeholders: &[Model],
    ) -> Result<Vec<Model>, StoreError>;

    /// The tracked instance for `key`, or a fresh placeholder.
    fn reference(&self, key: &ModelKey) -> Result<Model, StoreError>;

    /// Check that a model of `candidate` type may be related through `relationship`.
    fn validate_relationship(
        &self,
        relationship: &RelationshipMetadata,
        candidate: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
struct ModelData {
    attributes: Properties<Value>,
    has_one: Properties<Model>,
    has_many: BTreeMap<String, HasMany>,
    embed_one: Properties<EmbeddedModel>,
    embed_many: BTreeMap<String, Collection<EmbeddedModel>>,
}

impl ModelData {
    fn blank(metadata: &EntityMetadata) -> Self {
        let mut data = ModelData::default();
        for rel in metadata.relationships().filter(|rel| rel.cardinality.is_many()) {
            let tracker = if rel.is_inverse {
                HasMany::inverse()
            } else {
                HasMany::owning(Vec::new())
            };
            data.has_many.insert(rel.key.clone(), tracker);
        }
        for prop in metadata.embeds().filter(|prop| prop.cardinality.is_many()) {
            data.embed_many.insert(prop.key.clone(), Collection::new());
        }
        data
    }
}

struct ModelCell {
    key: ModelKey,
    metadata: Arc<EntityMetadata>,
    context: Weak<dyn ModelContext>,
    state: Cell<ModelState>,
    data: RefCell<ModelData>,
}

/// Handle to a tracked record.
///
/// Cloning is cheap and every clone points at the same record; the identity map hands out
/// clones of one handle per `(type, id)`. Mutations go through the trackers and are written
/// back by [`Model::save`].
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelCell>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("key", &self.inner.key)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for Model {}

impl Hash for Model {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.key.hash(state);
    }
}

impl Model {
    /// An empty placeholder holding identity only. Reading any field loads it.
    pub fn new(key: ModelKey, metadata: Arc<EntityMetadata>, context: Weak<dyn ModelContext>) -> Self {
        Model {
            inner: Rc::new(ModelCell {
                key,
                metadata,
                context,
                state: Cell::new(ModelState::placeholder()),
                data: RefCell::new(ModelData::default()),
            }),
        }
    }

    pub(crate) fn created(
        key: ModelKey,
        metadata: Arc<EntityMetadata>,
        context: Weak<dyn ModelContext>,
    ) -> Self {
        let model = Model::new(key, metadata, context);
        *model.inner.data.borrow_mut() = ModelData::blank(&model.inner.metadata);
        model.inner.state.set(ModelState::created());
        model
    }

    // ========================================================================
    // Identity and state
    // ========================================================================

    pub fn key(&self) -> &ModelKey {
        &self.inner.key
    }

    pub fn type_key(&self) -> &str {
        &self.inner.key.type_key
    }

    pub fn id(&self) -> &str {
        &self.inner.key.id
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.inner.metadata
    }

    pub fn state(&self) -> ModelState {
        self.inner.state.get()
    }

    pub fn is_new(&self) -> bool {
        self.state().new
    }

    pub fn is_deleted(&self) -> bool {
        self.state().deleted
    }

    pub fn is_deleting(&self) -> bool {
        self.state().deleting
    }

    pub fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    /// Same record instance, not just the same key.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// True for a model never persisted, or when any tracker holds pending changes.
    pub fn is_dirty(&self) -> bool {
        if self.is_new() {
            return true;
        }
        let data = self.inner.data.borrow();
        data.attributes.are_dirty()
            || data.has_one.are_dirty()
            || data.has_many.values().any(HasMany::is_dirty)
            || data.embed_one.are_dirty()
            || data.embed_many.values().any(Collection::is_dirty)
    }

    pub(crate) fn update_state(&self, update: impl FnOnce(&mut ModelState)) {
        let mut state = self.inner.state.get();
        update(&mut state);
        self.inner.state.set(state);
    }

    fn context(&self) -> Result<Rc<dyn ModelContext>, StoreError> {
        self.inner
            .context
            .upgrade()
            .ok_or_else(|| StoreError::Detached(self.inner.key.to_string()))
    }

    /// Load an empty placeholder. No-op once loaded.
    pub fn touch(&self) -> Result<(), StoreError> {
        if !self.state().empty {
            return Ok(());
        }
        self.context()?.load(self)
    }

    fn ensure_mutable(&self) -> Result<(), StoreError> {
        if self.is_deleted() {
            return Err(StoreError::transition(self.key(), "model is deleted"));
        }
        Ok(())
    }

    // ========================================================================
    // Hydration
    // ========================================================================

    /// Replace the model's original state with a flattened record, dropping pending changes.
    ///
    /// Relationship references resolve through `context`, so related records come back as
    /// tracked instances or placeholders.
    pub fn hydrate(&self, properties: &Map<String, Value>, context: &dyn ModelContext) -> Result<(), StoreError> {
        let metadata = self.inner.metadata.clone();
        let mut attributes = BTreeMap::new();
        let mut has_one = BTreeMap::new();
        let mut embed_one = BTreeMap::new();
        let mut data = ModelData::blank(&metadata);

        for field in metadata.fields.values() {
            let raw = match properties.get(field.key()) {
                Some(Value::Null) | None => None,
                Some(raw) => Some(raw),
            };

            match field {
                FieldDescriptor::Attribute(attr) => {
                    if let Some(raw) = raw {
                        attributes.insert(attr.key.clone(), raw.clone());
                    }
                }
                FieldDescriptor::Relationship(rel) if rel.cardinality.is_one() => {
                    if let Some(key) = raw.and_then(ModelKey::from_value) {
                        has_one.insert(rel.key.clone(), context.reference(&key)?);
                    }
                }
                FieldDescriptor::Relationship(rel) => {
                    if rel.is_inverse {
                        continue;
                    }
                    let members = match raw {
                        Some(raw) => self.references(rel, raw, context)?,
                        None => Vec::new(),
                    };
                    data.has_many.insert(rel.key.clone(), HasMany::owning(members));
                }
                FieldDescriptor::Embed(prop) => {
                    let raw = raw.unwrap_or(&Value::Null);
                    if prop.cardinality.is_one() {
                        if !raw.is_null() {
                            let embed = EmbeddedModel::from_stored(prop.embed.clone(), raw)
                                .map_err(|reason| self.invalid(&prop.key, reason))?;
                            embed_one.insert(prop.key.clone(), embed);
                        }
                    } else {
                        let items = EmbeddedModel::many_from_stored(prop, raw)
                            .map_err(|reason| self.invalid(&prop.key, reason))?;
                        data.embed_many
                            .insert(prop.key.clone(), Collection::with_original(items));
                    }
                }
            }
        }

        data.attributes = Properties::with_original(attributes);
        data.has_one = Properties::with_original(has_one);
        data.embed_one = Properties::with_original(embed_one);

        *self.inner.data.borrow_mut() = data;
        self.update_state(ModelState::mark_loaded);
        Ok(())
    }

    fn references(
        &self,
        rel: &RelationshipMetadata,
        raw: &Value,
        context: &dyn ModelContext,
    ) -> Result<Vec<Model>, StoreError> {
        let Value::Array(items) = raw else {
            return Err(self.invalid(&rel.key, "expected an array of references"));
        };
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            match ModelKey::from_value(item) {
                Some(key) => members.push(context.reference(&key)?),
                None => log::warn!("{}: skipping malformed reference in `{}`", self.key(), rel.key),
            }
        }
        Ok(members)
    }

    /// Seed defaults on a freshly created model as pending overrides.
    pub(crate) fn apply_defaults(&self) -> Result<(), StoreError> {
        let metadata = self.inner.metadata.clone();
        let mut data = self.inner.data.borrow_mut();
        for attr in metadata.attributes() {
            if let Some(default) = metadata.default_value(&attr.key) {
                let value = attr
                    .data_type
                    .convert(default.clone())
                    .map_err(|reason| self.invalid(&attr.key, reason))?;
                data.attributes.set(&attr.key, Some(value));
            }
        }
        Ok(())
    }

    /// Drop relationship links so reference cycles between models can be freed.
    pub(crate) fn detach(&self) {
        let mut data = self.inner.data.borrow_mut();
        data.has_one = Properties::new();
        data.has_many.clear();
    }

    // ========================================================================
    // Field lookup
    // ========================================================================

    fn invalid(&self, key: &str, reason: impl Into<String>) -> StoreError {
        StoreError::InvalidValue {
            type_key: self.type_key().to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    fn wrong_kind(&self, key: &str, expected: &'static str) -> StoreError {
        match self.inner.metadata.field(key) {
            None => StoreError::UnknownField {
                type_key: self.type_key().to_string(),
                key: key.to_string(),
            },
            Some(field) => StoreError::FieldKind {
                type_key: self.type_key().to_string(),
                key: key.to_string(),
                expected,
                actual: field.kind(),
            },
        }
    }

    fn attribute_meta(&self, key: &str) -> Result<&AttributeMetadata, StoreError> {
        self.inner
            .metadata
            .attribute(key)
            .ok_or_else(|| self.wrong_kind(key, "an attribute"))
    }

    fn relationship_meta(&self, key: &str, cardinality: Cardinality) -> Result<&RelationshipMetadata, StoreError> {
        match self.inner.metadata.relationship(key) {
            Some(rel) if rel.cardinality == cardinality => Ok(rel),
            _ if cardinality.is_one() => Err(self.wrong_kind(key, "a has-one relationship")),
            _ => Err(self.wrong_kind(key, "a has-many relationship")),
        }
    }

    fn embed_meta(&self, key: &str, cardinality: Cardinality) -> Result<&EmbeddedPropMetadata, StoreError> {
        match self.inner.metadata.embed(key) {
            Some(prop) if prop.cardinality == cardinality => Ok(prop),
            _ if cardinality.is_one() => Err(self.wrong_kind(key, "a single embed")),
            _ => Err(self.wrong_kind(key, "an embed collection")),
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.attribute_meta(key)?;
        self.touch()?;
        Ok(self.inner.data.borrow().attributes.get(key).cloned())
    }

    /// Set an attribute, converting to its declared data type. `Null` removes the value.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let attr = self.attribute_meta(key)?;
        self.ensure_mutable()?;
        if attr.computed {
            return Err(StoreError::transition(
                self.key(),
                format!("attribute `{key}` is computed"),
            ));
        }
        self.touch()?;

        let value = value.into();
        if value.is_null() {
            self.inner.data.borrow_mut().attributes.remove(key);
            return Ok(());
        }
        let value = attr
            .data_type
            .convert(value)
            .map_err(|reason| self.invalid(key, reason))?;
        self.inner.data.borrow_mut().attributes.set(key, Some(value));
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.set(key, Value::Null)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    pub fn has_one(&self, key: &str) -> Result<Option<Model>, StoreError> {
        self.relationship_meta(key, Cardinality::One)?;
        self.touch()?;
        Ok(self.inner.data.borrow().has_one.get(key).cloned())
    }

    pub fn set_has_one(&self, key: &str, related: Option<&Model>) -> Result<(), StoreError> {
        let rel = self.relationship_meta(key, Cardinality::One)?;
        self.ensure_mutable()?;
        if let Some(related) = related {
            self.context()?.validate_relationship(rel, related.type_key())?;
        }
        self.touch()?;
        self.inner
            .data
            .borrow_mut()
            .has_one
            .set(key, related.cloned());
        Ok(())
    }

    /// Members of a has-many field, loading them on first access.
    pub fn has_many(&self, key: &str) -> Result<Vec<Model>, StoreError> {
        let rel = self.relationship_meta(key, Cardinality::Many)?;
        self.touch()?;
        self.materialize(rel)?;
        let data = self.inner.data.borrow();
        Ok(data
            .has_many
            .get(key)
            .map(|tracker| tracker.collection().models().to_vec())
            .unwrap_or_default())
    }

    /// Keys of a has-many field as currently tracked, without loading anything.
    pub fn has_many_keys(&self, key: &str) -> Result<Vec<ModelKey>, StoreError> {
        self.relationship_meta(key, Cardinality::Many)?;
        self.touch()?;
        let data = self.inner.data.borrow();
        Ok(data
            .has_many
            .get(key)
            .map(|tracker| tracker.collection().models().iter().map(|m| m.key().clone()).collect())
            .unwrap_or_default())
    }

    fn materialize(&self, rel: &RelationshipMetadata) -> Result<(), StoreError> {
        let placeholders = {
            let data = self.inner.data.borrow();
            match data.has_many.get(&rel.key) {
                Some(tracker) if tracker.needs_load() => tracker.placeholders(),
                _ => return Ok(()),
            }
        };

        let members = if rel.is_inverse && self.is_new() {
            Vec::new()
        } else {
            self.context()?.load_collection(self, rel, &placeholders)?
        };

        if let Some(tracker) = self.inner.data.borrow_mut().has_many.get_mut(&rel.key) {
            tracker.loaded_with(members);
        }
        Ok(())
    }

    fn with_collection(
        &self,
        rel: &RelationshipMetadata,
        update: impl FnOnce(&mut Collection<Model>),
    ) -> Result<(), StoreError> {
        if rel.is_inverse {
            return Err(StoreError::transition(
                self.key(),
                format!("`{}` is an inverse relationship and cannot be modified", rel.key),
            ));
        }
        self.ensure_mutable()?;
        self.touch()?;

        let mut data = self.inner.data.borrow_mut();
        let tracker = data
            .has_many
            .entry(rel.key.clone())
            .or_insert_with(|| HasMany::owning(Vec::new()));
        if let Some(collection) = tracker.collection_mut() {
            update(collection);
        }
        Ok(())
    }

    pub fn push(&self, key: &str, related: &Model) -> Result<(), StoreError> {
        let rel = self.relationship_meta(key, Cardinality::Many)?;
        if !rel.is_inverse {
            self.context()?.validate_relationship(rel, related.type_key())?;
        }
        self.with_collection(rel, |collection| collection.push(related.clone()))
    }

    pub fn pull(&self, key: &str, related: &Model) -> Result<(), StoreError> {
        let rel = self.relationship_meta(key, Cardinality::Many)?;
        self.with_collection(rel, |collection| collection.remove(related))
    }

    pub fn clear(&self, key: &str) -> Result<(), StoreError> {
        let rel = self.relationship_meta(key, Cardinality::Many)?;
        self.with_collection(rel, Collection::clear)
    }

    // ========================================================================
    // Embeds
    // ========================================================================

    /// A detached, empty embedded model for field `key`.
    pub fn new_embed(&self, key: &str) -> Result<EmbeddedModel, StoreError> {
        let prop = self
            .inner
            .metadata
            .embed(key)
            .ok_or_else(|| self.wrong_kind(key, "an embed"))?;
        Ok(EmbeddedModel::new(prop.embed.clone()))
    }

    fn check_embed(&self, prop: &EmbeddedPropMetadata, embed: &EmbeddedModel) -> Result<(), StoreError> {
        if embed.metadata().name != prop.embed.name {
            return Err(self.invalid(
                &prop.key,
                format!("expected embed `{}`, got `{}`", prop.embed.name, embed.metadata().name),
            ));
        }
        Ok(())
    }

    pub fn embed_one(&self, key: &str) -> Result<Option<EmbeddedModel>, StoreError> {
        self.embed_meta(key, Cardinality::One)?;
        self.touch()?;
        Ok(self.inner.data.borrow().embed_one.get(key).cloned())
    }

    pub fn set_embed_one(&self, key: &str, embed: Option<EmbeddedModel>) -> Result<(), StoreError> {
        let prop = self.embed_meta(key, Cardinality::One)?;
        self.ensure_mutable()?;
        if let Some(embed) = &embed {
            self.check_embed(prop, embed)?;
        }
        self.touch()?;
        self.inner.data.borrow_mut().embed_one.set(key, embed);
        Ok(())
    }

    pub fn embed_many(&self, key: &str) -> Result<Vec<EmbeddedModel>, StoreError> {
        self.embed_meta(key, Cardinality::Many)?;
        self.touch()?;
        let data = self.inner.data.borrow();
        Ok(data
            .embed_many
            .get(key)
            .map(|collection| collection.models().to_vec())
            .unwrap_or_default())
    }

    fn with_embeds(
        &self,
        key: &str,
        update: impl FnOnce(&mut Collection<EmbeddedModel>),
    ) -> Result<(), StoreError> {
        self.ensure_mutable()?;
        self.touch()?;
        let mut data = self.inner.data.borrow_mut();
        update(data.embed_many.entry(key.to_string()).or_default());
        Ok(())
    }

    pub fn push_embed(&self, key: &str, embed: EmbeddedModel) -> Result<(), StoreError> {
        let prop = self.embed_meta(key, Cardinality::Many)?;
        self.check_embed(prop, &embed)?;
        self.with_embeds(key, |collection| collection.push(embed))
    }

    pub fn pull_embed(&self, key: &str, embed: &EmbeddedModel) -> Result<(), StoreError> {
        self.embed_meta(key, Cardinality::Many)?;
        self.with_embeds(key, |collection| collection.remove(embed))
    }

    // ========================================================================
    // Bulk input
    // ========================================================================

    /// Apply a flattened property map, as produced by a normaliser.
    ///
    /// All-or-nothing: if any field fails, every tracker is left as it was. `type` and `id`
    /// are identity and skipped; keys the metadata does not describe are ignored.
    pub fn apply(&self, properties: &Map<String, Value>) -> Result<(), StoreError> {
        self.ensure_mutable()?;
        self.touch()?;

        let snapshot = self.inner.data.borrow().clone();
        let result = properties
            .iter()
            .try_for_each(|(key, value)| self.apply_field(key, value));
        if result.is_err() {
            *self.inner.data.borrow_mut() = snapshot;
        }
        result
    }

    fn apply_field(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let Some(field) = self.inner.metadata.field(key) else {
            if !crate::metadata::RESERVED_KEYS.contains(&key) {
                log::debug!("{}: ignoring unknown key `{key}`", self.key());
            }
            return Ok(());
        };

        match field {
            FieldDescriptor::Attribute(_) => self.set(key, value.clone()),
            FieldDescriptor::Relationship(rel) if rel.cardinality.is_one() => {
                if value.is_null() {
                    return self.set_has_one(key, None);
                }
                let related = ModelKey::from_value(value)
                    .ok_or_else(|| self.invalid(key, "expected a {type, id} reference"))?;
                let related = self.context()?.reference(&related)?;
                self.set_has_one(key, Some(&related))
            }
            FieldDescriptor::Relationship(rel) => {
                let context = self.context()?;
                let members = match value {
                    Value::Null => Vec::new(),
                    _ => self.references(rel, value, context.as_ref())?,
                };
                if !rel.is_inverse {
                    for member in &members {
                        context.validate_relationship(rel, member.type_key())?;
                    }
                }
                self.with_collection(rel, |collection| {
                    collection.clear();
                    members.into_iter().for_each(|member| collection.push(member));
                })
            }
            FieldDescriptor::Embed(prop) if prop.cardinality.is_one() => {
                let embed = match value {
                    Value::Null => None,
                    _ => Some(
                        EmbeddedModel::from_value(prop.embed.clone(), value)
                            .map_err(|reason| self.invalid(key, reason))?,
                    ),
                };
                self.set_embed_one(key, embed)
            }
            FieldDescriptor::Embed(prop) => {
                let items = EmbeddedModel::many_from_value(prop, value)
                    .map_err(|reason| self.invalid(key, reason))?;
                self.with_embeds(key, |collection| {
                    collection.clear();
                    items.into_iter().for_each(|item| collection.push(item));
                })
            }
        }
    }

    // ========================================================================
    // Change tracking
    // ========================================================================

    /// Pending changes, excluding attributes that are not persisted.
    pub fn change_set(&self) -> ChangeSet {
        let metadata = &self.inner.metadata;
        let data = self.inner.data.borrow();
        let mut changes = ChangeSet::default();

        for (key, change) in data.attributes.change_set() {
            if metadata.attribute(&key).is_some_and(|attr| !attr.persist) {
                continue;
            }
            let change = Change::new(
                change.old.unwrap_or(Value::Null),
                change.new.unwrap_or(Value::Null),
            );
            changes.attributes.insert(key, change);
        }

        for (key, change) in data.has_one.change_set() {
            let change = Change::new(
                change.old.map(|m| m.key().clone()),
                change.new.map(|m| m.key().clone()),
            );
            changes.has_one.insert(key, change);
        }

        for (key, tracker) in &data.has_many {
            if tracker.is_inverse() {
                continue;
            }
            if let Some(change) = tracker.collection().change_set() {
                let keys = |models: Vec<Model>| -> Vec<ModelKey> {
                    models.iter().map(|m| m.key().clone()).collect()
                };
                changes
                    .has_many
                    .insert(key.clone(), Change::new(keys(change.old), keys(change.new)));
            }
        }

        for (key, change) in data.embed_one.change_set() {
            let value = |embed: Option<EmbeddedModel>| embed.map_or(Value::Null, |e| e.to_value());
            changes
                .embed_one
                .insert(key, Change::new(value(change.old), value(change.new)));
        }

        for (key, collection) in &data.embed_many {
            if let Some(change) = collection.change_set() {
                let values = |items: Vec<EmbeddedModel>| -> Vec<Value> {
                    items.iter().map(EmbeddedModel::to_value).collect()
                };
                changes
                    .embed_many
                    .insert(key.clone(), Change::new(values(change.old), values(change.new)));
            }
        }

        changes
    }

    /// Revert every tracker to its original state. Lifecycle flags are left alone.
    pub fn rollback(&self) {
        let mut data = self.inner.data.borrow_mut();
        data.attributes.rollback();
        data.has_one.rollback();
        data.has_many.values_mut().for_each(HasMany::rollback);
        data.embed_one.rollback();
        data.embed_many.values_mut().for_each(Collection::rollback);
    }

    /// Current state flattened into a property map. Inverse relationships are omitted.
    pub fn to_properties(&self) -> Result<Map<String, Value>, StoreError> {
        self.touch()?;
        let data = self.inner.data.borrow();
        let mut properties: Map<String, Value> = data.attributes.values().into_iter().collect();

        for (key, model) in data.has_one.values() {
            properties.insert(key, model.key().to_value());
        }
        for (key, tracker) in &data.has_many {
            if tracker.is_inverse() {
                continue;
            }
            let refs = tracker.collection().models().iter().map(|m| m.key().to_value()).collect();
            properties.insert(key.clone(), Value::Array(refs));
        }
        for (key, embed) in data.embed_one.values() {
            properties.insert(key, embed.to_value());
        }
        for (key, collection) in &data.embed_many {
            let items = collection.models().iter().map(EmbeddedModel::to_value).collect();
            properties.insert(key.clone(), Value::Array(items));
        }
        Ok(properties)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Write pending changes back. No-op on a deleted model.
    pub fn save(&self) -> Result<(), StoreError> {
        if self.is_deleted() {
            return Ok(());
        }
        self.context()?.commit(self)
    }

    /// Mark for deletion and commit. Deleting a never-persisted model is an error.
    pub fn delete(&self) -> Result<(), StoreError> {
        if self.is_deleted() {
            return Ok(());
        }
        if self.is_new() {
            return Err(StoreError::transition(
                self.key(),
                "model was never persisted and cannot be deleted",
            ));
        }
        self.update_state(|state| state.deleting = true);
        self.context()?.commit(self)
    }

    /// Cancel a pending delete.
    pub fn restore(&self) -> Result<(), StoreError> {
        self.ensure_mutable()?;
        self.update_state(|state| state.deleting = false);
        Ok(())
    }

    /// Re-read from the backing store, dropping pending changes.
    pub fn reload(&self) -> Result<(), StoreError> {
        self.ensure_mutable()?;
        if self.is_new() {
            return Err(StoreError::transition(self.key(), "model was never persisted"));
        }
        self.context()?.reload(self)
    }
}
