use std::collections::HashMap;

use crate::model::{Model, ModelKey};

/// One model per `(type, id)` for the lifetime of a store. Never pruned.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    models: HashMap<ModelKey, Model>,
}

impl IdentityMap {
    pub(crate) fn get(&self, key: &ModelKey) -> Option<Model> {
        self.models.get(key).cloned()
    }

    /// First tracked model whose type is one of `type_keys`.
    pub(crate) fn find_any<'a>(
        &self,
        type_keys: impl IntoIterator<Item = &'a str>,
        id: &str,
    ) -> Option<Model> {
        type_keys
            .into_iter()
            .find_map(|type_key| self.get(&ModelKey::new(type_key, id)))
    }

    /// Track `model`, returning the instance already held for its key if there is one.
    pub(crate) fn register(&mut self, model: Model) -> Model {
        self.models
            .entry(model.key().clone())
            .or_insert(model)
            .clone()
    }

    pub(crate) fn contains(&self, key: &ModelKey) -> bool {
        self.models.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.models.len()
    }

    pub(crate) fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }
}
