use super::{Change, Model};

/// Original/added/removed tracker for multi-valued fields.
///
/// `models` is always `(original - removed) + added`, and `added` and `removed` never share
/// a member.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    original: Vec<T>,
    models: Vec<T>,
    added: Vec<T>,
    removed: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            original: Vec::new(),
            models: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_original(original: Vec<T>) -> Self {
        Collection {
            models: original.clone(),
            original,
            ..Collection::default()
        }
    }

    pub fn models(&self) -> &[T] {
        &self.models
    }

    pub fn original(&self) -> &[T] {
        &self.original
    }

    pub fn added(&self) -> &[T] {
        &self.added
    }

    pub fn removed(&self) -> &[T] {
        &self.removed
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.models.contains(item)
    }

    pub fn push(&mut self, item: T) {
        if let Some(pos) = self.removed.iter().position(|m| *m == item) {
            self.removed.remove(pos);
            self.models.push(item);
            return;
        }
        if self.models.contains(&item) {
            return;
        }
        self.added.push(item.clone());
        self.models.push(item);
    }

    pub fn remove(&mut self, item: &T) {
        let Some(pos) = self.models.iter().position(|m| m == item) else {
            return;
        };
        let item = self.models.remove(pos);

        if let Some(pos) = self.added.iter().position(|m| *m == item) {
            self.added.remove(pos);
        } else {
            self.removed.push(item);
        }
    }

    /// Empty the live view; every original member is marked removed.
    pub fn clear(&mut self) {
        self.models.clear();
        self.added.clear();
        self.removed = self.original.clone();
    }

    pub fn rollback(&mut self) {
        self.models = self.original.clone();
        self.added.clear();
        self.removed.clear();
    }

    /// Replace the original members and drop pending changes.
    pub fn reset(&mut self, original: Vec<T>) {
        self.original = original;
        self.rollback();
    }

    pub fn is_dirty(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn change_set(&self) -> Option<Change<Vec<T>>> {
        self.is_dirty()
            .then(|| Change::new(self.original.clone(), self.models.clone()))
    }
}

/// Tracker for a has-many relationship.
///
/// Owning collections start from the references stored on the owner. Inverse collections are
/// backed by a foreign key on the related type; they are read-only and stay unloaded until
/// first materialised.
#[derive(Debug, Clone)]
pub struct HasMany {
    inverse: bool,
    loaded: bool,
    collection: Collection<Model>,
}

impl HasMany {
    pub fn owning(original: Vec<Model>) -> Self {
        HasMany {
            inverse: false,
            loaded: false,
            collection: Collection::with_original(original),
        }
    }

    pub fn inverse() -> Self {
        HasMany {
            inverse: true,
            loaded: false,
            collection: Collection::new(),
        }
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn collection(&self) -> &Collection<Model> {
        &self.collection
    }

    /// Owning members still holding identity only.
    pub fn placeholders(&self) -> Vec<Model> {
        self.collection
            .models()
            .iter()
            .filter(|m| m.state().empty)
            .cloned()
            .collect()
    }

    /// Whether the next read needs a round trip.
    pub fn needs_load(&self) -> bool {
        !self.loaded
    }

    /// Install the materialised members. Inverse members become the original set.
    pub(crate) fn loaded_with(&mut self, members: Vec<Model>) {
        if self.inverse {
            self.collection.reset(members);
        }
        self.loaded = true;
    }

    pub(crate) fn collection_mut(&mut self) -> Option<&mut Collection<Model>> {
        (!self.inverse).then_some(&mut self.collection)
    }

    pub fn is_dirty(&self) -> bool {
        !self.inverse && self.collection.is_dirty()
    }

    pub fn rollback(&mut self) {
        self.collection.rollback();
    }
}
