use serde::Serialize;

/// Lifecycle flags of a model. `dirty` is not stored; it is derived from the trackers and
/// always holds while `new` is set.
///
/// ```text
/// empty -> loaded -> (new | deleting) -> deleted
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelState {
    /// Placeholder holding only identity.
    pub empty: bool,
    pub loaded: bool,
    /// Created in this unit of work and not yet persisted.
    pub new: bool,
    /// Marked for deletion, pending commit.
    pub deleting: bool,
    /// Terminal.
    pub deleted: bool,
}

impl ModelState {
    pub fn placeholder() -> Self {
        ModelState {
            empty: true,
            ..ModelState::default()
        }
    }

    pub fn created() -> Self {
        ModelState {
            loaded: true,
            new: true,
            ..ModelState::default()
        }
    }

    pub fn mark_loaded(&mut self) {
        self.empty = false;
        self.loaded = true;
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.deleting = false;
        self.new = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        let mut state = ModelState::placeholder();
        assert!(state.empty && !state.loaded);

        state.mark_loaded();
        assert!(!state.empty && state.loaded);

        state.deleting = true;
        state.mark_deleted();
        assert!(state.deleted && !state.deleting);
    }

    #[test]
    fn created_is_loaded_and_new() {
        let state = ModelState::created();
        assert!(state.loaded && state.new && !state.empty);
    }
}
