use std::collections::{BTreeMap, BTreeSet};

use super::Change;

/// Original-vs-current tracker for single-valued fields.
///
/// `original` is the snapshot from the last load; `current` holds pending overrides and
/// `remove` the keys pending a null-out. A key is never in both `current` and `remove`.
#[derive(Debug, Clone)]
pub struct Properties<T> {
    original: BTreeMap<String, T>,
    current: BTreeMap<String, T>,
    remove: BTreeSet<String>,
}

impl<T> Default for Properties<T> {
    fn default() -> Self {
        Properties {
            original: BTreeMap::new(),
            current: BTreeMap::new(),
            remove: BTreeSet::new(),
        }
    }
}

impl<T: Clone + PartialEq> Properties<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_original(original: BTreeMap<String, T>) -> Self {
        Properties {
            original,
            ..Properties::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        if self.remove.contains(key) {
            return None;
        }
        self.current.get(key).or_else(|| self.original.get(key))
    }

    pub fn original(&self, key: &str) -> Option<&T> {
        self.original.get(key)
    }

    /// Set a value; `None` is a removal. Setting the original value back cancels the change.
    pub fn set(&mut self, key: &str, value: Option<T>) {
        let Some(value) = value else {
            self.remove(key);
            return;
        };

        self.remove.remove(key);
        if self.original.get(key) == Some(&value) {
            self.current.remove(key);
        } else {
            self.current.insert(key.to_string(), value);
        }
    }

    /// Queue a removal. Removing a field that had no original value records nothing.
    pub fn remove(&mut self, key: &str) {
        self.current.remove(key);
        if self.original.contains_key(key) {
            self.remove.insert(key.to_string());
        }
    }

    pub fn rollback(&mut self) {
        self.current.clear();
        self.remove.clear();
    }

    /// Replace the original snapshot and drop pending changes.
    pub fn reset(&mut self, original: BTreeMap<String, T>) {
        self.original = original;
        self.rollback();
    }

    pub fn are_dirty(&self) -> bool {
        !self.current.is_empty() || !self.remove.is_empty()
    }

    /// Every changed key, sorted.
    pub fn change_set(&self) -> BTreeMap<String, Change<Option<T>>> {
        self.current
            .keys()
            .chain(self.remove.iter())
            .map(|key| {
                let change = Change::new(self.original.get(key).cloned(), self.get(key).cloned());
                (key.clone(), change)
            })
            .collect()
    }

    /// The merged current view, pending changes applied.
    pub fn values(&self) -> BTreeMap<String, T> {
        let mut values: BTreeMap<String, T> = self
            .original
            .iter()
            .filter(|(key, _)| !self.remove.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in &self.current {
            values.insert(key.clone(), value.clone());
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> Properties<String> {
        Properties::with_original(BTreeMap::from([("name".to_string(), "A".to_string())]))
    }

    #[test]
    fn dirty_cycle() {
        let mut props = tracker();

        props.set("name", Some("B".into()));
        assert!(props.are_dirty());
        assert_eq!(
            props.change_set(),
            BTreeMap::from([(
                "name".to_string(),
                Change::new(Some("A".to_string()), Some("B".to_string()))
            )])
        );

        props.set("name", Some("A".into()));
        assert!(!props.are_dirty());
        assert!(props.change_set().is_empty());

        props.set("name", Some("B".into()));
        props.rollback();
        assert_eq!(props.get("name").map(String::as_str), Some("A"));
        assert!(!props.are_dirty());
    }

    #[test]
    fn none_is_removal() {
        let mut props = tracker();
        props.set("name", None);
        assert_eq!(props.get("name"), None);
        assert_eq!(
            props.change_set()["name"],
            Change::new(Some("A".to_string()), None)
        );

        props.set("name", Some("A".into()));
        assert!(!props.are_dirty());
    }

    #[test]
    fn removing_absent_field_is_not_a_change() {
        let mut props = tracker();
        props.remove("nickname");
        assert!(!props.are_dirty());

        props.set("nickname", Some("Al".into()));
        props.remove("nickname");
        assert!(!props.are_dirty());
        assert_eq!(props.get("nickname"), None);
    }

    #[test]
    fn override_and_removal_are_exclusive() {
        let mut props = tracker();
        props.remove("name");
        props.set("name", Some("C".into()));
        assert_eq!(props.get("name").map(String::as_str), Some("C"));
        assert_eq!(props.change_set().len(), 1);
    }

    #[test]
    fn change_set_is_sorted() {
        let mut props = Properties::<i32>::new();
        props.set("zeta", Some(1));
        props.set("alpha", Some(2));
        props.set("mid", Some(3));
        let keys: Vec<_> = props.change_set().into_keys().collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn reset_replaces_original() {
        let mut props = tracker();
        props.set("name", Some("B".into()));
        props.reset(BTreeMap::from([("name".to_string(), "B".to_string())]));
        assert!(!props.are_dirty());
        assert_eq!(props.values()["name"], "B");
    }
}
