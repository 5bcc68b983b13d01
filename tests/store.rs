//! Integration tests for the identity-map Store.

mod support;

use docmapper::model::ModelKey;
use docmapper::store::{Query, SortOrder};
use docmapper::{MetadataError, StoreError};
use serde_json::json;
use support::{props, store};

#[test]
fn find_returns_one_instance_per_record() {
    let (store, persister) = store();
    persister.seed("widgets", "widget", "5", json!({"name": "A"}));

    let first = store.find("widget", "5").unwrap();
    let second = store.find("widget", "5").unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(persister.count("retrieve"), 1);
    assert!(first.is_loaded());
    assert!(store.contains("widget", "5"));
    assert_eq!(store.len(), 1);
}

#[test]
fn find_missing_record() {
    let (store, _) = store();
    let err = store.find("widget", "404").unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { ref id, .. } if id == "404"));
    assert_eq!(err.status_code(), 404);
    assert!(!store.contains("widget", "404"));
}

#[test]
fn find_unknown_type() {
    let (store, _) = store();
    let err = store.find("ghost", "1").unwrap_err();
    assert!(matches!(err, StoreError::Metadata(MetadataError::SchemaNotFound(_))));
}

#[test]
fn find_resolves_polymorphic_records() {
    let (store, persister) = store();
    persister.seed("animals", "animal-cat", "1", json!({"name": "Tom", "lives": 9}));

    let animal = store.find("animal", "1").unwrap();
    assert_eq!(animal.type_key(), "animal-cat");
    assert_eq!(animal.get("lives").unwrap(), Some(json!(9)));

    let cat = store.find("animal-cat", "1").unwrap();
    let again = store.find("animal", "1").unwrap();
    assert!(cat.ptr_eq(&animal));
    assert!(again.ptr_eq(&animal));
    assert_eq!(persister.count("retrieve"), 1);

    let err = store.find("animal-dog", "1").unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { .. }));
}

#[test]
fn find_all_and_query_share_the_identity_map() {
    let (store, persister) = store();
    for (id, name, count) in [("1", "b", 3), ("2", "a", 1), ("3", "c", 2)] {
        persister.seed("widgets", "widget", id, json!({"name": name, "count": count}));
    }

    let one = store.find("widget", "1").unwrap();
    one.set("name", "pending").unwrap();

    let all = store.find_all("widget", None).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].ptr_eq(&one));
    assert_eq!(one.get("name").unwrap(), Some(json!("pending")));

    let some = store.find_all("widget", Some(&["3", "99"][..])).unwrap();
    assert_eq!(some.len(), 1);
    assert!(some[0].ptr_eq(&all[2]));

    let query = Query::new().sort("count", SortOrder::Desc).limit(2);
    let ids: Vec<_> = store
        .find_query("widget", &query)
        .unwrap()
        .iter()
        .map(|m| m.id().to_string())
        .collect();
    assert_eq!(ids, vec!["1", "3"]);

    let filtered = store.find_query("widget", &Query::new().filter("name", "a")).unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id(), "2");
}

#[test]
fn has_one_is_a_lazy_placeholder() {
    let (store, persister) = store();
    persister.seed("widgets", "widget", "1", json!({"owner": {"type": "person", "id": "9"}}));
    persister.seed("people", "person", "9", json!({"name": "Ada"}));

    let widget = store.find("widget", "1").unwrap();
    let owner = widget.has_one("owner").unwrap().unwrap();
    assert!(owner.state().empty);
    assert_eq!(persister.count("retrieve"), 1);

    assert_eq!(owner.get("name").unwrap(), Some(json!("Ada")));
    assert!(!owner.state().empty);
    assert!(owner.is_loaded());
    assert!(owner.ptr_eq(&store.find("person", "9").unwrap()));
    assert_eq!(persister.count("retrieve"), 2);
}

#[test]
fn reference_creates_placeholders() {
    let (store, persister) = store();
    persister.seed("people", "person", "9", json!({"name": "Ada"}));

    let person = store.reference("person", "9").unwrap();
    assert!(person.state().empty);
    assert_eq!(persister.count("retrieve"), 0);

    person.touch().unwrap();
    assert!(person.is_loaded());

    let missing = store.reference("person", "404").unwrap();
    assert!(matches!(missing.get("name").unwrap_err(), StoreError::RecordNotFound { .. }));
    assert!(missing.state().empty);
}

#[test]
fn references_through_a_polymorphic_root_share_the_tracked_model() {
    let (store, persister) = store();
    persister.seed("animals", "animal-cat", "c1", json!({"name": "Tom"}));
    persister.seed("animals", "animal-dog", "d1", json!({"name": "Rex"}));

    let found = store.find("animal", "c1").unwrap();
    let referenced = store.reference("animal", "c1").unwrap();
    assert!(referenced.ptr_eq(&found));
    assert!(referenced.ptr_eq(&store.find("animal-cat", "c1").unwrap()));
    assert_eq!(store.len(), 1);

    let dog = store.reference("animal", "d1").unwrap();
    assert_eq!(dog.type_key(), "animal-dog");
    assert!(dog.is_loaded());
    assert!(dog.ptr_eq(&store.find("animal-dog", "d1").unwrap()));
    assert_eq!(store.len(), 2);

    let missing = store.reference("animal", "404").unwrap();
    assert!(missing.state().empty);
}

#[test]
fn owning_collections_load_on_first_access() {
    let (store, persister) = store();
    persister.seed(
        "widgets",
        "widget",
        "1",
        json!({"parts": [{"type": "widget", "id": "2"}, {"type": "widget", "id": "3"}]}),
    );
    persister.seed("widgets", "widget", "2", json!({"name": "two"}));

    let widget = store.find("widget", "1").unwrap();
    assert_eq!(
        widget.has_many_keys("parts").unwrap(),
        vec![ModelKey::new("widget", "2"), ModelKey::new("widget", "3")]
    );
    assert_eq!(persister.count("all"), 0);

    let parts = store.load_collection(&widget, "parts").unwrap();
    assert_eq!(persister.count("all"), 1);
    assert_eq!(parts[0].get("name").unwrap(), Some(json!("two")));
    // Dangling reference stays a placeholder.
    assert!(parts[1].state().empty);

    widget.has_many("parts").unwrap();
    assert_eq!(persister.count("all"), 1);
}

#[test]
fn inverse_collections_query_by_foreign_key() {
    let (store, persister) = store();
    persister.seed("widgets", "widget", "1", json!({}));
    for (id, owner) in [("1", "1"), ("2", "1"), ("3", "2")] {
        persister.seed(
            "notes",
            "note",
            id,
            json!({"body": format!("note {id}"), "widget": {"type": "widget", "id": owner}}),
        );
    }

    let widget = store.find("widget", "1").unwrap();
    assert_eq!(persister.count("inverse"), 0);

    let notes = widget.has_many("notes").unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(persister.count("inverse"), 1);
    assert!(!widget.is_dirty());

    let back = notes[0].has_one("widget").unwrap().unwrap();
    assert!(back.ptr_eq(&widget));

    widget.has_many("notes").unwrap();
    assert_eq!(persister.count("inverse"), 1);

    let err = widget.push("notes", &notes[0]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidStateTransition { .. }));
    assert_eq!(err.status_code(), 409);
}

#[test]
fn create_registers_immediately() {
    let (store, persister) = store();

    let widget = store.create("widget", None).unwrap();
    assert_eq!(widget.id(), "1");
    assert_eq!(persister.count("generate_id"), 1);
    assert!(store.contains("widget", "1"));
    assert!(widget.ptr_eq(&store.find("widget", "1").unwrap()));
    assert_eq!(persister.count("retrieve"), 0);

    let named = store.create("widget", Some("w1")).unwrap();
    assert_eq!(named.id(), "w1");
    let err = store.create("widget", Some("w1")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidStateTransition { .. }));
}

#[test]
fn create_applies_defaults() {
    let (store, _) = store();
    let widget = store.create("widget", Some("w1")).unwrap();

    assert!(widget.is_new());
    assert!(widget.is_dirty());
    assert_eq!(widget.get("count").unwrap(), Some(json!(1)));
    assert_eq!(widget.get("active").unwrap(), Some(json!(true)));
    assert_eq!(widget.get("name").unwrap(), None);
    assert!(widget.change_set().attributes.contains_key("count"));
}

#[test]
fn created_models_are_dirty_without_defaults() {
    let (store, persister) = store();
    let person = store.create("person", Some("p1")).unwrap();
    let car = store.create("vehicle-car", Some("c1")).unwrap();

    for model in [&person, &car] {
        assert!(model.is_new());
        assert!(model.is_dirty());
        assert!(model.change_set().is_empty());
    }

    person.save().unwrap();
    assert_eq!(persister.count("create"), 1);
    assert!(!person.is_new());
    assert!(!person.is_dirty());
}

#[test]
fn abstract_types_cannot_be_created() {
    let (store, _) = store();
    let err = store.create("vehicle", None).unwrap_err();
    assert!(matches!(err, StoreError::AbstractType(ref t) if t == "vehicle"));
    assert!(store.is_empty());

    assert!(store.create("vehicle-car", None).is_ok());
}

#[test]
fn polymorphic_relationship_guard() {
    let (store, _) = store();
    let widget = store.create("widget", Some("w")).unwrap();
    let cat = store.create("animal-cat", Some("c")).unwrap();
    let dog = store.create("animal-dog", Some("d")).unwrap();
    let bird = store.create("bird", Some("b")).unwrap();

    let err = widget.set_has_one("pet", Some(&bird)).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRelationshipType { ref candidate, .. } if candidate == "bird"));
    assert_eq!(err.status_code(), 422);
    assert_eq!(widget.has_one("pet").unwrap(), None);

    widget.set_has_one("pet", Some(&cat)).unwrap();
    widget.set_has_one("pet", Some(&dog)).unwrap();
    assert!(widget.has_one("pet").unwrap().unwrap().ptr_eq(&dog));
}

#[test]
fn exact_type_relationship_guard() {
    let (store, _) = store();
    let widget = store.create("widget", Some("w")).unwrap();
    let person = store.create("person", Some("p")).unwrap();

    let err = widget.push("parts", &person).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRelationshipType { .. }));

    let meta = store.registry().resolve("widget").unwrap();
    let owner = meta.relationship("owner").unwrap();
    assert!(store.validate_relationship(owner, "person").is_ok());
    assert!(store.validate_relationship(owner, "bird").is_err());
}

#[test]
fn apply_resolves_references() {
    let (store, persister) = store();
    persister.seed("widgets", "widget", "1", json!({"name": "A"}));
    persister.seed("people", "person", "9", json!({"name": "Ada"}));

    let widget = store.find("widget", "1").unwrap();
    widget
        .apply(&props(json!({
            "type": "widget",
            "id": "1",
            "name": "B",
            "owner": {"type": "person", "id": "9"},
            "address": {"city": "Oslo"}
        })))
        .unwrap();

    let owner = widget.has_one("owner").unwrap().unwrap();
    assert_eq!(owner.get("name").unwrap(), Some(json!("Ada")));
    let changes = widget.change_set();
    assert_eq!(changes.has_one["owner"].new, Some(ModelKey::new("person", "9")));
    assert_eq!(changes.embed_one["address"].new, json!({"city": "Oslo"}));

    let err = widget
        .apply(&props(json!({"name": "C", "pet": {"type": "bird", "id": "1"}})))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRelationshipType { .. }));
    assert_eq!(widget.get("name").unwrap(), Some(json!("B")));
}

#[test]
fn stored_values_hydrate_as_stored() {
    let (store, persister) = store();
    persister.seed(
        "widgets",
        "widget",
        "1",
        json!({"count": "seven", "address": {"city": 7}}),
    );

    let widget = store.find("widget", "1").unwrap();
    assert_eq!(widget.get("count").unwrap(), Some(json!("seven")));
    let address = widget.embed_one("address").unwrap().unwrap();
    assert_eq!(address.get("city"), Some(&json!(7)));
    assert!(!widget.is_dirty());
}

#[test]
fn dropping_the_store_detaches_models() {
    let (store, persister) = store();
    persister.seed("widgets", "widget", "1", json!({"name": "A"}));
    let widget = store.find("widget", "1").unwrap();
    let placeholder = store.reference("person", "9").unwrap();
    drop(store);

    assert_eq!(widget.get("name").unwrap(), Some(json!("A")));
    assert!(matches!(placeholder.touch().unwrap_err(), StoreError::Detached(_)));
}
