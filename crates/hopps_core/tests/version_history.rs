use hopps_core::{
    GetSelector, Selector, StoreConfig, StoreError, VersionedStore, MAX_PAYLOAD_DEPTH,
};
use serde_json::{json, Value};
use std::thread::sleep;
use std::time::Duration;
use uuid::Uuid;

fn memory_store() -> VersionedStore<hopps_core::SqliteDocumentStore> {
    VersionedStore::open_in_memory(StoreConfig::default()).unwrap()
}

fn nested_object(depth: usize) -> Value {
    (0..depth).fold(json!("leaf"), |inner, _| json!({ "child": inner }))
}

#[test]
fn save_then_get_walks_version_history() {
    let store = memory_store();

    let first = store
        .save("foo", "K1", json!({"name": "Bob", "n": 42}))
        .unwrap();
    let second = store
        .save("foo", "K1", json!({"name": "Bob", "n": 43}))
        .unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);

    let latest = store.get("foo", "K1", Selector::Latest).unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.payload, json!({"name": "Bob", "n": 43}));

    let original = store.get("foo", "K1", Selector::Version(1)).unwrap();
    assert_eq!(original.payload, json!({"name": "Bob", "n": 42}));
    assert_eq!(original.collection, "foo");
    assert_eq!(original.key, "K1");
}

#[test]
fn latest_round_trips_nested_payload() {
    let store = memory_store();
    let key = Uuid::new_v4().to_string();
    let payload = json!({
        "_id": key,
        "profile": {"name": "Ada", "langs": ["en", "fr"], "age": 36},
        "scores": [1.5, -2, null, true],
        "empty": {}
    });

    let receipt = store.save("people", &key, payload.clone()).unwrap();
    let latest = store.get("people", &key, Selector::Latest).unwrap();

    assert!(latest.version >= receipt.version);
    assert_eq!(latest.payload, payload);
    assert_eq!(latest.created_at, receipt.created_at);
}

#[test]
fn at_version_outside_range_is_not_found() {
    let store = memory_store();
    for n in 0..3 {
        store.save("foo", "K1", json!({ "n": n })).unwrap();
    }

    for version in 1..=3 {
        let record = store.get("foo", "K1", Selector::Version(version)).unwrap();
        assert_eq!(record.payload, json!({ "n": version - 1 }));
    }

    let err = store.get("foo", "K1", Selector::Version(4)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            version: Some(4),
            ..
        }
    ));
}

#[test]
fn versions_beyond_storable_range_are_not_found() {
    let store = memory_store();
    store.save("foo", "K1", json!({"n": 1})).unwrap();

    for version in [i64::MAX as u64 + 1, u64::MAX] {
        let err = store
            .get("foo", "K1", Selector::Version(version))
            .unwrap_err();
        assert!(err.is_not_found(), "version {version} gave {err}");
    }
}

#[test]
fn deepest_allowed_payload_round_trips() {
    let store = memory_store();
    let payload = nested_object(MAX_PAYLOAD_DEPTH);

    store.save("foo", "deep", payload.clone()).unwrap();

    let latest = store.get("foo", "deep", Selector::Latest).unwrap();
    assert_eq!(latest.payload, payload);
    assert_eq!(store.history("foo", "deep", None, 0).unwrap().items.len(), 1);
}

#[test]
fn over_nested_payload_is_rejected_before_any_write() {
    let store = memory_store();

    for depth in [MAX_PAYLOAD_DEPTH + 1, 200] {
        let err = store
            .save("foo", "deep", nested_object(depth))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)), "depth {depth}");
    }

    assert!(store.collections().unwrap().is_empty());
    assert!(store
        .get("foo", "deep", Selector::Latest)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn get_unknown_key_is_not_found_without_side_effects() {
    let store = memory_store();

    let err = store
        .get("foo", "unknown-key", Selector::Latest)
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(store.collections().unwrap().is_empty());
    assert_eq!(store.registry().cached_len(), 0);
    assert!(store
        .history("foo", "unknown-key", None, 0)
        .unwrap()
        .items
        .is_empty());
    assert_eq!(store.version_count("foo", "unknown-key").unwrap(), 0);
    assert!(store.collections().unwrap().is_empty());
}

#[test]
fn unknown_key_in_existing_collection_is_not_found() {
    let store = memory_store();
    store.save("foo", "K1", json!(1)).unwrap();

    let err = store.get("foo", "K9", Selector::Latest).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.collections().unwrap(), vec!["foo".to_string()]);
}

#[test]
fn as_of_returns_version_effective_at_instant() {
    let store = memory_store();
    let first = store.save("foo", "K1", json!({"n": 1})).unwrap();
    sleep(Duration::from_millis(5));
    let second = store.save("foo", "K1", json!({"n": 2})).unwrap();
    assert!(second.created_at > first.created_at);

    let before = store.get_as_of("foo", "K1", first.created_at - 1).unwrap_err();
    assert!(before.is_not_found());

    let at_first = store.get_as_of("foo", "K1", first.created_at).unwrap();
    assert_eq!(at_first.version, 1);
    let between = store.get_as_of("foo", "K1", second.created_at - 1).unwrap();
    assert_eq!(between.version, 1);
    let at_second = store.get_as_of("foo", "K1", second.created_at).unwrap();
    assert_eq!(at_second.version, 2);

    let again = store.get_as_of("foo", "K1", second.created_at - 1).unwrap();
    assert_eq!(again, between);
}

#[test]
fn blank_identifiers_are_invalid_arguments() {
    let store = memory_store();

    for (collection, key) in [("", "K1"), ("foo", ""), ("  ", "K1"), ("foo", "\t")] {
        let save_err = store.save(collection, key, json!({})).unwrap_err();
        assert!(matches!(save_err, StoreError::InvalidArgument(_)));

        let get_err = store.get(collection, key, Selector::Latest).unwrap_err();
        assert!(matches!(get_err, StoreError::InvalidArgument(_)));
    }
    assert!(store.collections().unwrap().is_empty());
}

#[test]
fn wire_selector_requests_resolve_like_typed_ones() {
    let store = memory_store();
    store.save("foo", "K1", json!("a")).unwrap();
    store.save("foo", "K1", json!("b")).unwrap();

    let by_version: GetSelector = serde_json::from_value(json!({"version": 1})).unwrap();
    assert_eq!(
        store.get_request("foo", "K1", by_version).unwrap().payload,
        json!("a")
    );

    let latest: GetSelector = serde_json::from_value(json!({})).unwrap();
    assert_eq!(
        store.get_request("foo", "K1", latest).unwrap().payload,
        json!("b")
    );

    let malformed: GetSelector = serde_json::from_value(json!({"version": -1})).unwrap();
    let err = store.get_request("foo", "K1", malformed).unwrap_err();
    assert_eq!(err.code(), "invalid");
}

#[test]
fn history_lists_versions_newest_first_with_paging() {
    let store = memory_store();
    for n in 1..=12 {
        store.save("foo", "K1", json!({ "n": n })).unwrap();
    }

    let first_page = store.history("foo", "K1", None, 0).unwrap();
    assert_eq!(first_page.applied_limit, 10);
    assert_eq!(first_page.items.len(), 10);
    assert_eq!(first_page.items[0].version, 12);

    let tail = store.history("foo", "K1", Some(5), 10).unwrap();
    let versions: Vec<_> = tail.items.iter().map(|item| item.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(store.version_count("foo", "K1").unwrap(), 12);
}

#[test]
fn collections_are_isolated_namespaces() {
    let store = memory_store();
    store.save("foo", "K1", json!("foo-1")).unwrap();
    store.save("bar", "K1", json!("bar-1")).unwrap();
    store.save("bar", "K1", json!("bar-2")).unwrap();

    assert_eq!(store.get("foo", "K1", Selector::Latest).unwrap().version, 1);
    assert_eq!(store.get("bar", "K1", Selector::Latest).unwrap().version, 2);
    assert_eq!(
        store.collections().unwrap(),
        vec!["bar".to_string(), "foo".to_string()]
    );
}

#[test]
fn history_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hopps.db");

    {
        let store = VersionedStore::open(&path, StoreConfig::default()).unwrap();
        store.save("foo", "K1", json!({"n": 1})).unwrap();
        store.save("foo", "K1", json!({"n": 2})).unwrap();
    }

    let reopened = VersionedStore::open(&path, StoreConfig::default()).unwrap();
    assert_eq!(
        reopened.get("foo", "K1", Selector::Version(1)).unwrap().payload,
        json!({"n": 1})
    );
    let third = reopened.save("foo", "K1", json!({"n": 3})).unwrap();
    assert_eq!(third.version, 3);
}
