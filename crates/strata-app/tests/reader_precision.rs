use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use strata_app::{Api, ApiContext, ApiItem, ApiOptions, FineGrainedReader, MutationConfig, QuerySpec};
use strata_core::{
    ApiMethod, EndpointRef, EntryKind, EntryPath, MutationEntry, MutationField, QueryEntry,
    QueryField, ResultStore,
};
use strata_testkit::{init_tracing, FixedClock, MockTransport};

fn loaded(data: Value) -> QueryEntry {
    QueryEntry::default().succeed(data, 1)
}

#[test]
fn unrelated_write_raises_no_signal() {
    let store = ResultStore::shared();
    store.queries().set_one("default", "x", loaded(json!({"n": 1})));
    store.queries().set_one("default", "y", QueryEntry::default());
    let reader = FineGrainedReader::new(store.clone(), "default");
    let mut signal = reader.subscribe();

    assert_eq!(reader.get(EntryKind::Query, "x.data", None), Some(json!({"n": 1})));

    store.queries().set_one("default", "y", QueryEntry::default().start_fetch(false));
    assert!(!reader.sync());
    assert!(!signal.has_changed().unwrap());

    store.queries().set_one("default", "x", loaded(json!({"n": 2})));
    assert!(reader.sync());
    assert!(signal.has_changed().unwrap());
    assert_eq!(*signal.borrow_and_update(), 1);
    assert_eq!(reader.get(EntryKind::Query, "x.data.n", None), Some(json!(2)));
}

#[test]
fn default_substitution_rules() {
    let store = ResultStore::shared();
    store.mutations().set_one("default", "existingKey", MutationEntry::default());
    let reader = FineGrainedReader::new(store, "default");

    assert_eq!(reader.get(EntryKind::Query, "missingKey.isLoading", None), Some(json!(false)));
    assert_eq!(
        reader.get(EntryKind::Mutation, "existingKey.deeplyMissing", Some(json!("fallback"))),
        Some(json!("fallback"))
    );
    assert_eq!(
        reader.get_path(&EntryPath::mutation("missingKey", MutationField::IsIdle), None),
        Some(json!(true))
    );
}

#[tokio::test]
async fn reader_follows_api_transitions() {
    init_tracing();
    let transport = Arc::new(MockTransport::new());
    transport.on("http://localhost:3000/items", Ok(json!([1, 2])));
    let ctx = ApiContext::builder()
        .transport(transport)
        .clock(Arc::new(FixedClock::default()))
        .build()
        .unwrap();
    let api = Api::new(
        ctx,
        vec![
            ApiItem::Query(QuerySpec::new("items", EndpointRef::new("api", "items"))),
            ApiItem::mutation("save", MutationConfig::new(EndpointRef::new("api", "items"), ApiMethod::Put)),
        ],
        ApiOptions::scope("inventory"),
    );
    let reader = api.reader();
    assert_eq!(reader.get_path(&EntryPath::query("items", QueryField::Data), None), None);
    assert_eq!(
        reader.get_path(&EntryPath::mutation("save", MutationField::Status), None),
        Some(json!("idle"))
    );

    api.start().await;
    assert!(reader.sync());
    assert_eq!(
        reader.get_path(&EntryPath::query("items", QueryField::Data).index(1), None),
        Some(json!(2))
    );

    api.mutate("save", json!({"id": 1})).await.unwrap();
    assert!(reader.sync());
    assert_eq!(
        reader.get_path(&EntryPath::mutation("save", MutationField::Variables).key("id"), None),
        Some(json!(1))
    );
    assert!(!reader.sync());
}

proptest! {
    #[test]
    fn writes_to_other_scopes_never_signal(
        writes in prop::collection::vec(("[a-c]", "[a-z]{1,4}", any::<i64>()), 1..20)
    ) {
        let store = ResultStore::shared();
        store.queries().set_one("watched", "x", loaded(json!(0)));
        let reader = FineGrainedReader::new(store.clone(), "watched");
        reader.get(EntryKind::Query, "x.data", None);

        for (scope, key, n) in writes {
            store.queries().set_one(&scope, &key, loaded(json!(n)));
            prop_assert!(!reader.sync());
        }
        prop_assert_eq!(reader.version(), 0);
    }
}
