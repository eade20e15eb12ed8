//! Result store
//!
//! Two process-wide tables, one for query entries and one for mutation
//! entries, keyed by [`CompositeKey`](crate::key::CompositeKey) strings.
//!
//! Each table holds an immutable `Arc<BTreeMap>` snapshot. Every write builds
//! the next map and swaps the `Arc` under the write lock, so a reader either
//! sees the whole previous snapshot or the whole next one, never a partially
//! replaced scope. Each swap bumps the table version and the store-wide
//! revision channel that readers wait on.
//!
//! The store is constructed once by the host and shared through `Arc`;
//! there is no global instance.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::entry::{EntryKind, MutationEntry, QueryEntry};
use crate::errors::Result;
use crate::key;

/// Immutable snapshot of one table.
pub type Snapshot<E> = Arc<BTreeMap<String, E>>;

/// One composite-keyed table.
pub struct Table<E> {
    kind: EntryKind,
    entries: RwLock<Snapshot<E>>,
    version: AtomicU64,
    revision: Arc<watch::Sender<u64>>,
}

impl<E: Clone + Serialize> Table<E> {
    fn new(kind: EntryKind, revision: Arc<watch::Sender<u64>>) -> Self {
        Self {
            kind,
            entries: RwLock::new(Arc::new(BTreeMap::new())),
            version: AtomicU64::new(0),
            revision,
        }
    }

    /// Which table this is.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// The whole table.
    pub fn snapshot(&self) -> Snapshot<E> {
        self.entries.read().clone()
    }

    /// Number of writes applied so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// One entry by scope and logical key.
    pub fn get(&self, scope: &str, key: &str) -> Option<E> {
        self.entries.read().get(&key::make(scope, key)).cloned()
    }

    /// Entries of `scope`, keyed by logical key.
    pub fn scoped(&self, scope: &str) -> BTreeMap<String, E> {
        key::scoped_view(&self.snapshot(), scope)
    }

    /// JSON object of the scoped view, for path resolution.
    pub fn scoped_value(&self, scope: &str) -> Value {
        let mut object = Map::new();
        for (logical, entry) in self.scoped(scope) {
            match serde_json::to_value(&entry) {
                Ok(value) => {
                    object.insert(logical, value);
                }
                Err(e) => {
                    tracing::warn!(kind = %self.kind, key = %logical, error = %e, "entry not serializable");
                }
            }
        }
        Value::Object(object)
    }

    /// Overwrite a single composite key, leaving every other key untouched.
    pub fn set_one(&self, scope: &str, key: &str, entry: E) {
        let composite = key::make(scope, key);
        self.commit(|current| {
            let mut next = current.clone();
            next.insert(composite, entry);
            next
        });
    }

    /// Read-modify-write of one composite key under a single lock.
    pub fn update_one<F>(&self, scope: &str, key: &str, f: F)
    where
        F: FnOnce(Option<&E>) -> E,
    {
        let composite = key::make(scope, key);
        self.commit(|current| {
            let mut next = current.clone();
            let entry = f(current.get(&composite));
            next.insert(composite, entry);
            next
        });
    }

    /// Replace every entry of `scope` with `entries` in one step.
    pub fn set_scope(&self, scope: &str, entries: BTreeMap<String, E>) {
        self.commit(|current| key::replace_scoped_view(current, scope, entries));
    }

    /// Replace the whole table.
    pub fn replace_all(&self, entries: BTreeMap<String, E>) {
        self.commit(|_| entries);
    }

    fn commit<F>(&self, build: F)
    where
        F: FnOnce(&BTreeMap<String, E>) -> BTreeMap<String, E>,
    {
        let mut guard = self.entries.write();
        let next = build(&**guard);
        let len = next.len();
        *guard = Arc::new(next);
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        drop(guard);

        self.revision.send_modify(|r| *r += 1);
        tracing::debug!(kind = %self.kind, version, entries = len, "store table updated");
    }
}

impl<E: Clone + Serialize + DeserializeOwned> Table<E> {
    /// Serialize the whole table as `{ compositeKey -> entry }` JSON.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.snapshot())?)
    }

    /// Replace the table from `{ compositeKey -> entry }` JSON.
    pub fn hydrate_json(&self, json: &str) -> Result<usize> {
        let entries: BTreeMap<String, E> = serde_json::from_str(json)?;
        let count = entries.len();
        self.replace_all(entries);
        Ok(count)
    }
}

/// The two result tables plus a shared change channel.
pub struct ResultStore {
    queries: Table<QueryEntry>,
    mutations: Table<MutationEntry>,
    revision: Arc<watch::Sender<u64>>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        let revision = Arc::new(tx);
        Self {
            queries: Table::new(EntryKind::Query, revision.clone()),
            mutations: Table::new(EntryKind::Mutation, revision.clone()),
            revision,
        }
    }

    /// Create an empty store behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The query table.
    pub fn queries(&self) -> &Table<QueryEntry> {
        &self.queries
    }

    /// The mutation table.
    pub fn mutations(&self) -> &Table<MutationEntry> {
        &self.mutations
    }

    /// JSON object of the scoped view of either table.
    pub fn scoped_value(&self, kind: EntryKind, scope: &str) -> Value {
        match kind {
            EntryKind::Query => self.queries.scoped_value(scope),
            EntryKind::Mutation => self.mutations.scoped_value(scope),
        }
    }

    /// Total writes across both tables.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver notified after every write to either table.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Persisted form of the query table.
    pub fn export_queries(&self) -> Result<String> {
        self.queries.export_json()
    }

    /// Restore the query table from its persisted form.
    ///
    /// Rehydrated entries carry no refetch handle.
    pub fn hydrate_queries(&self, json: &str) -> Result<usize> {
        let count = self.queries.hydrate_json(json)?;
        tracing::debug!(entries = count, "query table rehydrated");
        Ok(count)
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("queries", &self.queries.snapshot().len())
            .field("mutations", &self.mutations.snapshot().len())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MutationStatus;
    use serde_json::json;

    fn success(data: Value) -> QueryEntry {
        QueryEntry::default().succeed(data, 1)
    }

    #[test]
    fn test_set_one_leaves_other_keys() {
        let store = ResultStore::new();
        store.queries().set_one("a", "x", success(json!(1)));
        store.queries().set_one("a", "y", success(json!(2)));
        store.queries().set_one("a", "x", success(json!(3)));

        let view = store.queries().scoped("a");
        assert_eq!(view["x"].data, Some(json!(3)));
        assert_eq!(view["y"].data, Some(json!(2)));
    }

    #[test]
    fn test_scope_isolation() {
        let store = ResultStore::new();
        store.queries().set_one("B", "x", success(json!("b")));
        let before = store.queries().scoped("B");

        store.queries().set_one("A", "x", success(json!("a")));
        store.queries().set_scope("A", BTreeMap::from([("z".to_string(), success(json!(0)))]));

        assert_eq!(store.queries().scoped("B"), before);
        assert!(!store.queries().scoped("B").contains_key("z"));
    }

    #[test]
    fn test_set_scope_empty_removes_only_that_scope() {
        let store = ResultStore::new();
        store.mutations().set_one("A", "m1", MutationEntry::default());
        store.mutations().set_one("A", "m2", MutationEntry::default());
        store.mutations().set_one("B", "m1", MutationEntry::default());

        store.mutations().set_scope("A", BTreeMap::new());

        assert!(store.mutations().scoped("A").is_empty());
        assert_eq!(store.mutations().scoped("B").len(), 1);
    }

    #[test]
    fn test_revision_bumps_on_every_write() {
        let store = ResultStore::new();
        let rx = store.subscribe();
        assert_eq!(store.revision(), 0);

        store.queries().set_one("a", "x", QueryEntry::default());
        store.mutations().set_one("a", "m", MutationEntry::default());

        assert_eq!(store.revision(), 2);
        assert_eq!(store.queries().version(), 1);
        assert_eq!(store.mutations().version(), 1);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_snapshot_is_stable_across_writes() {
        let store = ResultStore::new();
        store.queries().set_one("a", "x", success(json!(1)));
        let snapshot = store.queries().snapshot();
        store.queries().set_scope("a", BTreeMap::new());
        assert_eq!(snapshot.len(), 1);
        assert!(store.queries().snapshot().is_empty());
    }

    #[test]
    fn test_scoped_value_shape() {
        let store = ResultStore::new();
        store.mutations().set_one(
            "s",
            "create",
            MutationEntry {
                status: MutationStatus::Success,
                data: Some(json!({"id": 1})),
                ..MutationEntry::default()
            },
        );
        let value = store.scoped_value(EntryKind::Mutation, "s");
        assert_eq!(value["create"]["isSuccess"], true);
        assert_eq!(value["create"]["data"]["id"], 1);
    }

    #[test]
    fn test_export_and_hydrate_queries() {
        let store = ResultStore::new();
        store.queries().set_one("a", "x", success(json!({"n": 1})));
        let json = store.export_queries().unwrap();
        assert!(json.contains("\"a:x\""));

        let restored = ResultStore::new();
        assert_eq!(restored.hydrate_queries(&json).unwrap(), 1);
        let entry = restored.queries().get("a", "x").unwrap();
        assert_eq!(entry.data, Some(json!({"n": 1})));
        assert!(entry.refetch.is_none());
    }
}
