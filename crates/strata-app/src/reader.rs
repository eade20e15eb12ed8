//! Fine-grained reader
//!
//! Reads paths out of one scope's view of the [`ResultStore`] and remembers
//! the value it returned for each path. After a store write, [`sync`]
//! re-resolves every remembered path and raises a single change signal only
//! when at least one of them resolved to a different value. Writes that
//! touch nothing this reader has read are invisible to it.
//!
//! Resolution rules:
//! - a missing first segment walks into the default entry of the table
//! - a missing deeper segment resolves to nothing
//! - the caller's default replaces a missing or `null` final value
//!
//! [`sync`]: FineGrainedReader::sync

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strata_core::{EntryKind, EntryPath, ResultStore, ValuePath};
use tokio::sync::watch;

struct Observed {
    path: EntryPath,
    default: Option<Value>,
    last: Option<Value>,
}

/// Path reader over one scope of a store.
pub struct FineGrainedReader {
    store: Arc<ResultStore>,
    scope: String,
    observed: Mutex<BTreeMap<String, Observed>>,
    version: AtomicU64,
    signal: watch::Sender<u64>,
}

impl FineGrainedReader {
    pub fn new(store: Arc<ResultStore>, scope: impl Into<String>) -> Self {
        let (signal, _) = watch::channel(0);
        Self {
            store,
            scope: scope.into(),
            observed: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            signal,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Read `path` (dot/bracket syntax) from the `kind` table.
    pub fn get(&self, kind: EntryKind, path: &str, default: Option<Value>) -> Option<Value> {
        self.get_path(
            &EntryPath {
                kind,
                path: ValuePath::parse(path),
            },
            default,
        )
    }

    /// Read a typed path.
    pub fn get_path(&self, path: &EntryPath, default: Option<Value>) -> Option<Value> {
        let value = self.resolve(path, default.as_ref());
        self.observed.lock().insert(
            path.subscription_id(),
            Observed {
                path: path.clone(),
                default,
                last: value.clone(),
            },
        );
        value
    }

    /// Read a typed path and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, path: &EntryPath) -> Option<T> {
        let value = self.get_path(path, None)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::debug!(path = %path.subscription_id(), error = %e, "path value has unexpected shape");
                None
            }
        }
    }

    /// Re-resolve every observed path. Returns true, and raises one change
    /// signal, when any of them changed.
    pub fn sync(&self) -> bool {
        let changed = {
            let mut observed = self.observed.lock();
            let mut changed = 0usize;
            for entry in observed.values_mut() {
                let current = self.resolve(&entry.path, entry.default.as_ref());
                if current != entry.last {
                    entry.last = current;
                    changed += 1;
                }
            }
            changed
        };
        if changed == 0 {
            return false;
        }

        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.signal.send_replace(version);
        tracing::debug!(scope = %self.scope, version, paths = changed, "reader paths changed");
        true
    }

    /// Wait until a store write changes an observed path.
    pub async fn changed(&self) {
        let mut revisions = self.store.subscribe();
        if self.sync() {
            return;
        }
        while revisions.changed().await.is_ok() {
            if self.sync() {
                return;
            }
        }
    }

    /// Number of change signals raised so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Receiver of the change signal.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.signal.subscribe()
    }

    /// Stop observing `path`.
    pub fn unsubscribe(&self, path: &EntryPath) -> bool {
        self.observed.lock().remove(&path.subscription_id()).is_some()
    }

    /// Stop observing every path.
    pub fn clear(&self) {
        self.observed.lock().clear();
    }

    /// Ids of the observed paths.
    pub fn observed(&self) -> Vec<String> {
        self.observed.lock().keys().cloned().collect()
    }

    fn resolve(&self, path: &EntryPath, default: Option<&Value>) -> Option<Value> {
        let view = self.store.scoped_value(path.kind, &self.scope);
        let default_root = path.kind.default_value();
        match path.path.resolve(&view, Some(&default_root)) {
            None | Some(Value::Null) => default.cloned(),
            Some(value) => Some(value.clone()),
        }
    }
}

impl std::fmt::Debug for FineGrainedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FineGrainedReader")
            .field("scope", &self.scope)
            .field("observed", &self.observed.lock().len())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{MutationEntry, MutationField, MutationStatus, QueryEntry, QueryField};

    fn loaded(data: Value) -> QueryEntry {
        QueryEntry::default().succeed(data, 1)
    }

    #[test]
    fn test_default_substitution_at_root_only() {
        let store = ResultStore::shared();
        store.mutations().set_one("s", "save", MutationEntry::default());
        let reader = FineGrainedReader::new(store, "s");

        assert_eq!(reader.get(EntryKind::Query, "missingKey.isLoading", None), Some(json!(false)));
        assert_eq!(
            reader.get(EntryKind::Mutation, "missingKey.status", None),
            Some(json!("idle"))
        );
        assert_eq!(
            reader.get(EntryKind::Mutation, "save.deeplyMissing", Some(json!("fallback"))),
            Some(json!("fallback"))
        );
        assert_eq!(reader.get(EntryKind::Mutation, "save.deeplyMissing.x", None), None);
    }

    #[test]
    fn test_null_coalesces_to_default() {
        let store = ResultStore::shared();
        let reader = FineGrainedReader::new(store, "s");
        assert_eq!(reader.get(EntryKind::Query, "x.error", Some(json!("none"))), Some(json!("none")));
    }

    #[test]
    fn test_change_detection_is_per_path() {
        let store = ResultStore::shared();
        store.queries().set_one("s", "x", loaded(json!(1)));
        store.queries().set_one("s", "y", loaded(json!(2)));
        let reader = FineGrainedReader::new(store.clone(), "s");
        reader.get_path(&EntryPath::query("x", QueryField::Data), None);

        store.queries().set_one("s", "y", loaded(json!(2)).start_fetch(false));
        assert!(!reader.sync());
        assert_eq!(reader.version(), 0);

        store.queries().set_one("s", "x", loaded(json!(3)));
        assert!(reader.sync());
        assert!(!reader.sync());
        assert_eq!(reader.version(), 1);
    }

    #[test]
    fn test_other_scope_is_invisible() {
        let store = ResultStore::shared();
        let reader = FineGrainedReader::new(store.clone(), "a");
        reader.get(EntryKind::Mutation, "m.status", None);

        store.mutations().set_one(
            "b",
            "m",
            MutationEntry {
                status: MutationStatus::Pending,
                ..MutationEntry::default()
            },
        );
        assert!(!reader.sync());
    }

    #[test]
    fn test_get_as_and_unsubscribe() {
        let store = ResultStore::shared();
        store.mutations().set_one(
            "s",
            "m",
            MutationEntry {
                status: MutationStatus::Error,
                failure_count: 2,
                ..MutationEntry::default()
            },
        );
        let reader = FineGrainedReader::new(store.clone(), "s");
        let path = EntryPath::mutation("m", MutationField::FailureCount);
        assert_eq!(reader.get_as::<u32>(&path), Some(2));
        assert_eq!(reader.observed(), vec!["mutation:m.failureCount".to_string()]);

        assert!(reader.unsubscribe(&path));
        store.mutations().set_one("s", "m", MutationEntry::default());
        assert!(!reader.sync());
    }

    #[tokio::test]
    async fn test_changed_waits_for_observed_write() {
        let store = ResultStore::shared();
        let reader = Arc::new(FineGrainedReader::new(store.clone(), "s"));
        reader.get(EntryKind::Query, "x.data", None);
        let mut signal = reader.subscribe();

        let waiter = {
            let reader = reader.clone();
            tokio::spawn(async move { reader.changed().await })
        };
        tokio::task::yield_now().await;
        store.queries().set_one("s", "other", loaded(json!(0)));
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        store.queries().set_one("s", "x", loaded(json!("new")));
        waiter.await.unwrap();
        assert!(signal.has_changed().unwrap());
        assert_eq!(*signal.borrow_and_update(), 1);
    }
}
