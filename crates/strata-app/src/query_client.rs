//! Query client
//!
//! A small query executor: it owns one [`QueryEntry`] per query key, runs
//! the registered fetch function, and records each transition. Observers
//! are told which key changed after every transition, outside the lock.
//!
//! Invalidation matches query keys segment-wise by prefix, marks the matches
//! stale, and refetches the enabled ones. A match whose fetch is already
//! running gets its result discarded and the fetch rerun, so data requested
//! before the invalidation is never recorded as fresh. There is no retry or
//! backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use strata_core::{Clock, InvalidationSink, QueryEntry, RefetchHandle, Result};
use tokio::sync::watch;

/// Hierarchical query key, e.g. `["users", "42"]`.
pub type QueryKey = Vec<String>;

/// Fetch function behind a query.
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

type Observer = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Options of a registered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Fetch automatically and on invalidation
    pub enabled: bool,
    /// Keep `is_loading_mapped` false
    pub disable_loading: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_loading: false,
        }
    }
}

struct QueryState {
    entry: QueryEntry,
    fetcher: Option<QueryFn>,
    options: QueryOptions,
    in_flight: bool,
    // invalidated while in flight; the running result is stale
    rerun: bool,
    // bumped each time an in-flight fetch settles
    settled: watch::Sender<u64>,
}

impl QueryState {
    fn new(entry: QueryEntry) -> Self {
        Self {
            entry,
            fetcher: None,
            options: QueryOptions::default(),
            in_flight: false,
            rerun: false,
            settled: watch::channel(0).0,
        }
    }
}

enum Start {
    Run(QueryFn),
    Wait(watch::Receiver<u64>),
    Skip,
}

/// True when `key` starts with every segment of `prefix`.
pub fn matches_prefix(key: &[String], prefix: &[String]) -> bool {
    key.len() >= prefix.len() && key[..prefix.len()] == *prefix
}

/// Executes queries and records their entries.
pub struct QueryClient {
    clock: Arc<dyn Clock>,
    queries: Mutex<HashMap<QueryKey, QueryState>>,
    observers: RwLock<Vec<(u64, Observer)>>,
    next_observer: AtomicU64,
    this: Weak<QueryClient>,
}

impl QueryClient {
    /// Create a client stamping entries with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            clock,
            queries: Mutex::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Register or update the fetch function and options of `key`.
    ///
    /// A new key starts as a pending entry. An existing entry keeps its data.
    pub fn register(&self, key: &[String], fetcher: QueryFn, options: QueryOptions) {
        let mut queries = self.queries.lock();
        let state = queries
            .entry(key.to_vec())
            .or_insert_with(|| QueryState::new(QueryEntry::pending()));
        state.fetcher = Some(fetcher);
        state.options = options;
    }

    /// Seed `key` with a previously persisted entry, unless it already exists.
    pub fn seed(&self, key: &[String], entry: QueryEntry) -> bool {
        let mut queries = self.queries.lock();
        if queries.contains_key(key) {
            return false;
        }
        let entry = QueryEntry {
            refetch: None,
            ..entry
        };
        queries.insert(key.to_vec(), QueryState::new(entry));
        true
    }

    /// Change whether `key` fetches automatically.
    pub fn set_enabled(&self, key: &[String], enabled: bool) {
        if let Some(state) = self.queries.lock().get_mut(key) {
            state.options.enabled = enabled;
        }
    }

    /// Whether `key` is registered and enabled.
    pub fn is_enabled(&self, key: &[String]) -> bool {
        self.queries
            .lock()
            .get(key)
            .is_some_and(|s| s.options.enabled && s.fetcher.is_some())
    }

    /// Current entry of `key` with a bound refetch handle.
    pub fn entry(&self, key: &[String]) -> Option<QueryEntry> {
        let entry = self.queries.lock().get(key).map(|s| s.entry.clone())?;
        Some(entry.with_refetch(self.refetch_handle(key)))
    }

    /// Every known key.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.queries.lock().keys().cloned().collect()
    }

    /// Handle that refetches `key` on this client.
    pub fn refetch_handle(&self, key: &[String]) -> RefetchHandle {
        let client = self.this.clone();
        let key = key.to_vec();
        RefetchHandle::new(move || {
            let client = client.clone();
            let key = key.clone();
            Box::pin(async move {
                if let Some(client) = client.upgrade() {
                    client.fetch(&key).await;
                }
            })
        })
    }

    /// Run the fetch of `key`, regardless of `enabled`.
    ///
    /// A fetch already in flight for `key` is not started twice.
    pub async fn fetch(&self, key: &[String]) {
        self.run(key, false).await;
    }

    /// Run the fetch of `key` when it is enabled.
    pub async fn fetch_if_enabled(&self, key: &[String]) {
        if self.is_enabled(key) {
            self.fetch(key).await;
        }
    }

    /// Mark every query under any of `prefixes` stale and refetch the
    /// enabled ones. Returns the matched keys once every refetch settled.
    pub async fn invalidate_prefixes(&self, prefixes: &[QueryKey]) -> Vec<QueryKey> {
        let matched: Vec<QueryKey> = {
            let mut queries = self.queries.lock();
            queries
                .iter_mut()
                .filter(|(key, _)| prefixes.iter().any(|p| matches_prefix(key, p)))
                .map(|(key, state)| {
                    state.entry = state.entry.mark_stale();
                    key.clone()
                })
                .collect()
        };
        tracing::debug!(prefixes = ?prefixes, matched = matched.len(), "queries invalidated");

        for key in &matched {
            self.notify(key);
        }
        join_all(matched.iter().map(|key| async move {
            if self.is_enabled(key) {
                self.run(key, true).await;
            }
        }))
        .await;
        matched
    }

    /// Fetch `key`. When a fetch is already running, `rerun` asks it to
    /// discard its result and fetch again, and waits for it to settle.
    async fn run(&self, key: &[String], rerun: bool) {
        let start = {
            let mut queries = self.queries.lock();
            match queries.get_mut(key) {
                None => Start::Skip,
                Some(state) if state.in_flight => {
                    if rerun {
                        state.rerun = true;
                        Start::Wait(state.settled.subscribe())
                    } else {
                        Start::Skip
                    }
                }
                Some(state) => match state.fetcher.clone() {
                    Some(fetcher) => {
                        state.in_flight = true;
                        state.entry = state.entry.start_fetch(state.options.disable_loading);
                        Start::Run(fetcher)
                    }
                    None => Start::Skip,
                },
            }
        };
        let mut fetcher = match start {
            Start::Run(fetcher) => fetcher,
            Start::Wait(mut settled) => {
                let _ = settled.changed().await;
                return;
            }
            Start::Skip => return,
        };
        tracing::debug!(key = ?key, "query fetch started");
        self.notify(key);

        loop {
            let result = fetcher().await;
            let now = self.clock.now_ms();
            let mut queries = self.queries.lock();
            let Some(state) = queries.get_mut(key) else {
                return;
            };
            if state.rerun {
                state.rerun = false;
                if let Some(next) = state.fetcher.clone() {
                    fetcher = next;
                }
                tracing::debug!(key = ?key, "query invalidated in flight, fetching again");
                continue;
            }
            state.in_flight = false;
            state.entry = match result {
                Ok(data) => state.entry.succeed(data, now),
                Err(error) => {
                    tracing::warn!(key = ?key, error = %error, "query fetch failed");
                    state.entry.fail(error, now)
                }
            };
            state.settled.send_modify(|n| *n += 1);
            break;
        }
        self.notify(key);
    }

    /// Call `observer` with the key of every transition.
    pub fn observe<F>(&self, observer: F) -> u64
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    /// Stop calling the observer registered as `id`.
    pub fn unobserve(&self, id: u64) {
        self.observers.write().retain(|(oid, _)| *oid != id);
    }

    fn notify(&self, key: &[String]) {
        let observers: Vec<Observer> = self.observers.read().iter().map(|(_, o)| o.clone()).collect();
        for observer in observers {
            observer(key);
        }
    }
}

#[async_trait]
impl InvalidationSink for QueryClient {
    async fn invalidate(&self, prefixes: &[String]) {
        let prefixes: Vec<QueryKey> = prefixes.iter().map(|p| vec![p.clone()]).collect();
        self.invalidate_prefixes(&prefixes).await;
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("queries", &self.queries.lock().len())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}
