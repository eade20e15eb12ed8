//! Multi-query combiner
//!
//! Declares a list of queries on the shared [`QueryClient`] and folds their
//! entries into one map keyed by each query's logical key. The fold is pure:
//! [`combine`] re-derives the whole map from the current entries every time,
//! with nothing carried over between calls.
//!
//! Per-query callbacks are delivered from the client's observer, outside
//! every lock:
//! - `on_state_change` when data, any loading flag, or the error changed
//!   (and once for the initial state)
//! - `on_data_changed` when defined data differs from the last delivered data

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use strata_core::request::merge_headers;
use strata_core::{
    ApiRequest, AuthProvider, EndpointRef, Headers, QueryEntry, RefetchHandle, StrataError,
};

use crate::context::ApiContext;
use crate::query_client::{QueryFn, QueryKey, QueryOptions};

/// Called with newly delivered data.
pub type DataHook = Arc<dyn Fn(&Value) + Send + Sync>;
/// Called with the combined entry of one query.
pub type CombinedHook = Arc<dyn Fn(&CombinedEntry) + Send + Sync>;
/// Receives `(logical key, full entry)` whenever the entry changed.
pub type EntrySink = Arc<dyn Fn(&str, &QueryEntry) + Send + Sync>;

/// Declaration of one query.
#[derive(Clone)]
pub struct QuerySpec {
    /// Key in the combined map
    pub key: String,
    /// Key in the query client; defaults to `[key]`
    pub query_key: QueryKey,
    pub endpoint: EndpointRef,
    /// Replaces the default GET request
    pub query_fn: Option<QueryFn>,
    pub enabled: bool,
    pub headers: Headers,
    /// Fetch even when the caller is not authorized
    pub disable_auth_control: bool,
    /// Keep `is_loading_mapped` false
    pub disable_loading: bool,
    pub on_data_changed: Option<DataHook>,
    pub on_state_change: Option<CombinedHook>,
}

impl QuerySpec {
    pub fn new(key: impl Into<String>, endpoint: EndpointRef) -> Self {
        let key = key.into();
        Self {
            query_key: vec![key.clone()],
            key,
            endpoint,
            query_fn: None,
            enabled: true,
            headers: Headers::new(),
            disable_auth_control: false,
            disable_loading: false,
            on_data_changed: None,
            on_state_change: None,
        }
    }

    pub fn query_key<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_key = segments.into_iter().map(Into::into).collect();
        self
    }

    pub fn query_fn(mut self, query_fn: QueryFn) -> Self {
        self.query_fn = Some(query_fn);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn disable_auth_control(mut self) -> Self {
        self.disable_auth_control = true;
        self
    }

    pub fn disable_loading(mut self) -> Self {
        self.disable_loading = true;
        self
    }

    pub fn on_data_changed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_data_changed = Some(Arc::new(hook));
        self
    }

    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CombinedEntry) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySpec")
            .field("key", &self.key)
            .field("query_key", &self.query_key)
            .field("endpoint", &self.endpoint)
            .field("enabled", &self.enabled)
            .field("disable_auth_control", &self.disable_auth_control)
            .field("disable_loading", &self.disable_loading)
            .finish_non_exhaustive()
    }
}

/// Final `enabled` of a query under `auth`.
pub fn is_enabled(spec: &QuerySpec, auth: &dyn AuthProvider) -> bool {
    spec.enabled && (spec.disable_auth_control || auth.is_authorized())
}

/// One query as seen in the combined map.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedEntry {
    pub data: Option<Value>,
    pub is_loading: bool,
    /// `is_loading` unless loading indicators are disabled for the query
    pub is_loading_mapped: bool,
    pub is_fetching: bool,
    pub is_pending: bool,
    pub error: Option<StrataError>,
    #[serde(skip)]
    pub refetch: Option<RefetchHandle>,
}

impl CombinedEntry {
    /// Project `entry` as declared by a query with `disable_loading`.
    pub fn project(entry: &QueryEntry, disable_loading: bool) -> Self {
        Self {
            data: entry.data.clone(),
            is_loading: entry.is_loading,
            is_loading_mapped: !disable_loading && entry.is_loading,
            is_fetching: entry.is_fetching,
            is_pending: entry.is_pending,
            error: entry.error.clone(),
            refetch: entry.refetch.clone(),
        }
    }
}

impl PartialEq for CombinedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.is_loading == other.is_loading
            && self.is_loading_mapped == other.is_loading_mapped
            && self.is_fetching == other.is_fetching
            && self.is_pending == other.is_pending
            && self.error == other.error
    }
}

/// Fold per-query entries into the combined map.
pub fn combine<'a, I>(items: I) -> BTreeMap<String, CombinedEntry>
where
    I: IntoIterator<Item = (&'a QuerySpec, &'a QueryEntry)>,
{
    items
        .into_iter()
        .map(|(spec, entry)| (spec.key.clone(), CombinedEntry::project(entry, spec.disable_loading)))
        .collect()
}

fn build_fetcher(ctx: &ApiContext, spec: &QuerySpec) -> QueryFn {
    if let Some(query_fn) = &spec.query_fn {
        return query_fn.clone();
    }
    let transport = ctx.transport.clone();
    let endpoints = ctx.endpoints.clone();
    let defaults = ctx.default_headers.clone();
    let headers = spec.headers.clone();
    let endpoint = spec.endpoint.clone();
    Arc::new(move || {
        // Resolved per fetch so endpoint table updates apply.
        let request = ApiRequest::get(endpoints.resolve(&endpoint), merge_headers(&defaults, &headers));
        let transport = transport.clone();
        async move { transport.request(request).await }.boxed()
    })
}

#[derive(Default)]
struct Delivered {
    state: Option<CombinedEntry>,
    data: Option<Value>,
    entry: Option<QueryEntry>,
}

/// A declared set of queries and their combined view.
pub struct MultiQuery {
    ctx: ApiContext,
    specs: Vec<QuerySpec>,
    sink: Option<EntrySink>,
    delivered: Mutex<HashMap<String, Delivered>>,
    observer: u64,
}

impl MultiQuery {
    pub fn new(ctx: ApiContext, specs: Vec<QuerySpec>) -> Arc<Self> {
        Self::with_sink(ctx, specs, None)
    }

    /// Like [`new`](Self::new), also feeding every changed entry to `sink`.
    pub fn with_sink(ctx: ApiContext, specs: Vec<QuerySpec>, sink: Option<EntrySink>) -> Arc<Self> {
        for spec in &specs {
            ctx.query_client.register(
                &spec.query_key,
                build_fetcher(&ctx, spec),
                QueryOptions {
                    enabled: is_enabled(spec, ctx.auth.as_ref()),
                    disable_loading: spec.disable_loading,
                },
            );
        }

        let this = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let observer = ctx.query_client.observe(move |key| {
                if let Some(queries) = weak.upgrade() {
                    queries.on_key_changed(key);
                }
            });
            Self {
                ctx,
                specs,
                sink,
                delivered: Mutex::new(HashMap::new()),
                observer,
            }
        });

        for index in 0..this.specs.len() {
            this.deliver(index);
        }
        this
    }

    pub fn specs(&self) -> &[QuerySpec] {
        &self.specs
    }

    /// Fetch every enabled query.
    pub async fn start(&self) {
        let client = &self.ctx.query_client;
        join_all(self.specs.iter().map(|s| client.fetch_if_enabled(&s.query_key))).await;
    }

    /// Current combined map.
    pub fn result(&self) -> BTreeMap<String, CombinedEntry> {
        let entries: Vec<(&QuerySpec, QueryEntry)> = self
            .specs
            .iter()
            .map(|spec| (spec, self.current_entry(spec)))
            .collect();
        combine(entries.iter().map(|(spec, entry)| (*spec, entry)))
    }

    /// Combined entry of one logical key.
    pub fn get(&self, key: &str) -> Option<CombinedEntry> {
        let spec = self.specs.iter().find(|s| s.key == key)?;
        Some(CombinedEntry::project(&self.current_entry(spec), spec.disable_loading))
    }

    /// Re-evaluate `enabled` after an auth change and fetch queries that
    /// became enabled and have no data yet.
    pub async fn refresh_auth(&self) {
        let client = &self.ctx.query_client;
        let mut newly_enabled = Vec::new();
        for spec in &self.specs {
            let enabled = is_enabled(spec, self.ctx.auth.as_ref());
            let was_enabled = client.is_enabled(&spec.query_key);
            client.set_enabled(&spec.query_key, enabled);
            if enabled && !was_enabled {
                newly_enabled.push(spec.query_key.clone());
            }
        }
        tracing::debug!(count = newly_enabled.len(), "queries enabled after auth change");

        let missing: Vec<QueryKey> = newly_enabled
            .into_iter()
            .filter(|key| client.entry(key).is_some_and(|e| e.data.is_none()))
            .collect();
        join_all(missing.iter().map(|key| client.fetch(key))).await;
    }

    /// Refetch every declared query, enabled or not.
    pub async fn refetch_all(&self) {
        let mut keys: Vec<&QueryKey> = self.specs.iter().map(|s| &s.query_key).collect();
        keys.sort();
        keys.dedup();
        let client = &self.ctx.query_client;
        join_all(keys.into_iter().map(|key| client.fetch(key))).await;
    }

    fn current_entry(&self, spec: &QuerySpec) -> QueryEntry {
        self.ctx
            .query_client
            .entry(&spec.query_key)
            .unwrap_or_else(QueryEntry::pending)
    }

    fn on_key_changed(&self, key: &[String]) {
        for index in 0..self.specs.len() {
            if self.specs[index].query_key == key {
                self.deliver(index);
            }
        }
    }

    fn deliver(&self, index: usize) {
        let spec = &self.specs[index];
        let mut entry = self.current_entry(spec);
        entry.is_loading_mapped = !spec.disable_loading && entry.is_loading;
        let combined = CombinedEntry::project(&entry, spec.disable_loading);

        let (state_changed, data_changed, entry_changed) = {
            let mut delivered = self.delivered.lock();
            let last = delivered.entry(spec.key.clone()).or_default();

            let state_changed = last.state.as_ref() != Some(&combined);
            if state_changed {
                last.state = Some(combined.clone());
            }
            let data_changed = combined.data.is_some() && combined.data != last.data;
            if data_changed {
                last.data = combined.data.clone();
            }
            let entry_changed = last.entry.as_ref() != Some(&entry);
            if entry_changed {
                last.entry = Some(entry.clone());
            }
            (state_changed, data_changed, entry_changed)
        };

        if entry_changed {
            if let Some(sink) = &self.sink {
                sink(&spec.key, &entry);
            }
        }
        if state_changed {
            if let Some(hook) = &spec.on_state_change {
                hook(&combined);
            }
        }
        if data_changed {
            if let (Some(hook), Some(data)) = (&spec.on_data_changed, &combined.data) {
                hook(data);
            }
        }
    }
}

impl Drop for MultiQuery {
    fn drop(&mut self) {
        self.ctx.query_client.unobserve(self.observer);
    }
}

impl std::fmt::Debug for MultiQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiQuery")
            .field("specs", &self.specs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_testkit::{FixedClock, MockTransport, StaticAuth};

    fn context(transport: Arc<MockTransport>, auth: Arc<StaticAuth>) -> ApiContext {
        ApiContext::builder()
            .transport(transport)
            .auth(auth)
            .clock(Arc::new(FixedClock::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_combine_maps_loading() {
        let a = QuerySpec::new("a", EndpointRef::base("api"));
        let b = QuerySpec::new("b", EndpointRef::base("api")).disable_loading();
        let loading = QueryEntry::pending().start_fetch(false);

        let combined = combine([(&a, &loading), (&b, &loading)]);
        assert!(combined["a"].is_loading);
        assert!(combined["a"].is_loading_mapped);
        assert!(combined["b"].is_loading);
        assert!(!combined["b"].is_loading_mapped);
    }

    #[test]
    fn test_enabled_requires_auth_unless_bypassed() {
        let auth = StaticAuth::logged_out();
        let spec = QuerySpec::new("a", EndpointRef::base("api"));
        assert!(!is_enabled(&spec, &auth));
        assert!(is_enabled(&spec.clone().disable_auth_control(), &auth));
        assert!(!is_enabled(&spec.enabled(false).disable_auth_control(), &auth));
    }

    #[tokio::test]
    async fn test_default_fetch_is_get_with_merged_headers() {
        let transport = Arc::new(MockTransport::new());
        transport.on("http://localhost:3000/users", Ok(json!([{"id": 1}])));
        let mut ctx = context(transport.clone(), Arc::new(StaticAuth::logged_in()));
        ctx.default_headers.insert("X-App".into(), "strata".into());

        let spec = QuerySpec::new("users", EndpointRef::new("api", "users"))
            .headers(Headers::from([("X-App".to_string(), "call".to_string())]));
        let queries = MultiQuery::new(ctx, vec![spec]);
        queries.start().await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, strata_core::ApiMethod::Get);
        assert_eq!(calls[0].headers["X-App"], "call");
        assert_eq!(queries.result()["users"].data, Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn test_state_and_data_hooks() {
        let transport = Arc::new(MockTransport::new());
        transport.on("http://localhost:3000/a", Ok(json!("v1")));
        let ctx = context(transport.clone(), Arc::new(StaticAuth::logged_in()));

        let states = Arc::new(AtomicUsize::new(0));
        let data = Arc::new(Mutex::new(Vec::new()));
        let (s, d) = (states.clone(), data.clone());
        let spec = QuerySpec::new("a", EndpointRef::new("api", "a"))
            .on_state_change(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_data_changed(move |v| d.lock().push(v.clone()));

        let queries = MultiQuery::new(ctx, vec![spec]);
        assert_eq!(states.load(Ordering::SeqCst), 1);

        queries.start().await;
        // loading, then success
        assert_eq!(states.load(Ordering::SeqCst), 3);

        queries.refetch_all().await;
        // same data: only the fetching flag toggles
        assert_eq!(states.load(Ordering::SeqCst), 5);
        assert_eq!(*data.lock(), vec![json!("v1")]);
    }

    #[tokio::test]
    async fn test_refresh_auth_fetches_newly_enabled() {
        let transport = Arc::new(MockTransport::new());
        let auth = Arc::new(StaticAuth::logged_out());
        let ctx = context(transport.clone(), auth.clone());
        let queries = MultiQuery::new(ctx, vec![QuerySpec::new("a", EndpointRef::new("api", "a"))]);

        queries.start().await;
        assert!(transport.calls().is_empty());

        auth.set_logged(true);
        queries.refresh_auth().await;
        assert_eq!(transport.call_count("http://localhost:3000/a"), 1);
    }
}
