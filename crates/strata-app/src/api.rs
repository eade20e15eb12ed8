//! Single-scope facade
//!
//! [`Api`] takes a declaration list of queries, mutations and sockets and
//! wires them to one scope of the shared store:
//! - query entries are written under `scope:key` whenever they change
//! - mutation entries are written on every transition
//! - entries rehydrated into the store seed the query client, so declared
//!   queries start from their persisted data with a fresh refetch handle
//!
//! With `persist_to_store` off nothing is written and every component still
//! works through its own accessors.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use strata_core::{MutationEntry, QueryEntry, Result, DEFAULT_SCOPE};

use crate::combiner::{CombinedEntry, EntrySink, MultiQuery, QuerySpec};
use crate::context::ApiContext;
use crate::machine::{MutateCallbacks, MutationConfig, MutationMachine, MutationSet};
use crate::query_client::QueryKey;
use crate::reader::FineGrainedReader;
use crate::socket::{MultiSocket, SocketHandle, SocketSpec};

/// One declared operation.
#[derive(Debug, Clone)]
pub enum ApiItem {
    Query(QuerySpec),
    Mutation { key: String, config: MutationConfig },
    Websocket(SocketSpec),
}

impl ApiItem {
    pub fn mutation(key: impl Into<String>, config: MutationConfig) -> Self {
        Self::Mutation {
            key: key.into(),
            config,
        }
    }

    /// Logical key of the item.
    pub fn key(&self) -> &str {
        match self {
            Self::Query(spec) => &spec.key,
            Self::Mutation { key, .. } => key,
            Self::Websocket(spec) => &spec.key,
        }
    }
}

/// Options of an [`Api`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiOptions {
    /// Scope of every store write
    pub scope_id: String,
    /// Write query and mutation entries to the store
    pub persist_to_store: bool,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            scope_id: DEFAULT_SCOPE.to_string(),
            persist_to_store: true,
        }
    }
}

impl ApiOptions {
    pub fn scope(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            ..Self::default()
        }
    }
}

/// Queries, mutations and sockets of one scope.
pub struct Api {
    ctx: ApiContext,
    options: ApiOptions,
    queries: Arc<MultiQuery>,
    mutations: MutationSet,
    sockets: MultiSocket,
}

impl Api {
    pub fn new(ctx: ApiContext, items: Vec<ApiItem>, options: ApiOptions) -> Self {
        let scope = options.scope_id.clone();
        let mut query_specs = Vec::new();
        let mut mutation_items = Vec::new();
        let mut socket_specs = Vec::new();
        for item in items {
            match item {
                ApiItem::Query(spec) => query_specs.push(spec),
                ApiItem::Mutation { key, config } => mutation_items.push((key, config)),
                ApiItem::Websocket(spec) => socket_specs.push(spec),
            }
        }

        let sink: Option<EntrySink> = if options.persist_to_store {
            for spec in &query_specs {
                if let Some(entry) = ctx.store.queries().get(&scope, &spec.key) {
                    if ctx.query_client.seed(&spec.query_key, entry) {
                        tracing::debug!(scope = %scope, key = %spec.key, "query seeded from store");
                    }
                }
            }
            let store = ctx.store.clone();
            let scope = scope.clone();
            Some(Arc::new(move |key: &str, entry: &QueryEntry| {
                store.queries().set_one(&scope, key, entry.clone());
            }))
        } else {
            None
        };
        let queries = MultiQuery::with_sink(ctx.clone(), query_specs, sink);

        let mutations = MutationSet::new();
        let mut initial = BTreeMap::new();
        for (key, config) in mutation_items {
            let machine = mutations.insert(key.clone(), persisting(&ctx, &options, &key, config), ctx.clone());
            initial.insert(key, machine.state());
        }
        if options.persist_to_store {
            // Drops entries of mutations no longer declared in this scope.
            ctx.store.mutations().set_scope(&scope, initial);
        }
        for key in mutations.keys() {
            if let Some(machine) = mutations.get(&key) {
                machine.emit_state();
            }
        }

        let sockets = MultiSocket::new(&ctx, socket_specs);
        tracing::debug!(
            scope = %scope,
            queries = queries.specs().len(),
            mutations = mutations.keys().len(),
            sockets = sockets.keys().len(),
            "api declared"
        );

        Self {
            ctx,
            options,
            queries,
            mutations,
            sockets,
        }
    }

    /// Api over `items` in the default scope, persisting to the store.
    pub fn with_defaults(ctx: ApiContext, items: Vec<ApiItem>) -> Self {
        Self::new(ctx, items, ApiOptions::default())
    }

    pub fn scope(&self) -> &str {
        &self.options.scope_id
    }

    pub fn context(&self) -> &ApiContext {
        &self.ctx
    }

    /// Fetch every enabled query.
    pub async fn start(&self) {
        self.queries.start().await;
    }

    /// Combined map of every declared query.
    pub fn all_query(&self) -> BTreeMap<String, CombinedEntry> {
        self.queries.result()
    }

    pub fn query(&self, key: &str) -> Option<CombinedEntry> {
        self.queries.get(key)
    }

    /// Current entry of every declared mutation.
    pub fn all_mutation(&self) -> BTreeMap<String, MutationEntry> {
        self.mutations.states()
    }

    pub fn mutation(&self, key: &str) -> Option<Arc<MutationMachine>> {
        self.mutations.get(key)
    }

    /// Run the mutation of `key`.
    pub async fn mutate(&self, key: &str, variables: Value) -> Result<Value> {
        self.mutations
            .execute(key, variables, MutateCallbacks::default())
            .await
    }

    pub fn socket(&self, key: &str) -> Option<&SocketHandle> {
        self.sockets.get(key)
    }

    pub fn sockets(&self) -> &MultiSocket {
        &self.sockets
    }

    /// A new reader over this scope.
    pub fn reader(&self) -> FineGrainedReader {
        FineGrainedReader::new(self.ctx.store.clone(), self.options.scope_id.clone())
    }

    /// Refetch every declared query.
    pub async fn refresh_queries(&self) {
        self.queries.refetch_all().await;
    }

    /// Re-evaluate query enablement after an auth change.
    pub async fn refresh_auth(&self) {
        self.queries.refresh_auth().await;
    }

    /// Invalidate queries under each key prefix.
    pub async fn invalidate_queries(&self, prefixes: &[QueryKey]) -> Vec<QueryKey> {
        self.ctx.query_client.invalidate_prefixes(prefixes).await
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("options", &self.options)
            .field("queries", &self.queries)
            .field("mutations", &self.mutations)
            .field("sockets", &self.sockets)
            .finish()
    }
}

/// Wrap the state hook of `config` so transitions are written to the store.
fn persisting(ctx: &ApiContext, options: &ApiOptions, key: &str, mut config: MutationConfig) -> MutationConfig {
    if !options.persist_to_store {
        return config;
    }
    let store = ctx.store.clone();
    let scope = options.scope_id.clone();
    let key = key.to_string();
    let user_hook = config.on_state_change.take();
    config.on_state_change = Some(Arc::new(move |entry: &MutationEntry| {
        store.mutations().set_one(&scope, &key, entry.clone());
        if let Some(hook) = &user_hook {
            hook(entry);
        }
    }));
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{ApiMethod, EndpointRef, MutationStatus};
    use strata_testkit::{FixedClock, MockTransport};

    fn context(transport: Arc<MockTransport>) -> ApiContext {
        ApiContext::builder()
            .transport(transport)
            .clock(Arc::new(FixedClock::default()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_declared_entries_land_in_scope() {
        let transport = Arc::new(MockTransport::new());
        transport.on("http://localhost:3000/users", Ok(json!(["Ada"])));
        let ctx = context(transport);
        let store = ctx.store.clone();

        let api = Api::new(
            ctx,
            vec![
                ApiItem::Query(QuerySpec::new("users", EndpointRef::new("api", "users"))),
                ApiItem::mutation("save", MutationConfig::new(EndpointRef::new("api", "users"), ApiMethod::Post)),
            ],
            ApiOptions::scope("admin"),
        );
        assert_eq!(store.mutations().get("admin", "save").unwrap().status, MutationStatus::Idle);
        assert!(store.queries().get("admin", "users").unwrap().is_pending);

        api.start().await;
        assert_eq!(store.queries().get("admin", "users").unwrap().data, Some(json!(["Ada"])));
        assert!(store.queries().scoped("default").is_empty());
    }

    #[tokio::test]
    async fn test_persist_off_writes_nothing() {
        let ctx = context(Arc::new(MockTransport::new()));
        let store = ctx.store.clone();
        let api = Api::new(
            ctx,
            vec![ApiItem::mutation("save", MutationConfig::new(EndpointRef::base("api"), ApiMethod::Post).test_mode())],
            ApiOptions {
                persist_to_store: false,
                ..ApiOptions::default()
            },
        );
        assert_eq!(api.mutate("save", json!({})).await.unwrap(), json!("test"));
        assert!(store.mutations().snapshot().is_empty());
        assert!(api.all_mutation()["save"].is_success());
    }

    #[tokio::test]
    async fn test_redeclaring_scope_drops_stale_mutations() {
        let ctx = context(Arc::new(MockTransport::new()));
        let store = ctx.store.clone();
        let config = MutationConfig::new(EndpointRef::base("api"), ApiMethod::Post);

        let first = Api::with_defaults(
            ctx.clone(),
            vec![ApiItem::mutation("a", config.clone()), ApiItem::mutation("b", config.clone())],
        );
        assert_eq!(store.mutations().scoped(DEFAULT_SCOPE).len(), 2);
        drop(first);

        let _second = Api::with_defaults(ctx, vec![ApiItem::mutation("a", config)]);
        let view = store.mutations().scoped(DEFAULT_SCOPE);
        assert_eq!(view.keys().collect::<Vec<_>>(), vec!["a"]);
    }
}
