//! Mutation machine
//!
//! One machine per logical mutation key. The state moves
//! `idle -> pending -> {success, error}` and `reset` returns it to idle from
//! anywhere. Transitions go through [`reduce`], a pure function; the machine
//! adds the side effects around it (transport, invalidation, notification,
//! callbacks).
//!
//! Concurrent `execute` calls on one key are allowed. Every transition
//! overwrites the key's entry, so the entry reflects the most recently
//! completed transition. `reset` does not cancel a request in flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::Value;
use strata_core::notification::{error_notification, success_notification};
use strata_core::request::merge_headers;
use strata_core::{
    ApiMethod, ApiRequest, BodyConverter, EndpointRef, Headers, MutationEntry,
    MutationNotifications, MutationStatus, Result, StrataError,
};

use crate::context::ApiContext;

/// Canned response of a machine in test mode.
pub const TEST_RESPONSE: &str = "test";

/// Error type a custom request function may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Caller-supplied request replacing the transport: `(url, method, variables)`.
pub type CustomRequest = Arc<
    dyn Fn(String, ApiMethod, Value) -> BoxFuture<'static, std::result::Result<Value, BoxError>>
        + Send
        + Sync,
>;

/// `(data, variables)`
pub type SuccessHook = Arc<dyn Fn(&Value, &Value) + Send + Sync>;
/// `(error, variables)`
pub type ErrorHook = Arc<dyn Fn(&StrataError, &Value) + Send + Sync>;
/// Called with the entry after every transition.
pub type StateHook = Arc<dyn Fn(&MutationEntry) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Reducer
// ─────────────────────────────────────────────────────────────────────────────

/// A state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationAction {
    Pending { submitted_at: u64, variables: Value },
    Success { data: Value },
    Error { error: StrataError },
    Reset,
}

/// Next entry after `action`.
pub fn reduce(state: &MutationEntry, action: MutationAction) -> MutationEntry {
    match action {
        MutationAction::Reset => MutationEntry::default(),
        MutationAction::Pending {
            submitted_at,
            variables,
        } => MutationEntry {
            status: MutationStatus::Pending,
            submitted_at: Some(submitted_at),
            variables: Some(variables),
            ..MutationEntry::default()
        },
        MutationAction::Success { data } => MutationEntry {
            status: MutationStatus::Success,
            data: Some(data),
            error: None,
            ..state.clone()
        },
        MutationAction::Error { error } => MutationEntry {
            status: MutationStatus::Error,
            failure_count: state.failure_count.saturating_add(1),
            failure_reason: Some(error.clone()),
            error: Some(error),
            ..state.clone()
        },
    }
}

/// Turn whatever a custom request failed with into a [`StrataError`].
pub fn normalize_error(error: BoxError) -> StrataError {
    match error.downcast::<StrataError>() {
        Ok(error) => *error,
        Err(other) => {
            let message = other.to_string();
            if message.is_empty() {
                StrataError::unknown()
            } else {
                StrataError::transport(message)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How one mutation runs.
#[derive(Clone)]
pub struct MutationConfig {
    pub endpoint: EndpointRef,
    pub method: ApiMethod,
    pub headers: Headers,
    /// Query key prefixes invalidated after success
    pub invalidate: Vec<String>,
    pub custom_request: Option<CustomRequest>,
    pub converter: Option<BodyConverter>,
    /// Resolve with [`TEST_RESPONSE`] without any request
    pub is_test: bool,
    pub notifications: MutationNotifications,
    pub on_success: Option<SuccessHook>,
    pub on_error: Option<ErrorHook>,
    pub on_state_change: Option<StateHook>,
}

impl MutationConfig {
    pub fn new(endpoint: EndpointRef, method: ApiMethod) -> Self {
        Self {
            endpoint,
            method,
            headers: Headers::new(),
            invalidate: Vec::new(),
            custom_request: None,
            converter: None,
            is_test: false,
            notifications: MutationNotifications::default(),
            on_success: None,
            on_error: None,
            on_state_change: None,
        }
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn invalidate<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn custom_request<F>(mut self, request: F) -> Self
    where
        F: Fn(String, ApiMethod, Value) -> BoxFuture<'static, std::result::Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.custom_request = Some(Arc::new(request));
        self
    }

    pub fn converter(mut self, converter: BodyConverter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn test_mode(mut self) -> Self {
        self.is_test = true;
        self
    }

    pub fn notifications(mut self, notifications: MutationNotifications) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StrataError, &Value) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&MutationEntry) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for MutationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationConfig")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("invalidate", &self.invalidate)
            .field("is_test", &self.is_test)
            .finish_non_exhaustive()
    }
}

/// Per-call callbacks, run after the configured hooks.
#[derive(Clone, Default)]
pub struct MutateCallbacks {
    pub on_success: Option<SuccessHook>,
    pub on_error: Option<ErrorHook>,
}

impl MutateCallbacks {
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StrataError, &Value) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Machine
// ─────────────────────────────────────────────────────────────────────────────

/// State machine of one mutation key.
pub struct MutationMachine {
    key: String,
    config: MutationConfig,
    ctx: ApiContext,
    state: Mutex<MutationEntry>,
    // held from the state write until the state hook returns; hooks may
    // dispatch again
    publish: ReentrantMutex<()>,
}

impl MutationMachine {
    pub fn new(key: impl Into<String>, config: MutationConfig, ctx: ApiContext) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            config,
            ctx,
            state: Mutex::new(MutationEntry::default()),
            publish: ReentrantMutex::new(()),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Current entry.
    pub fn state(&self) -> MutationEntry {
        self.state.lock().clone()
    }

    /// Run the mutation with `variables`.
    ///
    /// The failure is recorded in the entry and also returned.
    pub async fn execute(&self, variables: Value, callbacks: MutateCallbacks) -> Result<Value> {
        self.dispatch(MutationAction::Pending {
            submitted_at: self.ctx.clock.now_ms(),
            variables: variables.clone(),
        });

        match self.run(&variables).await {
            Ok(data) => {
                self.dispatch(MutationAction::Success { data: data.clone() });
                tracing::debug!(key = %self.key, "mutation succeeded");

                if !self.config.invalidate.is_empty() {
                    self.ctx.invalidation.invalidate(&self.config.invalidate).await;
                }
                if let Some(notification) =
                    success_notification(self.config.notifications.success.as_ref(), &data)
                {
                    self.ctx.notify(notification);
                }
                if let Some(hook) = &self.config.on_success {
                    hook(&data, &variables);
                }
                if let Some(hook) = &callbacks.on_success {
                    hook(&data, &variables);
                }
                Ok(data)
            }
            Err(error) => {
                self.dispatch(MutationAction::Error {
                    error: error.clone(),
                });
                tracing::warn!(key = %self.key, error = %error, "mutation failed");

                if let Some(notification) =
                    error_notification(self.config.notifications.error.as_ref(), &error)
                {
                    self.ctx.notify(notification);
                }
                if let Some(hook) = &self.config.on_error {
                    hook(&error, &variables);
                }
                if let Some(hook) = &callbacks.on_error {
                    hook(&error, &variables);
                }
                Err(error)
            }
        }
    }

    /// Fire-and-forget [`execute`](Self::execute).
    pub fn mutate(self: &Arc<Self>, variables: Value, callbacks: MutateCallbacks) {
        let machine = self.clone();
        tokio::spawn(async move {
            let _ = machine.execute(variables, callbacks).await;
        });
    }

    /// Return to the idle entry.
    pub fn reset(&self) {
        self.dispatch(MutationAction::Reset);
    }

    /// Deliver the current entry to the state hook without a transition.
    pub fn emit_state(&self) {
        let _publish = self.publish.lock();
        let entry = self.state();
        if let Some(hook) = &self.config.on_state_change {
            hook(&entry);
        }
    }

    async fn run(&self, variables: &Value) -> Result<Value> {
        if !self.ctx.auth.is_authorized() {
            return Err(StrataError::not_authenticated());
        }

        let url = self.ctx.endpoints.resolve(&self.config.endpoint);
        let headers = merge_headers(&self.ctx.default_headers, &self.config.headers);

        if self.config.is_test {
            return Ok(Value::String(TEST_RESPONSE.to_string()));
        }
        if let Some(request) = &self.config.custom_request {
            return request(url, self.config.method, variables.clone())
                .await
                .map_err(normalize_error);
        }

        let body = match variables {
            Value::Null => None,
            other => Some(other.clone()),
        };
        self.ctx
            .transport
            .request(ApiRequest {
                url,
                method: self.config.method,
                body,
                headers,
                converter: self.config.converter.clone(),
            })
            .await
    }

    fn dispatch(&self, action: MutationAction) {
        let _publish = self.publish.lock();
        let next = {
            let mut state = self.state.lock();
            let next = reduce(&state, action);
            *state = next.clone();
            next
        };
        tracing::debug!(key = %self.key, status = %next.status, "mutation transition");
        if let Some(hook) = &self.config.on_state_change {
            hook(&next);
        }
    }
}

impl std::fmt::Debug for MutationMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationMachine")
            .field("key", &self.key)
            .field("status", &self.state.lock().status)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Machine set
// ─────────────────────────────────────────────────────────────────────────────

/// Machines keyed by logical mutation key. Unbounded.
#[derive(Debug, Default)]
pub struct MutationSet {
    machines: RwLock<BTreeMap<String, Arc<MutationMachine>>>,
}

impl MutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the machine of `key`.
    pub fn insert(&self, key: impl Into<String>, config: MutationConfig, ctx: ApiContext) -> Arc<MutationMachine> {
        let key = key.into();
        let machine = MutationMachine::new(key.clone(), config, ctx);
        self.machines.write().insert(key, machine.clone());
        machine
    }

    pub fn get(&self, key: &str) -> Option<Arc<MutationMachine>> {
        self.machines.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.machines.read().keys().cloned().collect()
    }

    /// Run the machine of `key`.
    pub async fn execute(&self, key: &str, variables: Value, callbacks: MutateCallbacks) -> Result<Value> {
        let machine = self
            .get(key)
            .ok_or_else(|| StrataError::invalid(format!("unknown mutation '{key}'")))?;
        machine.execute(variables, callbacks).await
    }

    /// Reset the machine of `key`. Unknown keys are ignored.
    pub fn reset(&self, key: &str) {
        if let Some(machine) = self.get(key) {
            machine.reset();
        }
    }

    /// Current entry of every machine.
    pub fn states(&self) -> BTreeMap<String, MutationEntry> {
        self.machines
            .read()
            .iter()
            .map(|(key, machine)| (key.clone(), machine.state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn arb_action() -> impl Strategy<Value = MutationAction> {
        prop_oneof![
            (any::<u64>(), any::<i32>()).prop_map(|(at, v)| MutationAction::Pending {
                submitted_at: at,
                variables: json!(v),
            }),
            any::<i32>().prop_map(|v| MutationAction::Success { data: json!(v) }),
            "[a-z]{0,8}".prop_map(|m| MutationAction::Error {
                error: StrataError::transport(m)
            }),
            Just(MutationAction::Reset),
        ]
    }

    #[test]
    fn test_pending_clears_previous_outcome() {
        let failed = reduce(
            &MutationEntry::default(),
            MutationAction::Error {
                error: StrataError::transport("x"),
            },
        );
        let pending = reduce(
            &failed,
            MutationAction::Pending {
                submitted_at: 7,
                variables: json!({"name": "Ada"}),
            },
        );
        assert_eq!(pending.status, MutationStatus::Pending);
        assert_eq!(pending.error, None);
        assert_eq!(pending.data, None);
        assert_eq!(pending.failure_count, 0);
        assert_eq!(pending.submitted_at, Some(7));
    }

    #[test]
    fn test_success_keeps_variables() {
        let pending = reduce(
            &MutationEntry::default(),
            MutationAction::Pending {
                submitted_at: 1,
                variables: json!(5),
            },
        );
        let done = reduce(&pending, MutationAction::Success { data: json!({"id": 1}) });
        assert_eq!(done.variables, Some(json!(5)));
        assert_eq!(done.data, Some(json!({"id": 1})));
        assert!(done.is_success());
    }

    #[test]
    fn test_normalize_error() {
        let strata: BoxError = Box::new(StrataError::auth("nope"));
        assert_eq!(normalize_error(strata), StrataError::auth("nope"));

        let io: BoxError = Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(normalize_error(io).message(), "disk");

        let empty: BoxError = "".into();
        assert_eq!(normalize_error(empty), StrataError::unknown());
    }

    proptest! {
        #[test]
        fn prop_flags_follow_status(actions in prop::collection::vec(arb_action(), 0..20)) {
            let mut entry = MutationEntry::default();
            for action in actions {
                entry = reduce(&entry, action);
                let flags = [entry.is_idle(), entry.is_pending(), entry.is_success(), entry.is_error()];
                prop_assert_eq!(flags.iter().filter(|f| **f).count(), 1);

                let json = serde_json::to_value(&entry).unwrap();
                prop_assert_eq!(json["isIdle"].as_bool(), Some(entry.status == MutationStatus::Idle));
                prop_assert_eq!(json["isPending"].as_bool(), Some(entry.status == MutationStatus::Pending));
                prop_assert_eq!(json["isSuccess"].as_bool(), Some(entry.status == MutationStatus::Success));
                prop_assert_eq!(json["isError"].as_bool(), Some(entry.status == MutationStatus::Error));
            }
        }

        #[test]
        fn prop_reset_is_idempotent(actions in prop::collection::vec(arb_action(), 0..10)) {
            let mut entry = MutationEntry::default();
            for action in actions {
                entry = reduce(&entry, action);
            }
            let once = reduce(&entry, MutationAction::Reset);
            let twice = reduce(&once, MutationAction::Reset);
            prop_assert_eq!(&once, &MutationEntry::default());
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_state_hook_order_matches_state_across_threads() {
        let ctx = ApiContext::builder()
            .transport(Arc::new(strata_testkit::MockTransport::new()))
            .build()
            .unwrap();
        let published = Arc::new(Mutex::new(None::<MutationEntry>));
        let sink = published.clone();
        let config = MutationConfig::new(strata_core::EndpointRef::new("api", "items"), strata_core::ApiMethod::Put)
            .test_mode()
            .on_state_change(move |entry: &MutationEntry| *sink.lock() = Some(entry.clone()));
        let machine = MutationMachine::new("save", config, ctx);

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let machine = machine.clone();
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let vars = json!([worker, round]);
                        futures::executor::block_on(machine.execute(vars, MutateCallbacks::default()))
                            .unwrap();
                        if round % 7 == 0 {
                            machine.reset();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(published.lock().clone(), Some(machine.state()));
    }
}
