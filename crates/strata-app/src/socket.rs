//! Realtime sockets
//!
//! One connection per declared socket key. A socket connects only when it
//! has a URL (its own endpoint or the configured default), is not opted out
//! with `auto_connect = false`, and either names its own endpoint or the
//! configuration enables auto-connect.
//!
//! Each connection is pumped by a task that decodes text frames as JSON,
//! records the last message, runs the global then the per-socket hook, and
//! forwards the socket's invalidation prefixes. Frames that are not JSON are
//! logged and dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use strata_core::{SocketEvent, SocketStatus, StrataError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::context::{ApiContext, MessageHook};

/// Declaration of one socket.
#[derive(Clone, Default)]
pub struct SocketSpec {
    pub key: String,
    /// URL of this socket; the configured default URL otherwise
    pub endpoint: Option<String>,
    /// `Some(false)` never connects
    pub auto_connect: Option<bool>,
    pub on_message: Option<MessageHook>,
    /// Query key prefixes invalidated on every message
    pub invalidate_queries_on_message: Vec<String>,
}

impl SocketSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = Some(auto_connect);
        self
    }

    pub fn on_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(hook));
        self
    }

    pub fn invalidate_on_message<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate_queries_on_message = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// URL this socket would connect to.
    pub fn url(&self, ctx: &ApiContext) -> Option<String> {
        self.endpoint
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| ctx.websocket.url.clone())
            .filter(|u| !u.is_empty())
    }

    /// Whether this socket connects on creation.
    pub fn should_connect(&self, ctx: &ApiContext) -> bool {
        let has_endpoint = self.endpoint.as_deref().is_some_and(|e| !e.is_empty());
        self.auto_connect != Some(false)
            && (ctx.websocket.auto_connect || has_endpoint)
            && self.url(ctx).is_some()
    }
}

impl std::fmt::Debug for SocketSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSpec")
            .field("key", &self.key)
            .field("endpoint", &self.endpoint)
            .field("auto_connect", &self.auto_connect)
            .field("invalidate_queries_on_message", &self.invalidate_queries_on_message)
            .finish_non_exhaustive()
    }
}

/// Observable state of one socket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketSnapshot {
    pub status: SocketStatus,
    pub last_message: Option<Value>,
    /// Decoded messages so far
    pub received: u64,
}

/// One declared socket.
#[derive(Debug)]
pub struct SocketHandle {
    key: String,
    url: Option<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    state: watch::Receiver<SocketSnapshot>,
    pump: Option<JoinHandle<()>>,
}

impl SocketHandle {
    fn connect(spec: &SocketSpec, ctx: &ApiContext) -> Self {
        let url = spec.url(ctx);
        let (state_tx, state) = watch::channel(SocketSnapshot::default());

        let target = match &url {
            Some(target) if spec.should_connect(ctx) => target.clone(),
            _ => {
                tracing::debug!(key = %spec.key, "socket not connecting");
                return Self {
                    key: spec.key.clone(),
                    url,
                    outgoing: None,
                    state,
                    pump: None,
                };
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(key = %spec.key, "socket declared outside a tokio runtime");
                return Self {
                    key: spec.key.clone(),
                    url,
                    outgoing: None,
                    state,
                    pump: None,
                };
            }
        };

        state_tx.send_modify(|s| s.status = SocketStatus::Connecting);
        tracing::info!(key = %spec.key, url = %target, "socket connecting");
        let connection = ctx.sockets.connect(&target);
        let pump = handle.spawn(run_socket(spec.clone(), ctx.clone(), connection.events, state_tx));

        Self {
            key: spec.key.clone(),
            url,
            outgoing: Some(connection.outgoing),
            state,
            pump: Some(pump),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn status(&self) -> SocketStatus {
        self.state.borrow().status
    }

    pub fn last_message(&self) -> Option<Value> {
        self.state.borrow().last_message.clone()
    }

    pub fn snapshot(&self) -> SocketSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver of every state change.
    pub fn watch(&self) -> watch::Receiver<SocketSnapshot> {
        self.state.clone()
    }

    /// Serialize `message` as JSON and send it. Dropped with a warning
    /// unless the socket is open.
    pub fn send_message(&self, message: &Value) -> bool {
        let outgoing = match &self.outgoing {
            Some(outgoing) if self.status() == SocketStatus::Open => outgoing,
            _ => {
                tracing::warn!(key = %self.key, status = %self.status(), "socket is not open");
                return false;
            }
        };
        match serde_json::to_string(message) {
            Ok(text) => outgoing.send(text).is_ok(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "socket message not serializable");
                false
            }
        }
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Option<SocketSnapshot>
    where
        F: FnMut(&SocketSnapshot) -> bool,
    {
        let mut state = self.state.clone();
        let snapshot = state.wait_for(predicate).await.ok()?;
        Some(snapshot.clone())
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn run_socket(
    spec: SocketSpec,
    ctx: ApiContext,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    state: watch::Sender<SocketSnapshot>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Open => {
                state.send_modify(|s| s.status = SocketStatus::Open);
                tracing::info!(key = %spec.key, "socket connected");
            }
            SocketEvent::Message(text) => {
                let data: Value = match serde_json::from_str(&text) {
                    Ok(data) => data,
                    Err(e) => {
                        let error = StrataError::parse(e.to_string());
                        tracing::warn!(key = %spec.key, error = %error, "socket message dropped");
                        continue;
                    }
                };
                state.send_modify(|s| {
                    s.last_message = Some(data.clone());
                    s.received += 1;
                });
                if let Some(hook) = &ctx.on_socket_message {
                    hook(&data);
                }
                if let Some(hook) = &spec.on_message {
                    hook(&data);
                }
                if !spec.invalidate_queries_on_message.is_empty() {
                    ctx.invalidation
                        .invalidate(&spec.invalidate_queries_on_message)
                        .await;
                }
            }
            SocketEvent::Closed => break,
        }
    }
    state.send_modify(|s| s.status = SocketStatus::Closed);
    tracing::info!(key = %spec.key, "socket disconnected");
}

/// Sockets keyed by logical key.
#[derive(Debug, Default)]
pub struct MultiSocket {
    sockets: BTreeMap<String, SocketHandle>,
}

impl MultiSocket {
    /// Declare `specs`. A key declared twice keeps its first socket.
    pub fn new(ctx: &ApiContext, specs: Vec<SocketSpec>) -> Self {
        let mut sockets = BTreeMap::new();
        for spec in specs {
            if sockets.contains_key(&spec.key) {
                tracing::debug!(key = %spec.key, "socket already declared");
                continue;
            }
            sockets.insert(spec.key.clone(), SocketHandle::connect(&spec, ctx));
        }
        Self { sockets }
    }

    pub fn get(&self, key: &str) -> Option<&SocketHandle> {
        self.sockets.get(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.sockets.keys().cloned().collect()
    }

    pub fn status(&self, key: &str) -> SocketStatus {
        self.get(key).map_or(SocketStatus::Closed, SocketHandle::status)
    }

    pub fn last_message(&self, key: &str) -> Option<Value> {
        self.get(key).and_then(SocketHandle::last_message)
    }

    /// Send on the socket of `key`.
    pub fn send_message(&self, key: &str, message: &Value) -> bool {
        match self.get(key) {
            Some(socket) => socket.send_message(message),
            None => {
                tracing::warn!(%key, "unknown socket");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::WebsocketConfig;
    use strata_testkit::{MockSocketProvider, MockTransport};

    fn context(sockets: Arc<MockSocketProvider>, websocket: WebsocketConfig) -> ApiContext {
        ApiContext::builder()
            .transport(Arc::new(MockTransport::new()))
            .sockets(sockets)
            .websocket(websocket)
            .build()
            .unwrap()
    }

    #[test]
    fn test_connect_rules() {
        let ctx = context(Arc::new(MockSocketProvider::new()), WebsocketConfig::default());
        assert!(!SocketSpec::new("a").should_connect(&ctx));
        assert!(SocketSpec::new("a").endpoint("ws://x").should_connect(&ctx));
        assert!(!SocketSpec::new("a").endpoint("ws://x").auto_connect(false).should_connect(&ctx));

        let ctx = context(
            Arc::new(MockSocketProvider::new()),
            WebsocketConfig {
                url: Some("ws://default".into()),
                auto_connect: true,
            },
        );
        let spec = SocketSpec::new("a");
        assert!(spec.should_connect(&ctx));
        assert_eq!(spec.url(&ctx).as_deref(), Some("ws://default"));
        assert_eq!(spec.endpoint("ws://own").url(&ctx).as_deref(), Some("ws://own"));
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let provider = Arc::new(MockSocketProvider::new());
        let ctx = context(provider.clone(), WebsocketConfig::default());
        let sockets = MultiSocket::new(&ctx, vec![SocketSpec::new("feed").endpoint("ws://feed")]);
        let mut driver = provider.take_driver().unwrap();

        assert_eq!(sockets.status("feed"), SocketStatus::Connecting);
        assert!(!sockets.send_message("feed", &serde_json::json!({"ping": 1})));

        driver.open();
        let socket = sockets.get("feed").unwrap();
        socket.wait_for(|s| s.status == SocketStatus::Open).await.unwrap();
        assert!(socket.send_message(&serde_json::json!({"ping": 1})));
        assert_eq!(driver.next_sent().await.as_deref(), Some(r#"{"ping":1}"#));
    }

    #[tokio::test]
    async fn test_undeclared_socket_is_closed() {
        let ctx = context(Arc::new(MockSocketProvider::new()), WebsocketConfig::default());
        let sockets = MultiSocket::new(&ctx, vec![SocketSpec::new("idle")]);
        assert_eq!(sockets.status("idle"), SocketStatus::Closed);
        assert_eq!(sockets.status("missing"), SocketStatus::Closed);
        assert!(!sockets.send_message("missing", &Value::Null));
    }
}
