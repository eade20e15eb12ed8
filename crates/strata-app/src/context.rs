//! Dependency bundle
//!
//! Everything the orchestration layer needs, constructed once by the host
//! and passed by value (every field is an `Arc` or cheap to clone). Tests
//! build their own context around doubles from `strata-testkit`.

use std::sync::Arc;

use serde_json::Value;
use strata_core::{
    ApiConfig, AuthProvider, Clock, EndpointTable, Headers, InvalidationSink, NotificationSink,
    ResultStore, Result, SocketProvider, StrataError, Transport, WebsocketConfig,
};
use strata_effects::{
    HttpTransport, SharedAuthState, SystemClock, TracingNotificationSink, WebSocketProvider,
};

use crate::query_client::QueryClient;

/// Hook receiving every decoded socket message.
pub type MessageHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// Auth provider used when the host supplies none: always authorized.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAuth;

impl AuthProvider for OpenAuth {
    fn is_logged(&self) -> bool {
        true
    }

    fn token(&self) -> Option<String> {
        None
    }
}

/// Shared collaborators of every query, mutation and socket.
#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<ResultStore>,
    pub transport: Arc<dyn Transport>,
    pub auth: Arc<dyn AuthProvider>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
    pub clock: Arc<dyn Clock>,
    pub endpoints: Arc<EndpointTable>,
    pub default_headers: Headers,
    pub sockets: Arc<dyn SocketProvider>,
    pub websocket: WebsocketConfig,
    pub on_socket_message: Option<MessageHook>,
    pub query_client: Arc<QueryClient>,
    pub invalidation: Arc<dyn InvalidationSink>,
}

impl ApiContext {
    pub fn builder() -> ApiContextBuilder {
        ApiContextBuilder::default()
    }

    /// Production wiring from `config`: HTTP transport, websocket provider,
    /// tracing notifications and the system clock.
    pub fn from_config(config: &ApiConfig, auth: Arc<SharedAuthState>) -> Result<Self> {
        config.validate()?;
        Self::builder()
            .transport(Arc::new(HttpTransport::from_config(config)?))
            .auth(auth)
            .notifier(Arc::new(TracingNotificationSink::new()))
            .clock(Arc::new(SystemClock))
            .sockets(Arc::new(WebSocketProvider::default()))
            .config(config)
            .build()
    }

    /// Show `notification` when a sink is installed.
    pub fn notify(&self, notification: strata_core::Notification) {
        match &self.notifier {
            Some(sink) => sink.show(notification),
            None => tracing::debug!(message = %notification.message, "no notification sink installed"),
        }
    }
}

impl std::fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiContext")
            .field("store", &self.store)
            .field("endpoints", &self.endpoints)
            .field("default_headers", &self.default_headers)
            .field("websocket", &self.websocket)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiContext`]. Only the transport is required.
#[derive(Default)]
pub struct ApiContextBuilder {
    store: Option<Arc<ResultStore>>,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
    endpoints: Option<Arc<EndpointTable>>,
    default_headers: Headers,
    sockets: Option<Arc<dyn SocketProvider>>,
    websocket: WebsocketConfig,
    on_socket_message: Option<MessageHook>,
    invalidation: Option<Arc<dyn InvalidationSink>>,
}

impl ApiContextBuilder {
    pub fn store(mut self, store: Arc<ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn endpoints(mut self, endpoints: Arc<EndpointTable>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn sockets(mut self, sockets: Arc<dyn SocketProvider>) -> Self {
        self.sockets = Some(sockets);
        self
    }

    pub fn websocket(mut self, websocket: WebsocketConfig) -> Self {
        self.websocket = websocket;
        self
    }

    /// Global hook called for every socket message, before per-socket hooks.
    pub fn on_socket_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_socket_message = Some(Arc::new(hook));
        self
    }

    /// Replace the query client as the invalidation target.
    pub fn invalidation(mut self, invalidation: Arc<dyn InvalidationSink>) -> Self {
        self.invalidation = Some(invalidation);
        self
    }

    /// Endpoints, default headers and websocket settings from `config`.
    pub fn config(mut self, config: &ApiConfig) -> Self {
        self.endpoints = Some(Arc::new(EndpointTable::new(config.endpoints.clone())));
        self.default_headers = config.default_headers.clone();
        self.websocket = config.websocket.clone();
        self
    }

    pub fn build(self) -> Result<ApiContext> {
        let transport = self
            .transport
            .ok_or_else(|| StrataError::invalid("ApiContext requires a transport"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let query_client = QueryClient::new(clock.clone());
        let invalidation = self
            .invalidation
            .unwrap_or_else(|| query_client.clone() as Arc<dyn InvalidationSink>);

        Ok(ApiContext {
            store: self.store.unwrap_or_else(ResultStore::shared),
            transport,
            auth: self.auth.unwrap_or_else(|| Arc::new(OpenAuth)),
            notifier: self.notifier,
            clock,
            endpoints: self.endpoints.unwrap_or_default(),
            default_headers: self.default_headers,
            sockets: self
                .sockets
                .unwrap_or_else(|| Arc::new(WebSocketProvider::default())),
            websocket: self.websocket,
            on_socket_message: self.on_socket_message,
            query_client,
            invalidation,
        })
    }
}
