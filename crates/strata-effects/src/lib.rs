//! Strata Effects - production effect handlers
//!
//! Implementations of the `strata-core` effect traits backed by real I/O:
//! reqwest for HTTP, tokio-tungstenite for realtime sockets, the system
//! clock, and tokio file I/O with AES-GCM for persistence.
//!
//! Deterministic doubles live in `strata-testkit`, not here.

#![forbid(unsafe_code)]

/// Host-settable auth state
pub mod auth;

/// AES-GCM encryption of persisted JSON
pub mod encryption;

/// Default HTTP transport
pub mod http;

/// Tracing-backed notification sink
pub mod notify;

/// File persistence of the query table
pub mod persistence;

/// System clock
pub mod time;

/// WebSocket socket provider
pub mod websocket;

pub use auth::SharedAuthState;
pub use encryption::{decrypt_json, encrypt_json};
pub use http::HttpTransport;
pub use notify::TracingNotificationSink;
pub use persistence::QueryPersistence;
pub use time::SystemClock;
pub use websocket::WebSocketProvider;
