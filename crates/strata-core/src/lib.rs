//! Strata Core - scoped result store and effect interfaces
//!
//! Pure types shared by every layer: the composite-keyed result store, the
//! query and mutation entry shapes, path resolution into scoped views, and
//! the effect traits that handlers implement.
//!
//! # Architecture Layers
//!
//! ## Store
//! - `CompositeKey`: `scope:key` physical keys and scoped views
//! - `ResultStore`: query and mutation tables with atomic scope replace
//! - `ValuePath` / `EntryPath`: dot/bracket paths into scoped views
//!
//! ## Effect Interfaces (Pure Signatures)
//! - `Transport`: `request`
//! - `AuthProvider`: `is_logged`, `token`, `validate`
//! - `NotificationSink`, `InvalidationSink`, `SocketProvider`, `Clock`
//!
//! ## Invariants
//! - Mutation status is the single source of truth for its boolean flags
//! - Writes under one scope never alter another scope's view
//! - Readers always observe a whole table snapshot

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Client configuration
pub mod config;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Endpoint table and URL joining
pub mod endpoint;

/// Query and mutation entry shapes
pub mod entry;

/// Unified error handling
pub mod errors;

/// Composite keys and scoped views
pub mod key;

/// Notification descriptors and outcome mapping
pub mod notification;

/// Path resolution into scoped views
pub mod path;

/// Request descriptors
pub mod request;

/// The result store
pub mod store;

pub use config::{ApiConfig, EncryptionConfig, WebsocketConfig};
pub use effects::{
    AuthProvider, Clock, InvalidationSink, NotificationSink, SocketConnection, SocketEvent,
    SocketProvider, SocketStatus, Transport,
};
pub use endpoint::{EndpointRef, EndpointTable};
pub use entry::{
    EntryKind, FetchStatus, MutationEntry, MutationStatus, QueryEntry, RefetchHandle,
};
pub use errors::{Result, StrataError, NOT_AUTHENTICATED, NO_RESPONSE, UNKNOWN_ERROR};
pub use key::{CompositeKey, DEFAULT_SCOPE};
pub use notification::{
    MutationNotifications, Notification, NotificationConfig, NotificationKind, NotificationSpec,
};
pub use path::{EntryPath, MutationField, QueryField, ValuePath};
pub use request::{ApiMethod, ApiRequest, BodyConverter, Headers};
pub use store::ResultStore;
