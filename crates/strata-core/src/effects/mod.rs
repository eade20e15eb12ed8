//! Effect interfaces
//!
//! Pure trait definitions for every side effect the store and the mutation
//! machine perform. This module defines **what** effects exist; handlers in
//! `strata-effects` define **how**, and `strata-testkit` provides
//! deterministic doubles.
//!
//! # Effect Classification
//!
//! - **Infrastructure**: Transport, Socket, Clock
//! - **Host-supplied**: Auth, Notification
//! - **Orchestration**: Invalidation (implemented by the query client in `strata-app`)

pub mod auth;
pub mod invalidation;
pub mod notification;
pub mod socket;
pub mod time;
pub mod transport;

pub use auth::AuthProvider;
pub use invalidation::InvalidationSink;
pub use notification::NotificationSink;
pub use socket::{SocketConnection, SocketEvent, SocketProvider, SocketStatus};
pub use time::Clock;
pub use transport::Transport;
