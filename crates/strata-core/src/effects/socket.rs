//! Realtime socket effect interface
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `strata-effects` (`WebSocketProvider`)
//!
//! A connection is a pair of channels. Raw text frames flow both ways;
//! decoding them is up to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketStatus {
    Connecting,
    Open,
    #[default]
    Closed,
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed
    Open,
    /// A text frame arrived
    Message(String),
    /// The connection ended, for whatever reason
    Closed,
}

/// Handle to one connection.
#[derive(Debug)]
pub struct SocketConnection {
    /// Text frames to send
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Events from the peer, ending after [`SocketEvent::Closed`]
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketConnection {
    /// Connected channel pairs: the connection and the driver's ends.
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<SocketEvent>,
    ) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        (Self { outgoing, events }, outgoing_rx, events_tx)
    }
}

/// Opens realtime connections.
pub trait SocketProvider: Send + Sync {
    /// Start connecting to `url`. Progress arrives on the returned events.
    fn connect(&self, url: &str) -> SocketConnection;
}
