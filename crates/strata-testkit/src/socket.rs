//! Scripted socket provider
//!
//! Each `connect` hands the test a driver that plays the server side.

use parking_lot::Mutex;
use strata_core::{SocketConnection, SocketEvent, SocketProvider};
use tokio::sync::mpsc;

/// Server side of one mock connection.
#[derive(Debug)]
pub struct MockSocketDriver {
    pub url: String,
    outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl MockSocketDriver {
    pub fn open(&self) {
        let _ = self.events.send(SocketEvent::Open);
    }

    /// Deliver a raw text frame.
    pub fn message(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Message(text.into()));
    }

    pub fn close(&self) {
        let _ = self.events.send(SocketEvent::Closed);
    }

    /// Next frame the client sent.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outgoing.recv().await
    }

    /// Frames sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outgoing.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Socket provider recording every connect.
#[derive(Debug, Default)]
pub struct MockSocketProvider {
    drivers: Mutex<Vec<MockSocketDriver>>,
    urls: Mutex<Vec<String>>,
}

impl MockSocketProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs connected to, in order.
    pub fn connected_urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    /// Take the driver of the oldest connection not yet taken.
    pub fn take_driver(&self) -> Option<MockSocketDriver> {
        let mut drivers = self.drivers.lock();
        if drivers.is_empty() {
            None
        } else {
            Some(drivers.remove(0))
        }
    }
}

impl SocketProvider for MockSocketProvider {
    fn connect(&self, url: &str) -> SocketConnection {
        let (connection, outgoing, events) = SocketConnection::channel();
        self.urls.lock().push(url.to_string());
        self.drivers.lock().push(MockSocketDriver {
            url: url.to_string(),
            outgoing,
            events,
        });
        connection
    }
}
