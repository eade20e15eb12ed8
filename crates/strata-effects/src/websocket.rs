//! WebSocket Socket Handler
//!
//! [`SocketProvider`] over tokio-tungstenite. Each connection runs in its
//! own task that pumps text frames between the socket and the connection
//! channels. Binary frames are forwarded when they are valid UTF-8.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use strata_core::{SocketConnection, SocketEvent, SocketProvider};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// tokio-tungstenite socket provider.
#[derive(Debug, Clone)]
pub struct WebSocketProvider {
    connect_timeout: Duration,
}

impl WebSocketProvider {
    /// Provider with the given handshake timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl SocketProvider for WebSocketProvider {
    fn connect(&self, url: &str) -> SocketConnection {
        let (connection, outgoing, events) = SocketConnection::channel();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_connection(
                    url.to_string(),
                    self.connect_timeout,
                    outgoing,
                    events,
                ));
            }
            Err(_) => {
                tracing::warn!(%url, "websocket connect outside a tokio runtime");
                let _ = events.send(SocketEvent::Closed);
            }
        }
        connection
    }
}

async fn run_connection(
    url: String,
    connect_timeout: Duration,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let parsed = match Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => parsed,
        Ok(parsed) => {
            tracing::warn!(%url, scheme = parsed.scheme(), "not a websocket url");
            let _ = events.send(SocketEvent::Closed);
            return;
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "invalid websocket url");
            let _ = events.send(SocketEvent::Closed);
            return;
        }
    };

    let stream = match timeout(connect_timeout, connect_async(parsed.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(%url, error = %e, "websocket connect failed");
            let _ = events.send(SocketEvent::Closed);
            return;
        }
        Err(_) => {
            tracing::warn!(%url, "websocket connect timeout");
            let _ = events.send(SocketEvent::Closed);
            return;
        }
    };

    tracing::info!(%url, "websocket connected");
    if events.send(SocketEvent::Open).is_err() {
        return;
    }

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!(%url, error = %e, "websocket send failed");
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if events.send(SocketEvent::Message(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if events.send(SocketEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Err(_) => tracing::warn!(%url, "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%url, error = %e, "websocket receive failed");
                    break;
                }
            },
        }
    }

    tracing::info!(%url, "websocket disconnected");
    let _ = events.send(SocketEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_websocket_url_closes() {
        let provider = WebSocketProvider::default();
        let mut conn = provider.connect("http://localhost/socket");
        assert_eq!(conn.events.recv().await, Some(SocketEvent::Closed));
    }

    #[tokio::test]
    async fn test_refused_connection_closes() {
        let provider = WebSocketProvider::new(Duration::from_millis(500));
        let mut conn = provider.connect("ws://127.0.0.1:9/socket");
        assert_eq!(conn.events.recv().await, Some(SocketEvent::Closed));
    }

    #[test]
    fn test_connect_without_runtime_closes() {
        let provider = WebSocketProvider::default();
        let mut conn = provider.connect("ws://localhost/socket");
        assert_eq!(conn.events.try_recv(), Ok(SocketEvent::Closed));
    }
}
