//! Scripted transport
//!
//! Replies are chosen per URL: queued one-shot replies first, then a fixed
//! reply, then the fallback. A gated reply holds the request open until the
//! test releases it, which is how tests pick completion order.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use strata_core::{ApiRequest, Result, StrataError, Transport};
use tokio::sync::{oneshot, Notify};

enum Reply {
    Ready(Result<Value>),
    Gated(oneshot::Receiver<Result<Value>>),
}

struct MockState {
    calls: Vec<ApiRequest>,
    queued: HashMap<String, VecDeque<Reply>>,
    fixed: HashMap<String, Result<Value>>,
    fallback: Result<Value>,
}

/// Releases one gated request.
#[derive(Debug)]
pub struct Gate(oneshot::Sender<Result<Value>>);

impl Gate {
    /// Complete the request successfully.
    pub fn resolve(self, body: Value) {
        let _ = self.0.send(Ok(body));
    }

    /// Fail the request.
    pub fn reject(self, error: StrataError) {
        let _ = self.0.send(Err(error));
    }
}

/// Transport answering from a script and recording every request.
pub struct MockTransport {
    state: Mutex<MockState>,
    called: Notify,
}

impl MockTransport {
    /// Every request succeeds with `{}` until scripted otherwise.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                queued: HashMap::new(),
                fixed: HashMap::new(),
                fallback: Ok(json!({})),
            }),
            called: Notify::new(),
        }
    }

    /// Reply used for URLs with nothing scripted.
    pub fn with_fallback(self, reply: Result<Value>) -> Self {
        self.state.lock().fallback = reply;
        self
    }

    /// Answer every request to `url` with `reply`.
    pub fn on(&self, url: impl Into<String>, reply: Result<Value>) {
        self.state.lock().fixed.insert(url.into(), reply);
    }

    /// Answer the next request to `url` with `reply`.
    pub fn push(&self, url: impl Into<String>, reply: Result<Value>) {
        self.state
            .lock()
            .queued
            .entry(url.into())
            .or_default()
            .push_back(Reply::Ready(reply));
    }

    /// Hold the next request to `url` until the returned gate is released.
    pub fn gate(&self, url: impl Into<String>) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .queued
            .entry(url.into())
            .or_default()
            .push_back(Reply::Gated(rx));
        Gate(tx)
    }

    /// Every request seen, in arrival order.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.state.lock().calls.clone()
    }

    /// Requests seen for `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.url == url).count()
    }

    /// Wait until at least `n` requests have arrived.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.lock().calls.len() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.state.lock().calls.len())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value> {
        let reply = {
            let mut state = self.state.lock();
            let url = request.url.clone();
            state.calls.push(request);
            match state.queued.get_mut(&url).and_then(VecDeque::pop_front) {
                Some(reply) => reply,
                None => Reply::Ready(
                    state
                        .fixed
                        .get(&url)
                        .cloned()
                        .unwrap_or_else(|| state.fallback.clone()),
                ),
            }
        };
        self.called.notify_waiters();

        match reply {
            Reply::Ready(result) => result,
            Reply::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(StrataError::transport("gate dropped"))),
        }
    }
}
