//! Recording notification and invalidation sinks

use async_trait::async_trait;
use parking_lot::Mutex;
use strata_core::{InvalidationSink, Notification, NotificationSink};

/// Keeps every notification shown.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.shown.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.shown.lock().clear();
    }
}

impl NotificationSink for RecordingNotifier {
    fn show(&self, notification: Notification) {
        self.shown.lock().push(notification);
    }
}

/// Keeps every invalidation request.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per `invalidate` call.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// Every prefix ever invalidated, in order.
    pub fn prefixes(&self) -> Vec<String> {
        self.calls.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl InvalidationSink for RecordingInvalidator {
    async fn invalidate(&self, prefixes: &[String]) {
        self.calls.lock().push(prefixes.to_vec());
    }
}
