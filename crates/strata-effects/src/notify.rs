//! Notification sink that writes to the tracing pipeline

use strata_core::{Notification, NotificationKind, NotificationSink};

/// Emits each notification as a tracing event.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

impl TracingNotificationSink {
    /// Create the sink.
    pub fn new() -> Self {
        Self
    }
}

impl NotificationSink for TracingNotificationSink {
    fn show(&self, notification: Notification) {
        let Notification {
            message, kind, ns, ..
        } = notification;
        let ns = ns.unwrap_or_default();
        match kind {
            NotificationKind::Error => tracing::error!(target: "strata::notification", %ns, "{message}"),
            NotificationKind::Warning => tracing::warn!(target: "strata::notification", %ns, "{message}"),
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(target: "strata::notification", %kind, %ns, "{message}")
            }
        }
    }
}
