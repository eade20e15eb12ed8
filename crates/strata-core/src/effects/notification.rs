//! Notification effect interface
//!
//! # Effect Classification
//!
//! - **Category**: Host-supplied Effect
//! - **Implementation**: `strata-effects` (`TracingNotificationSink`)
//!
//! Showing is fire-and-forget: a sink never fails the operation that
//! produced the notification.

use crate::notification::Notification;

/// Displays notifications to the user.
pub trait NotificationSink: Send + Sync {
    /// Show `notification`.
    fn show(&self, notification: Notification);
}
