//! Notification descriptors
//!
//! Mapping a mutation outcome to a notification is a pure function of the
//! configured descriptor and the outcome. Showing it is a separate effect
//! ([`NotificationSink`](crate::effects::NotificationSink)).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StrataError;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
            Self::Warning => "warning",
        })
    }
}

/// A notification ready to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Text to display
    pub message: String,
    /// Severity
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Auto-hide delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_hide_ms: Option<u64>,
    /// Translation namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    /// Extra presentation fields passed through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Notification {
    /// Notification with only a message and kind.
    pub fn new(message: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            message: message.into(),
            kind,
            auto_hide_ms: None,
            ns: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Caller-supplied notification descriptor. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Text to display; no message means no notification
    pub message: Option<String>,
    /// Severity override
    #[serde(rename = "type")]
    pub kind: Option<NotificationKind>,
    /// Auto-hide delay
    pub auto_hide_ms: Option<u64>,
    /// Translation namespace
    pub ns: Option<String>,
    /// Extra presentation fields
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl NotificationConfig {
    /// Descriptor with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    fn into_notification(self, message: String, fallback_kind: NotificationKind) -> Notification {
        Notification {
            message,
            kind: self.kind.unwrap_or(fallback_kind),
            auto_hide_ms: self.auto_hide_ms,
            ns: self.ns,
            extra: self.extra,
        }
    }
}

/// A static descriptor or a function of the outcome.
pub enum NotificationSpec<T: ?Sized> {
    /// Same descriptor every time
    Static(NotificationConfig),
    /// Descriptor computed from the outcome
    Derived(Arc<dyn Fn(&T) -> NotificationConfig + Send + Sync>),
}

impl<T: ?Sized> NotificationSpec<T> {
    /// Wrap a formatter function.
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&T) -> NotificationConfig + Send + Sync + 'static,
    {
        Self::Derived(Arc::new(f))
    }

    fn resolve(&self, outcome: &T) -> NotificationConfig {
        match self {
            Self::Static(config) => config.clone(),
            Self::Derived(f) => f(outcome),
        }
    }
}

impl<T: ?Sized> Clone for NotificationSpec<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(config) => Self::Static(config.clone()),
            Self::Derived(f) => Self::Derived(f.clone()),
        }
    }
}

impl<T: ?Sized> fmt::Debug for NotificationSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(config) => f.debug_tuple("Static").field(config).finish(),
            Self::Derived(_) => f.write_str("Derived"),
        }
    }
}

/// Success and error descriptors of one mutation.
#[derive(Debug, Clone, Default)]
pub struct MutationNotifications {
    /// Derived from the response payload
    pub success: Option<NotificationSpec<Value>>,
    /// Derived from the error message
    pub error: Option<NotificationSpec<str>>,
}

/// Notification for a successful result, if the descriptor carries a message.
pub fn success_notification(
    spec: Option<&NotificationSpec<Value>>,
    result: &Value,
) -> Option<Notification> {
    let config = spec?.resolve(result);
    let message = config.message.clone().filter(|m| !m.is_empty())?;
    Some(config.into_notification(message, NotificationKind::Success))
}

/// Notification for a failure.
///
/// The message is the descriptor's message, else the error's own message.
/// With neither there is no notification.
pub fn error_notification(
    spec: Option<&NotificationSpec<str>>,
    error: &StrataError,
) -> Option<Notification> {
    let config = spec
        .map(|s| s.resolve(error.message()))
        .unwrap_or_default();
    let message = config
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .or_else(|| Some(error.message().to_string()).filter(|m| !m.is_empty()))?;
    Some(config.into_notification(message, NotificationKind::Error))
}
