//! Request descriptors handed to a [`Transport`](crate::effects::Transport)

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header name -> value.
pub type Headers = BTreeMap<String, String>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ApiMethod {
    /// Uppercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transforms a request body right before it is sent.
#[derive(Clone)]
pub struct BodyConverter(Arc<dyn Fn(Value) -> Value + Send + Sync>);

impl BodyConverter {
    /// Wrap a conversion function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Apply the conversion.
    pub fn apply(&self, body: Value) -> Value {
        (self.0)(body)
    }
}

impl fmt::Debug for BodyConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyConverter")
    }
}

/// One request for the transport.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// Fully resolved URL
    pub url: String,
    /// HTTP method
    pub method: ApiMethod,
    /// Request payload
    pub body: Option<Value>,
    /// Merged headers
    pub headers: Headers,
    /// Optional body conversion
    pub converter: Option<BodyConverter>,
}

impl ApiRequest {
    /// A GET request without a body.
    pub fn get(url: impl Into<String>, headers: Headers) -> Self {
        Self {
            url: url.into(),
            method: ApiMethod::Get,
            headers,
            ..Self::default()
        }
    }
}

/// Default headers overlaid with per-call headers; per-call values win.
///
/// Names compare case-insensitively, so `content-type` replaces a default
/// `Content-Type` instead of sitting next to it.
pub fn merge_headers(defaults: &Headers, overrides: &Headers) -> Headers {
    let mut merged: Headers = defaults
        .iter()
        .filter(|(name, _)| !overrides.keys().any(|o| o.eq_ignore_ascii_case(name)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
