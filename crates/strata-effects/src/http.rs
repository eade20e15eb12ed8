//! HTTP Transport Handler
//!
//! Default [`Transport`] over reqwest. Before sending, the request is shaped:
//! - a primitive body on a non-POST request becomes a trailing URL segment
//! - `:name` placeholders in the URL are filled from same-named fields of an
//!   object body, and those fields leave the body
//! - the optional converter runs on whatever body remains
//!
//! Failures carry the server's `message` or `error` body field, else
//! `Error {status}`; no response at all maps to a fixed network message.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strata_core::request::merge_headers;
use strata_core::{
    ApiConfig, ApiMethod, ApiRequest, Headers, Result, StrataError, Transport, NO_RESPONSE,
};

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    default_headers: Headers,
}

impl HttpTransport {
    /// Transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StrataError::invalid(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            default_headers: Headers::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
        })
    }

    /// Transport configured from `config`.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(Duration::from_millis(config.request_timeout_ms))
    }

    /// Built-in headers overlaid with the request's own; the request wins.
    pub fn headers_for(&self, headers: &Headers) -> Headers {
        merge_headers(&self.default_headers, headers)
    }

    fn method(method: ApiMethod) -> reqwest::Method {
        match method {
            ApiMethod::Get => reqwest::Method::GET,
            ApiMethod::Post => reqwest::Method::POST,
            ApiMethod::Put => reqwest::Method::PUT,
            ApiMethod::Patch => reqwest::Method::PATCH,
            ApiMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value> {
        let ApiRequest {
            url,
            method,
            body,
            headers,
            converter,
        } = request;

        let (url, body) = shape_request(method, &url, body);
        let body = match (converter, body) {
            (Some(converter), Some(body)) => Some(converter.apply(body)),
            (_, body) => body,
        };

        let target = url::Url::parse(&url).map_err(|e| {
            tracing::error!(%method, %url, error = %e, "invalid request url");
            StrataError::transport(format!("Invalid URL {url}: {e}"))
        })?;
        let mut builder = self.client.request(Self::method(method), target);
        for (name, value) in &self.headers_for(&headers) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        tracing::debug!(%method, %url, "sending request");
        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                tracing::error!(%method, %url, error = %e, "request configuration error");
                StrataError::transport("Request configuration error")
            } else {
                tracing::error!(%method, %url, error = %e, "no response");
                StrataError::transport(NO_RESPONSE)
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|_| StrataError::transport(NO_RESPONSE))?;
        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            Ok(payload)
        } else {
            let message = error_message(status.as_u16(), &payload);
            tracing::error!(%method, %url, status = status.as_u16(), %message, "request failed");
            Err(StrataError::http_status(status.as_u16(), message))
        }
    }
}

/// Apply URL shaping and return the final URL and body.
pub fn shape_request(method: ApiMethod, url: &str, body: Option<Value>) -> (String, Option<Value>) {
    match body {
        Some(primitive @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
            if method != ApiMethod::Post && is_truthy(&primitive) {
                (format!("{url}/{}", primitive_segment(&primitive)), None)
            } else {
                (url.to_string(), Some(primitive))
            }
        }
        Some(Value::Object(fields)) => {
            let (url, fields) = fill_path_params(url, fields);
            (url, Some(Value::Object(fields)))
        }
        Some(Value::Null) | None => (url.to_string(), None),
        Some(other) => (url.to_string(), Some(other)),
    }
}

/// Failure message from a response body.
pub fn error_message(status: u16, body: &Value) -> String {
    ["message", "error"]
        .iter()
        .filter_map(|field| body.get(field))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null | Value::Bool(false) | Value::String(_) => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| format!("Error {status}"))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Bool(b) => *b,
        _ => false,
    }
}

fn primitive_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fill_path_params(url: &str, mut fields: Map<String, Value>) -> (String, Map<String, Value>) {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(colon) = rest.find(':') {
        let (before, after) = rest.split_at(colon);
        out.push_str(before);
        let name_len = after[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len() - 1);
        let name = &after[1..1 + name_len];
        let value = if name.is_empty() { None } else { fields.remove(name) };
        match value {
            Some(value) => out.push_str(&primitive_segment(&value)),
            None => out.push_str(&after[..1 + name_len]),
        }
        rest = &after[1 + name_len..];
    }
    out.push_str(rest);
    (out, fields)
}
