//! Transport effect interface
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `strata-effects` (`HttpTransport`)
//! - **Usage**: Mutation machine and query client
//!
//! A transport resolves with the decoded body on success and fails with a
//! [`StrataError`](crate::StrataError) whose `message()` is human-readable.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::request::ApiRequest;

/// Performs one request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the decoded response body.
    async fn request(&self, request: ApiRequest) -> Result<Value>;
}
