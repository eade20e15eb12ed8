//! Invalidation effect interface
//!
//! # Effect Classification
//!
//! - **Category**: Orchestration Effect
//! - **Implementation**: `strata-app` (`QueryClient`)

use async_trait::async_trait;

/// Marks previously fetched data stale.
#[async_trait]
pub trait InvalidationSink: Send + Sync {
    /// Invalidate every query whose key starts with one of `prefixes`.
    ///
    /// Matching is by prefix, never exact.
    async fn invalidate(&self, prefixes: &[String]);
}
