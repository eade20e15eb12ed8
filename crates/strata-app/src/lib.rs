//! Strata App - query, mutation and socket orchestration
//!
//! Drives the effect handlers from `strata-core` and records every outcome
//! in the scoped [`ResultStore`](strata_core::ResultStore).
//!
//! # Components
//!
//! - `QueryClient`: query executor with prefix invalidation
//! - `MultiQuery`: declared queries folded into one combined map
//! - `MutationMachine` / `MutationSet`: per-key mutation state machines
//! - `FineGrainedReader`: path reads with precise change detection
//! - `MultiSocket`: per-key realtime connections
//! - `Api`: all of the above wired to one scope
//!
//! Construction takes an [`ApiContext`] built once by the host; nothing in
//! this crate is a process-wide singleton.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Single-scope facade
pub mod api;

/// Multi-query combiner
pub mod combiner;

/// Dependency bundle
pub mod context;

/// Mutation state machines
pub mod machine;

/// Query executor
pub mod query_client;

/// Fine-grained store reader
pub mod reader;

/// Realtime sockets
pub mod socket;

pub use api::{Api, ApiItem, ApiOptions};
pub use combiner::{combine, is_enabled, CombinedEntry, MultiQuery, QuerySpec};
pub use context::{ApiContext, ApiContextBuilder, MessageHook, OpenAuth};
pub use machine::{
    normalize_error, reduce, BoxError, MutateCallbacks, MutationAction, MutationConfig,
    MutationMachine, MutationSet, TEST_RESPONSE,
};
pub use query_client::{matches_prefix, QueryClient, QueryFn, QueryKey, QueryOptions};
pub use reader::FineGrainedReader;
pub use socket::{MultiSocket, SocketHandle, SocketSnapshot, SocketSpec};
