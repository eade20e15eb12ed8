//! Query and mutation entries
//!
//! An entry is the last observed state of one asynchronous operation. Entries
//! serialize with camelCase field names; that JSON shape is what store paths
//! such as `users.isLoading` or `createUser.error.message` resolve against,
//! and what the query table is persisted as.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StrataError;

/// Which of the two result tables an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Query-shaped results
    Query,
    /// Mutation-shaped results
    Mutation,
}

impl EntryKind {
    /// Lowercase name used in subscription ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }

    /// JSON form of this kind's default entry.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Query => default_query_value(),
            Self::Mutation => default_mutation_value(),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query entries
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the underlying fetch is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Nothing in flight
    #[default]
    Idle,
    /// A fetch is in flight
    Fetching,
    /// A fetch is wanted but cannot run (disabled or unauthenticated)
    Paused,
}

/// Callable handle that re-runs the fetch behind a query entry.
///
/// Handles are not serialized. Entries rehydrated from persistence carry no
/// handle until the owning query is declared again.
#[derive(Clone)]
pub struct RefetchHandle(Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>);

impl RefetchHandle {
    /// Wrap a refetch closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Start a refetch.
    pub fn call(&self) -> BoxFuture<'static, ()> {
        (self.0)()
    }
}

impl fmt::Debug for RefetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefetchHandle")
    }
}

/// Last known state of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEntry {
    /// Last successfully fetched payload
    #[serde(default)]
    pub data: Option<Value>,
    /// First load in flight with no data yet
    #[serde(default)]
    pub is_loading: bool,
    /// `is_loading` unless the query opted out of loading indicators
    #[serde(default)]
    pub is_loading_mapped: bool,
    /// Any fetch in flight, including background refetches
    #[serde(default)]
    pub is_fetching: bool,
    /// No data has been received yet
    #[serde(default)]
    pub is_pending: bool,
    /// Last fetch succeeded
    #[serde(default)]
    pub is_success: bool,
    /// Last fetch failed
    #[serde(default)]
    pub is_error: bool,
    /// Marked stale by invalidation
    #[serde(default)]
    pub is_stale: bool,
    /// Error of the last failed fetch
    #[serde(default)]
    pub error: Option<StrataError>,
    /// Millisecond timestamp of the last successful fetch
    #[serde(default)]
    pub data_updated_at: u64,
    /// Millisecond timestamp of the last failed fetch
    #[serde(default)]
    pub error_updated_at: u64,
    /// Whether a fetch is running
    #[serde(default)]
    pub fetch_status: FetchStatus,
    /// Re-run the fetch behind this entry
    #[serde(skip)]
    pub refetch: Option<RefetchHandle>,
}

impl Default for QueryEntry {
    /// Inert, never-loading empty result.
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_loading_mapped: false,
            is_fetching: false,
            is_pending: false,
            is_success: false,
            is_error: false,
            is_stale: false,
            error: None,
            data_updated_at: 0,
            error_updated_at: 0,
            fetch_status: FetchStatus::Idle,
            refetch: None,
        }
    }
}

impl PartialEq for QueryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.is_loading == other.is_loading
            && self.is_loading_mapped == other.is_loading_mapped
            && self.is_fetching == other.is_fetching
            && self.is_pending == other.is_pending
            && self.is_success == other.is_success
            && self.is_error == other.is_error
            && self.is_stale == other.is_stale
            && self.error == other.error
            && self.data_updated_at == other.data_updated_at
            && self.error_updated_at == other.error_updated_at
            && self.fetch_status == other.fetch_status
    }
}

impl QueryEntry {
    /// Entry of a query that has been declared but has never fetched.
    pub fn pending() -> Self {
        Self {
            is_pending: true,
            ..Self::default()
        }
    }

    /// Transition into an in-flight fetch. Previous data is kept.
    pub fn start_fetch(&self, disable_loading: bool) -> Self {
        let is_loading = self.data.is_none();
        Self {
            is_loading,
            is_loading_mapped: is_loading && !disable_loading,
            is_fetching: true,
            is_pending: self.data.is_none(),
            fetch_status: FetchStatus::Fetching,
            ..self.clone()
        }
    }

    /// Transition into a successful fetch.
    pub fn succeed(&self, data: Value, at: u64) -> Self {
        Self {
            data: Some(data),
            is_loading: false,
            is_loading_mapped: false,
            is_fetching: false,
            is_pending: false,
            is_success: true,
            is_error: false,
            is_stale: false,
            error: None,
            data_updated_at: at,
            fetch_status: FetchStatus::Idle,
            ..self.clone()
        }
    }

    /// Transition into a failed fetch. Previously fetched data stays cached.
    pub fn fail(&self, error: StrataError, at: u64) -> Self {
        Self {
            is_loading: false,
            is_loading_mapped: false,
            is_fetching: false,
            is_success: false,
            is_error: true,
            error: Some(error),
            error_updated_at: at,
            fetch_status: FetchStatus::Idle,
            ..self.clone()
        }
    }

    /// Mark the entry stale.
    pub fn mark_stale(&self) -> Self {
        Self {
            is_stale: true,
            ..self.clone()
        }
    }

    /// Attach a refetch handle.
    pub fn with_refetch(mut self, refetch: RefetchHandle) -> Self {
        self.refetch = Some(refetch);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutation entries
// ─────────────────────────────────────────────────────────────────────────────

/// Mutation lifecycle status. The single source of truth for the flag
/// projections of a [`MutationEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Never run, or reset
    #[default]
    Idle,
    /// Execution in flight
    Pending,
    /// Last execution succeeded
    Success,
    /// Last execution failed
    Error,
}

impl MutationStatus {
    /// Lowercase name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of one mutation.
///
/// The `is_*` flags are not stored; they are derived from `status` on every
/// read and on serialization, and ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "MutationEntryRepr", from = "MutationEntryRepr")]
pub struct MutationEntry {
    /// Result of the last successful execution
    pub data: Option<Value>,
    /// Lifecycle status
    pub status: MutationStatus,
    /// Error of the last failed execution
    pub error: Option<StrataError>,
    /// Variables of the last submitted execution
    pub variables: Option<Value>,
    /// Millisecond timestamp of the last submission
    pub submitted_at: Option<u64>,
    /// Failures since the last submission
    pub failure_count: u32,
    /// Error behind the last failure
    pub failure_reason: Option<StrataError>,
    /// Never set by this executor; kept for shape compatibility
    pub is_paused: bool,
}

impl MutationEntry {
    /// True when `status` is idle.
    pub fn is_idle(&self) -> bool {
        self.status == MutationStatus::Idle
    }

    /// True when `status` is pending.
    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }

    /// True when `status` is success.
    pub fn is_success(&self) -> bool {
        self.status == MutationStatus::Success
    }

    /// True when `status` is error.
    pub fn is_error(&self) -> bool {
        self.status == MutationStatus::Error
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationEntryRepr {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    status: MutationStatus,
    #[serde(default)]
    error: Option<StrataError>,
    #[serde(default)]
    variables: Option<Value>,
    #[serde(default)]
    submitted_at: Option<u64>,
    #[serde(default)]
    is_idle: bool,
    #[serde(default)]
    is_pending: bool,
    #[serde(default)]
    is_success: bool,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    failure_count: u32,
    #[serde(default)]
    failure_reason: Option<StrataError>,
    #[serde(default)]
    is_paused: bool,
}

impl From<MutationEntry> for MutationEntryRepr {
    fn from(entry: MutationEntry) -> Self {
        Self {
            is_idle: entry.is_idle(),
            is_pending: entry.is_pending(),
            is_success: entry.is_success(),
            is_error: entry.is_error(),
            data: entry.data,
            status: entry.status,
            error: entry.error,
            variables: entry.variables,
            submitted_at: entry.submitted_at,
            failure_count: entry.failure_count,
            failure_reason: entry.failure_reason,
            is_paused: entry.is_paused,
        }
    }
}

impl From<MutationEntryRepr> for MutationEntry {
    fn from(repr: MutationEntryRepr) -> Self {
        Self {
            data: repr.data,
            status: repr.status,
            error: repr.error,
            variables: repr.variables,
            submitted_at: repr.submitted_at,
            failure_count: repr.failure_count,
            failure_reason: repr.failure_reason,
            is_paused: repr.is_paused,
        }
    }
}

/// JSON form of the default query entry, used for root-missing paths.
pub fn default_query_value() -> Value {
    serde_json::to_value(QueryEntry::default()).unwrap_or(Value::Null)
}

/// JSON form of the default mutation entry, used for root-missing paths.
pub fn default_mutation_value() -> Value {
    serde_json::to_value(MutationEntry::default()).unwrap_or(Value::Null)
}
