//! Dot/bracket paths into scoped entry views
//!
//! Paths like `users.data[0].name` address a value inside the JSON form of a
//! scoped view (`{ logicalKey -> entry }`). Numeric bracket segments are
//! normalized to dot segments, so `a[0].b` and `a.0.b` are the same path.
//!
//! [`EntryPath`] builds the same segment list from typed field enums, so
//! callers that know the entry shape never go through string parsing.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::entry::EntryKind;
use crate::errors::StrataError;

/// A parsed path: an ordered list of object keys or array indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ValuePath {
    segments: Vec<String>,
}

impl ValuePath {
    /// Parse a dot/bracket path. Empty segments are dropped.
    ///
    /// Only numeric bracket segments are normalized; anything else inside
    /// brackets stays part of the surrounding segment text.
    pub fn parse(input: &str) -> Self {
        let normalized = normalize_brackets(input);
        let segments = normalized
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True for the empty path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment (the logical entry key in a scoped view).
    pub fn root(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Append an object key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(key.into());
        self
    }

    /// Append an array index.
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(index.to_string());
        self
    }

    /// Resolve this path against `root`.
    ///
    /// When the first segment is absent and `default_root` is given, the
    /// walk continues inside `default_root`. Absence at any deeper segment
    /// yields `None`.
    pub fn resolve<'a>(&self, root: &'a Value, default_root: Option<&'a Value>) -> Option<&'a Value> {
        if self.segments.is_empty() {
            return None;
        }

        let mut current = root;
        for (index, segment) in self.segments.iter().enumerate() {
            match child(current, segment) {
                Step::Found(next) => current = next,
                Step::Missing if index == 0 && default_root.is_some() => {
                    current = default_root?;
                }
                Step::Missing | Step::NotContainer => return None,
            }
        }
        Some(current)
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for ValuePath {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = Self::parse(s);
        if path.is_empty() {
            return Err(StrataError::invalid(format!("empty path '{s}'")));
        }
        Ok(path)
    }
}

impl From<&str> for ValuePath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for ValuePath {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

enum Step<'a> {
    Found(&'a Value),
    Missing,
    NotContainer,
}

fn child<'a>(current: &'a Value, segment: &str) -> Step<'a> {
    match current {
        Value::Object(map) => map.get(segment).map_or(Step::Missing, Step::Found),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .map_or(Step::Missing, Step::Found),
        _ => Step::NotContainer,
    }
}

/// Rewrite `[123]` as `.123`.
fn normalize_brackets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('[') {
        let (before, after_open) = rest.split_at(open);
        out.push_str(before);
        let inner = &after_open[1..];
        match inner.find(']') {
            Some(close) if close > 0 && inner[..close].bytes().all(|b| b.is_ascii_digit()) => {
                out.push('.');
                out.push_str(&inner[..close]);
                rest = &inner[close + 1..];
            }
            _ => {
                out.push('[');
                rest = inner;
            }
        }
    }
    out.push_str(rest);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed paths
// ─────────────────────────────────────────────────────────────────────────────

/// Fields of a query entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryField {
    /// `data`
    Data,
    /// `isLoading`
    IsLoading,
    /// `isLoadingMapped`
    IsLoadingMapped,
    /// `isFetching`
    IsFetching,
    /// `isPending`
    IsPending,
    /// `isSuccess`
    IsSuccess,
    /// `isError`
    IsError,
    /// `isStale`
    IsStale,
    /// `error`
    Error,
    /// `dataUpdatedAt`
    DataUpdatedAt,
    /// `errorUpdatedAt`
    ErrorUpdatedAt,
    /// `fetchStatus`
    FetchStatus,
}

impl QueryField {
    /// Serialized field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::IsLoading => "isLoading",
            Self::IsLoadingMapped => "isLoadingMapped",
            Self::IsFetching => "isFetching",
            Self::IsPending => "isPending",
            Self::IsSuccess => "isSuccess",
            Self::IsError => "isError",
            Self::IsStale => "isStale",
            Self::Error => "error",
            Self::DataUpdatedAt => "dataUpdatedAt",
            Self::ErrorUpdatedAt => "errorUpdatedAt",
            Self::FetchStatus => "fetchStatus",
        }
    }
}

/// Fields of a mutation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationField {
    /// `data`
    Data,
    /// `status`
    Status,
    /// `error`
    Error,
    /// `variables`
    Variables,
    /// `submittedAt`
    SubmittedAt,
    /// `isIdle`
    IsIdle,
    /// `isPending`
    IsPending,
    /// `isSuccess`
    IsSuccess,
    /// `isError`
    IsError,
    /// `failureCount`
    FailureCount,
    /// `failureReason`
    FailureReason,
    /// `isPaused`
    IsPaused,
}

impl MutationField {
    /// Serialized field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Status => "status",
            Self::Error => "error",
            Self::Variables => "variables",
            Self::SubmittedAt => "submittedAt",
            Self::IsIdle => "isIdle",
            Self::IsPending => "isPending",
            Self::IsSuccess => "isSuccess",
            Self::IsError => "isError",
            Self::FailureCount => "failureCount",
            Self::FailureReason => "failureReason",
            Self::IsPaused => "isPaused",
        }
    }
}

/// A path tagged with the table it reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPath {
    /// Table the path resolves against
    pub kind: EntryKind,
    /// Path inside the scoped view of that table
    pub path: ValuePath,
}

impl EntryPath {
    /// `key.field` in the query table.
    pub fn query(key: impl Into<String>, field: QueryField) -> Self {
        Self {
            kind: EntryKind::Query,
            path: ValuePath::from_segments([key.into(), field.as_str().to_string()]),
        }
    }

    /// `key.field` in the mutation table.
    pub fn mutation(key: impl Into<String>, field: MutationField) -> Self {
        Self {
            kind: EntryKind::Mutation,
            path: ValuePath::from_segments([key.into(), field.as_str().to_string()]),
        }
    }

    /// A whole entry.
    pub fn entry(kind: EntryKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            path: ValuePath::from_segments([key.into()]),
        }
    }

    /// Append an object key below the field.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.path = self.path.key(key);
        self
    }

    /// Append an array index below the field.
    pub fn index(mut self, index: usize) -> Self {
        self.path = self.path.index(index);
        self
    }

    /// Subscription id: `kind:path`.
    pub fn subscription_id(&self) -> String {
        format!("{}:{}", self.kind, self.path)
    }
}
