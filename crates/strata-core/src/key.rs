//! Composite keys and scoped views
//!
//! Every entry in the result store lives under `scope:key`. A scope is a
//! logical partition of one shared table, not a separate object. The
//! separator is never escaped, so a scope id is assumed not to be a prefix of
//! another scope id followed by the separator.

use std::collections::BTreeMap;
use std::fmt;

/// Separator between the scope id and the logical key.
pub const SEPARATOR: char = ':';

/// Scope used when the caller does not name one.
pub const DEFAULT_SCOPE: &str = "default";

/// A physical store key built from a scope id and a logical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(String);

impl CompositeKey {
    /// Join `scope` and `key` as `scope:key`.
    pub fn new(scope: &str, key: &str) -> Self {
        Self(make(scope, key))
    }

    /// The full `scope:key` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The logical key if this composite key belongs to `scope`.
    pub fn strip_scope(&self, scope: &str) -> Option<&str> {
        strip(&self.0, scope)
    }

    /// Consume into the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CompositeKey> for String {
    fn from(key: CompositeKey) -> Self {
        key.0
    }
}

/// The prefix every composite key of `scope` starts with.
pub fn scope_prefix(scope: &str) -> String {
    let mut prefix = String::with_capacity(scope.len() + 1);
    prefix.push_str(scope);
    prefix.push(SEPARATOR);
    prefix
}

/// Build `scope:key`.
pub fn make(scope: &str, key: &str) -> String {
    let mut out = scope_prefix(scope);
    out.push_str(key);
    out
}

/// Strip `scope:` from `composite`, or `None` if it belongs to another scope.
pub fn strip<'a>(composite: &'a str, scope: &str) -> Option<&'a str> {
    composite
        .strip_prefix(scope)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
}

/// Derived read-only view of `table` for `scope`, keyed by logical key.
pub fn scoped_view<V: Clone>(table: &BTreeMap<String, V>, scope: &str) -> BTreeMap<String, V> {
    let prefix = scope_prefix(scope);
    table
        .range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .map(|(k, v)| (k[prefix.len()..].to_string(), v.clone()))
        .collect()
}

/// A new table equal to `table` with every `scope:*` entry removed and
/// `scope:k -> v` inserted for each entry of `entries`.
pub fn replace_scoped_view<V: Clone>(
    table: &BTreeMap<String, V>,
    scope: &str,
    entries: BTreeMap<String, V>,
) -> BTreeMap<String, V> {
    let prefix = scope_prefix(scope);
    let mut next: BTreeMap<String, V> = table
        .iter()
        .filter(|(k, _)| !k.starts_with(&prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in entries {
        next.insert(make(scope, &key), value);
    }
    next
}
