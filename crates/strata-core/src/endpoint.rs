//! Endpoint table
//!
//! Symbolic endpoint keys (e.g. `api`) map to base URLs. Operations name an
//! endpoint as a key plus an optional relative path; the full URL is the
//! base and the path joined with `/`, skipping empty parts.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A symbolic endpoint key with an optional relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    /// Key into the endpoint table
    pub key: String,
    /// Path relative to the base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl EndpointRef {
    /// Base URL only.
    pub fn base(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: None,
        }
    }

    /// Base URL plus a relative path.
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: Some(path.into()),
        }
    }
}

/// Join URL parts with `/`, skipping empty ones.
pub fn join_url(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// Default table: `custom` (empty base, for absolute paths) and `api`.
pub fn default_endpoints() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("custom".to_string(), String::new()),
        ("api".to_string(), "http://localhost:3000".to_string()),
    ])
}

/// Runtime-mutable endpoint table.
#[derive(Debug)]
pub struct EndpointTable {
    entries: RwLock<BTreeMap<String, String>>,
}

impl EndpointTable {
    /// Table seeded with `entries`.
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Shallow-merge `entries` over the current table.
    pub fn set_endpoints(&self, entries: BTreeMap<String, String>) {
        self.entries.write().extend(entries);
    }

    /// Base URL of `key`, if registered.
    pub fn base_url(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Full URL of `endpoint`. An unknown key resolves as an empty base.
    pub fn resolve(&self, endpoint: &EndpointRef) -> String {
        let base = self.base_url(&endpoint.key).unwrap_or_else(|| {
            tracing::warn!(key = %endpoint.key, "unknown endpoint key");
            String::new()
        });
        join_url(&[base.as_str(), endpoint.path.as_deref().unwrap_or("")])
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new(default_endpoints())
    }
}
