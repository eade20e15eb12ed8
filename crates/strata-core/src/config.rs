//! Client configuration
//!
//! Loaded from TOML or JSON, overlaid with `STRATA_*` environment variables,
//! then validated before use.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::endpoint::default_endpoints;
use crate::errors::{Result, StrataError};
use crate::request::Headers;

/// Environment variable overriding the `api` endpoint.
pub const ENV_API_URL: &str = "STRATA_API_URL";
/// Environment variable overriding the default websocket URL.
pub const ENV_WS_URL: &str = "STRATA_WS_URL";
/// Environment variable overriding the request timeout.
pub const ENV_TIMEOUT_MS: &str = "STRATA_TIMEOUT_MS";
/// Environment variable supplying the persistence secret.
pub const ENV_ENCRYPTION_KEY: &str = "STRATA_ENCRYPTION_KEY";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default websocket connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsocketConfig {
    /// URL used by sockets that declare no endpoint
    pub url: Option<String>,
    /// Connect sockets without an explicit endpoint
    pub auto_connect: bool,
}

/// Persistence encryption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Secret the AES key is derived from
    pub secret_key: Option<String>,
    /// Encrypt persisted state
    pub enabled: bool,
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Symbolic endpoint key -> base URL
    pub endpoints: BTreeMap<String, String>,
    /// Headers sent with every request
    pub default_headers: Headers,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Default websocket connection
    pub websocket: WebsocketConfig,
    /// Persistence encryption
    pub encryption: EncryptionConfig,
    /// Persist the query table between runs
    pub persist_queries: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            default_headers: Headers::new(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            websocket: WebsocketConfig::default(),
            encryption: EncryptionConfig::default(),
            persist_queries: false,
        }
    }
}

impl ApiConfig {
    /// Parse TOML. Missing endpoint keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(input)?;
        Ok(parsed.with_default_endpoints())
    }

    /// Parse JSON. Missing endpoint keys keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(input)
            .map_err(|e| StrataError::invalid(format!("Invalid JSON: {e}")))?;
        Ok(parsed.with_default_endpoints())
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::storage(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Overlay `STRATA_*` variables from the process environment.
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Overlay `STRATA_*` variables from `vars`.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value = value.into();
            match key.as_ref() {
                ENV_API_URL => {
                    self.endpoints.insert("api".to_string(), value);
                }
                ENV_WS_URL => self.websocket.url = Some(value),
                ENV_TIMEOUT_MS => {
                    self.request_timeout_ms = value.trim().parse().map_err(|_| {
                        StrataError::invalid(format!("{ENV_TIMEOUT_MS} is not a number: {value}"))
                    })?;
                }
                ENV_ENCRYPTION_KEY => self.encryption.secret_key = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(StrataError::invalid("request_timeout_ms must be greater than 0"));
        }
        if self.encryption.enabled && self.encryption_key().is_none() {
            return Err(StrataError::invalid(
                "encryption is enabled but no secret_key is set",
            ));
        }
        if self.websocket.auto_connect && self.websocket.url.as_deref().unwrap_or("").is_empty() {
            return Err(StrataError::invalid(
                "websocket.auto_connect requires websocket.url",
            ));
        }
        Ok(())
    }

    /// Secret for persistence encryption, when encryption is enabled.
    pub fn encryption_key(&self) -> Option<&str> {
        if !self.encryption.enabled {
            return None;
        }
        self.encryption
            .secret_key
            .as_deref()
            .filter(|k| !k.is_empty())
    }

    fn with_default_endpoints(mut self) -> Self {
        for (key, url) in default_endpoints() {
            self.endpoints.entry(key).or_insert(url);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.endpoints["api"], "http://localhost:3000");
        assert_eq!(config.endpoints["custom"], "");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_keeps_default_endpoints() {
        let config = ApiConfig::from_toml_str(
            r#"
            request_timeout_ms = 5000

            [endpoints]
            auth = "https://auth.test"

            [default_headers]
            Accept = "application/json"
            "#,
        )
        .unwrap();
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.endpoints["auth"], "https://auth.test");
        assert_eq!(config.endpoints["api"], "http://localhost:3000");
        assert_eq!(config.default_headers["Accept"], "application/json");
    }

    #[test]
    fn test_env_overlay() {
        let mut config = ApiConfig::default();
        config
            .merge_with_vars([
                (ENV_API_URL, "https://api.test"),
                (ENV_TIMEOUT_MS, "1500"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.endpoints["api"], "https://api.test");
        assert_eq!(config.request_timeout_ms, 1500);

        assert!(config.merge_with_vars([(ENV_TIMEOUT_MS, "soon")]).is_err());
    }

    #[test]
    fn test_validate_rejects_inconsistent_settings() {
        let mut config = ApiConfig::default();
        config.encryption.enabled = true;
        assert!(config.validate().is_err());
        config.encryption.secret_key = Some("s3cret".into());
        assert!(config.validate().is_ok());
        assert_eq!(config.encryption_key(), Some("s3cret"));

        config.websocket.auto_connect = true;
        assert!(config.validate().is_err());

        let zero = ApiConfig {
            request_timeout_ms: 0,
            ..ApiConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"persist_queries": true, "websocket": {{"url": "ws://x"}}}}"#).unwrap();
        let config = ApiConfig::load_from_file(file.path()).unwrap();
        assert!(config.persist_queries);
        assert_eq!(config.websocket.url.as_deref(), Some("ws://x"));
        assert_eq!(config.endpoints["api"], "http://localhost:3000");
    }
}
