//! Unified error system for Strata
//!
//! A single error type shared by the store, the mutation machine, and every
//! effect handler. Errors are `Clone + Serialize` because they are recorded
//! inside query and mutation entries and persisted with them.

use serde::{Deserialize, Serialize};

/// Message carried by authentication failures.
pub const NOT_AUTHENTICATED: &str = "not authenticated";

/// Message carried by wrapped non-error failures.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Message used when the transport gets no response at all.
pub const NO_RESPONSE: &str = "No response from server - request timeout or network issue";

/// Unified error type for all Strata operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrataError {
    /// The auth predicate rejected the caller
    #[error("Auth error: {message}")]
    Auth {
        /// Error message describing the auth failure
        message: String,
    },

    /// Non-2xx response, network failure, or client-side request error
    #[error("Transport error: {message}")]
    Transport {
        /// Human-readable message extracted from the response
        message: String,
        /// HTTP status when a response was received
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },

    /// A failure that carried no usable error value
    #[error("Unknown error: {message}")]
    Unknown {
        /// Fixed or best-effort message
        message: String,
    },

    /// Malformed realtime payload
    #[error("Parse error: {message}")]
    Parse {
        /// Error message describing the malformed payload
        message: String,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Encryption or decryption failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Error message describing the cryptographic failure
        message: String,
    },

    /// Persistence backend failure
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },
}

impl StrataError {
    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// The error raised when the auth predicate fails
    pub fn not_authenticated() -> Self {
        Self::auth(NOT_AUTHENTICATED)
    }

    /// Create a transport error without a status
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Create a transport error for an HTTP status
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create an unknown error with the fixed message
    pub fn unknown() -> Self {
        Self::Unknown {
            message: UNKNOWN_ERROR.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// The bare message, without the category prefix used by `Display`.
    ///
    /// This is what notifications show and what `error.message` resolves to
    /// in a store path.
    pub fn message(&self) -> &str {
        match self {
            Self::Auth { message }
            | Self::Transport { message, .. }
            | Self::Unknown { message }
            | Self::Parse { message }
            | Self::Invalid { message }
            | Self::Crypto { message }
            | Self::Storage { message }
            | Self::Serialization { message } => message,
        }
    }

    /// HTTP status, if this error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

/// Standard Result type for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for StrataError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid(format!("Invalid TOML: {err}"))
    }
}

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}
