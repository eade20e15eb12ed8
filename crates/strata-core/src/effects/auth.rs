//! Authentication state supplied by the host
//!
//! # Effect Classification
//!
//! - **Category**: Host-supplied Effect
//! - **Implementation**: `strata-effects` (`SharedAuthState`)
//!
//! The store never authenticates anyone; it only asks these questions
//! before running an operation.

/// Authentication predicate consulted before mutations and queries.
pub trait AuthProvider: Send + Sync {
    /// Whether the host considers the user logged in.
    fn is_logged(&self) -> bool;

    /// Bearer token, when one is held.
    fn token(&self) -> Option<String>;

    /// Extra host validation hook. Defaults to accepting.
    fn validate(&self) -> bool {
        true
    }

    /// Logged in and accepted by the validation hook.
    fn is_authorized(&self) -> bool {
        self.is_logged() && self.validate()
    }
}
