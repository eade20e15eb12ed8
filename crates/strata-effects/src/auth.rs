//! Host-settable auth state
//!
//! The host flips `logged` and `token` as its session changes and may
//! install a validation hook; the store only reads them.

use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::AuthProvider;

type Validator = Arc<dyn Fn() -> bool + Send + Sync>;

/// Shared, mutable [`AuthProvider`].
#[derive(Default)]
pub struct SharedAuthState {
    logged: RwLock<bool>,
    token: RwLock<Option<String>>,
    validator: RwLock<Option<Validator>>,
}

impl SharedAuthState {
    /// Logged out, no validation hook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session logged in with `token`.
    pub fn login(&self, token: Option<String>) {
        *self.token.write() = token;
        *self.logged.write() = true;
        tracing::debug!("auth state: logged in");
    }

    /// Clear the session.
    pub fn logout(&self) {
        *self.token.write() = None;
        *self.logged.write() = false;
        tracing::debug!("auth state: logged out");
    }

    /// Install the host validation hook.
    pub fn set_validator<F>(&self, validator: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        *self.validator.write() = Some(Arc::new(validator));
    }

    /// Remove the validation hook.
    pub fn clear_validator(&self) {
        *self.validator.write() = None;
    }
}

impl AuthProvider for SharedAuthState {
    fn is_logged(&self) -> bool {
        *self.logged.read()
    }

    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn validate(&self) -> bool {
        let validator = self.validator.read().clone();
        validator.map_or(true, |v| v())
    }
}

impl std::fmt::Debug for SharedAuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAuthState")
            .field("logged", &self.is_logged())
            .field("has_token", &self.token.read().is_some())
            .field("has_validator", &self.validator.read().is_some())
            .finish()
    }
}
