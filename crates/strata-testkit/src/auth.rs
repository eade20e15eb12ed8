//! Switchable auth state

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use strata_core::AuthProvider;

/// Auth provider whose answers are set by the test.
#[derive(Debug)]
pub struct StaticAuth {
    logged: AtomicBool,
    valid: AtomicBool,
    token: Mutex<Option<String>>,
}

impl StaticAuth {
    /// Logged in with a token.
    pub fn logged_in() -> Self {
        Self {
            logged: AtomicBool::new(true),
            valid: AtomicBool::new(true),
            token: Mutex::new(Some("test-token".to_string())),
        }
    }

    /// Logged out, no token.
    pub fn logged_out() -> Self {
        Self {
            logged: AtomicBool::new(false),
            valid: AtomicBool::new(true),
            token: Mutex::new(None),
        }
    }

    pub fn set_logged(&self, logged: bool) {
        self.logged.store(logged, Ordering::SeqCst);
    }

    /// Answer of the host validation hook.
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }
}

impl AuthProvider for StaticAuth {
    fn is_logged(&self) -> bool {
        self.logged.load(Ordering::SeqCst)
    }

    fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn validate(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}
