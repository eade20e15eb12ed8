//! Strata Testkit - deterministic effect doubles
//!
//! Every effect trait from `strata-core` has a double here that records what
//! it was asked to do and answers from a script, so tests can assert on side
//! effects and control completion order.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod clock;
pub mod sinks;
pub mod socket;
pub mod transport;

pub use auth::StaticAuth;
pub use clock::FixedClock;
pub use sinks::{RecordingInvalidator, RecordingNotifier};
pub use socket::{MockSocketDriver, MockSocketProvider};
pub use transport::{Gate, MockTransport};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
