//! Wall-clock time
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `strata-effects` (`SystemClock`), `strata-testkit` (`FixedClock`)

/// Source of entry timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}
