//! Controllable clock

use std::sync::atomic::{AtomicU64, Ordering};

use strata_core::Clock;

/// Fixed: 2022-01-01 00:00:00 UTC
pub const DEFAULT_TIME_MS: u64 = 1_640_995_200_000;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_MS)
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
