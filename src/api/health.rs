//! Shared health state for the /health endpoint.
//! Updated by the counter and exchange handlers whenever a fallback is served.

use std::sync::atomic::{AtomicU64, Ordering};

/// Fallback counters. Updated by handlers, read by /health.
#[derive(Default)]
pub struct HealthState {
    /// Responses served from the counter fallback bundle.
    pub counter_fallbacks: AtomicU64,
    /// Responses served from the rate fallback bundle or as a 500.
    pub rate_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_counter_fallbacks(&self) {
        self.counter_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_failures(&self) {
        self.rate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counter_fallbacks(&self) -> u64 {
        self.counter_fallbacks.load(Ordering::Relaxed)
    }

    pub fn rate_failures(&self) -> u64 {
        self.rate_failures.load(Ordering::Relaxed)
    }
}
