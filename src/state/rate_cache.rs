//! Process-local cache of the last rate bundle.
//! Each process owns its own entry; there is no cross-instance coherence.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::RateBundle;

struct CacheEntry {
    bundle: RateBundle,
    refreshed_at: Instant,
}

/// Holds at most one bundle. The lock guards a read or an overwrite only and
/// is never held across an await, so concurrent refreshes race and the last
/// writer wins.
pub struct RateCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// The cached bundle if it is younger than the freshness window.
    pub fn get_fresh(&self) -> Option<RateBundle> {
        let Ok(guard) = self.entry.lock() else {
            return None;
        };
        guard
            .as_ref()
            .filter(|e| e.refreshed_at.elapsed() < self.ttl)
            .map(|e| e.bundle.clone())
    }

    /// Replace the entry wholesale, stamped with the current instant.
    pub fn store(&self, bundle: RateBundle) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = Some(CacheEntry {
                bundle,
                refreshed_at: Instant::now(),
            });
        }
    }

    /// Age of the current entry. None if nothing was ever stored.
    pub fn age(&self) -> Option<Duration> {
        self.entry
            .lock()
            .ok()?
            .as_ref()
            .map(|e| e.refreshed_at.elapsed())
    }
}
