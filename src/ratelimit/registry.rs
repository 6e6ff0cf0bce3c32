//! Registry mapping identity keys to their window counters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::window::{Admission, WindowCounter};

/// Owns one [`WindowCounter`] per identity key and routes admission checks.
///
/// This struct is thread-safe and can be shared across request handlers.
/// Lookup-or-create only holds the key's shard lock. The admission check
/// itself runs under the counter's own lock, so unrelated keys never wait on
/// each other.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    /// Counters indexed by identity key
    counters: DashMap<String, Arc<WindowCounter>>,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Check and record one request for `key` against `limit` per `window`.
    pub fn admit(&self, key: &str, limit: u64, window: Duration) -> Admission {
        self.admit_inner(key, limit, window, None)
    }

    /// Same as [`admit`](Self::admit) with an explicit clock.
    pub fn admit_at(&self, key: &str, limit: u64, window: Duration, now: Instant) -> Admission {
        self.admit_inner(key, limit, window, Some(now))
    }

    fn admit_inner(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: Option<Instant>,
    ) -> Admission {
        trace!(key = %key, limit, window_ms = window.as_millis() as u64, "Checking rate limit");

        loop {
            let counter = self.counter_for(key, now);

            // A retired counter has already been evicted from the map, so
            // the next lookup creates its replacement.
            if let Some(admission) = counter.admit_live(limit, window, now) {
                if !admission.admitted {
                    debug!(key = %key, count = admission.count, limit, "Rate limit exceeded");
                }
                return admission;
            }

            trace!(key = %key, "Counter retired during check, retrying");
        }
    }

    /// Get or atomically create the counter for `key`.
    fn counter_for(&self, key: &str, now: Option<Instant>) -> Arc<WindowCounter> {
        if let Some(counter) = self.counters.get(key) {
            return Arc::clone(counter.value());
        }

        let entry = self.counters.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "Creating new window counter");
            Arc::new(WindowCounter::new_at(now.unwrap_or_else(Instant::now)))
        });
        Arc::clone(entry.value())
    }

    /// In-window count for `key`, or `None` if the key has no counter.
    pub fn count(&self, key: &str, window: Duration) -> Option<u64> {
        self.count_at(key, window, Instant::now())
    }

    /// Same as [`count`](Self::count) with an explicit clock.
    pub fn count_at(&self, key: &str, window: Duration, now: Instant) -> Option<u64> {
        let counter = self.counters.get(key).map(|c| Arc::clone(c.value()))?;
        Some(counter.len_at(window, now))
    }

    /// Remove every counter that is empty and untouched for `idle_ttl`.
    ///
    /// Returns the number of evicted counters.
    pub fn evict_idle(&self, window: Duration, idle_ttl: Duration) -> usize {
        self.evict_idle_at(window, idle_ttl, Instant::now())
    }

    /// Same as [`evict_idle`](Self::evict_idle) with an explicit clock.
    pub fn evict_idle_at(&self, window: Duration, idle_ttl: Duration, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| !counter.retire_if_idle(window, idle_ttl, now));
        let evicted = before.saturating_sub(self.counters.len());

        if evicted > 0 {
            debug!(evicted, remaining = self.counters.len(), "Evicted idle counters");
        }
        evicted
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True if no key has been seen (or all were evicted).
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Total number of instants stored across all counters.
    pub fn stored_entries(&self) -> usize {
        self.counters.iter().map(|c| c.value().stored()).sum()
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.counters.clear();
    }
}
