//! Sliding window counter for a single identity key.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Process-wide quota: `limit` admissions per sliding `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Maximum admissions per window
    pub limit: u64,
    /// Trailing window length
    pub window: Duration,
}

impl Quota {
    /// Create a new quota.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Number of in-window occurrences after the check, including the new
    /// one when admitted
    pub count: u64,
    /// Whether the occurrence was within quota and recorded
    pub admitted: bool,
}

impl Admission {
    /// Quota left in the current window after this decision.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.count)
    }
}

/// Tracks admitted occurrences for one identity key over a sliding window.
///
/// The log holds one instant per admitted occurrence, oldest first. Expired
/// entries are pruned on every call, so the log never grows past `limit`.
pub struct WindowCounter {
    state: Mutex<CounterState>,
}

struct CounterState {
    /// Admitted instants, oldest first
    log: VecDeque<Instant>,
    /// Last time any check touched this counter
    last_seen: Instant,
    /// Set once the counter has been evicted from its registry
    retired: bool,
}

impl CounterState {
    /// Drop every entry whose age is at least `window`.
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.log.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.log.pop_front();
        }
    }
}

impl WindowCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    /// Create an empty counter first seen at `now`.
    pub fn new_at(now: Instant) -> Self {
        Self {
            state: Mutex::new(CounterState {
                log: VecDeque::new(),
                last_seen: now,
                retired: false,
            }),
        }
    }

    /// Check whether one more occurrence fits in the window ending now, and
    /// record it if so.
    ///
    /// The clock is read while the lock is held, so instants in the log are
    /// always appended in order.
    pub fn try_admit(&self, limit: u64, window: Duration) -> Admission {
        let mut state = self.state.lock();
        let now = Instant::now();
        Self::admit_locked(&mut state, limit, window, now)
    }

    /// Same as [`try_admit`](Self::try_admit) with an explicit clock.
    ///
    /// Calls for one counter are expected to pass non-decreasing instants.
    pub fn try_admit_at(&self, limit: u64, window: Duration, now: Instant) -> Admission {
        let mut state = self.state.lock();
        Self::admit_locked(&mut state, limit, window, now)
    }

    /// Admission check used by the registry. Returns `None` if the counter
    /// was retired, in which case the caller must look the key up again.
    pub(crate) fn admit_live(
        &self,
        limit: u64,
        window: Duration,
        now: Option<Instant>,
    ) -> Option<Admission> {
        let mut state = self.state.lock();
        if state.retired {
            return None;
        }
        let now = now.unwrap_or_else(Instant::now);
        Some(Self::admit_locked(&mut state, limit, window, now))
    }

    fn admit_locked(
        state: &mut CounterState,
        limit: u64,
        window: Duration,
        now: Instant,
    ) -> Admission {
        state.prune(window, now);
        state.last_seen = state.last_seen.max(now);

        let in_window = state.log.len() as u64;
        if in_window < limit {
            state.log.push_back(now);
            Admission {
                count: in_window + 1,
                admitted: true,
            }
        } else {
            Admission {
                count: in_window,
                admitted: false,
            }
        }
    }

    /// Number of in-window occurrences at `now`.
    pub fn len_at(&self, window: Duration, now: Instant) -> u64 {
        let mut state = self.state.lock();
        state.prune(window, now);
        state.log.len() as u64
    }

    /// Number of instants currently stored, expired or not.
    pub fn stored(&self) -> usize {
        self.state.lock().log.len()
    }

    /// True if nothing is left in the window and the counter has not been
    /// touched for at least `idle_ttl`.
    pub fn is_idle_at(&self, window: Duration, idle_ttl: Duration, now: Instant) -> bool {
        let mut state = self.state.lock();
        Self::idle_locked(&mut state, window, idle_ttl, now)
    }

    /// Mark the counter retired if it is idle. Once retired it refuses every
    /// further admission through [`admit_live`](Self::admit_live).
    pub(crate) fn retire_if_idle(&self, window: Duration, idle_ttl: Duration, now: Instant) -> bool {
        let mut state = self.state.lock();
        if Self::idle_locked(&mut state, window, idle_ttl, now) {
            state.retired = true;
        }
        state.retired
    }

    fn idle_locked(
        state: &mut CounterState,
        window: Duration,
        idle_ttl: Duration,
        now: Instant,
    ) -> bool {
        state.prune(window, now);
        state.log.is_empty() && now.saturating_duration_since(state.last_seen) >= idle_ttl
    }
}

impl Default for WindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WindowCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WindowCounter")
            .field("stored", &state.log.len())
            .field("retired", &state.retired)
            .finish()
    }
}
