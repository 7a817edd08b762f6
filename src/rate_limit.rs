//! Per-user rolling-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Caps the number of accepted interactions per user within a rolling window.
///
/// Each user keeps the timestamps of their accepted interactions inside the
/// window; a new interaction is accepted while fewer than `max_requests`
/// remain. Rejected interactions are not recorded.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<i64, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records an interaction for `user_id` now. Returns `false` when throttled.
    pub fn check(&self, user_id: i64) -> bool {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&self, user_id: i64, now: Instant) -> bool {
        // A poisoned lock only means another handler panicked mid-update;
        // the counters are still usable.
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let window = self.window;
        let history = hits.entry(user_id).or_default();
        while history
            .front()
            .is_some_and(|&at| now.saturating_duration_since(at) >= window)
        {
            history.pop_front();
        }

        if history.len() >= self.max_requests {
            tracing::warn!(user_id, count = history.len(), max = self.max_requests, "Rate limit exceeded");
            return false;
        }

        history.push_back(now);
        true
    }

    /// Drops users with no interaction inside the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hits.retain(|_, history| {
            history
                .back()
                .is_some_and(|&at| now.saturating_duration_since(at) < window)
        });
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.hits.lock().map(|hits| hits.len()).unwrap_or(0)
    }
}
