//! Rolling one-minute REST budget
//!
//! Advisory, not blocking: a denied caller simply skips its work. Callers
//! charge the budget before the remote call is issued.

use std::time::Duration;

use tracing::{debug, warn};

/// Window length
pub const WINDOW_MILLIS: i64 = 60_000;

/// Request budget over a one-minute window
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window_start_millis: i64,
    request_count: u32,
    limit_per_minute: u32,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            window_start_millis: 0,
            request_count: 0,
            limit_per_minute,
        }
    }

    /// Charge `cost` requests if the budget allows it
    ///
    /// A clock that moved backwards resets the window.
    pub fn try_acquire(&mut self, cost: u32, now_millis: i64) -> bool {
        if now_millis < self.window_start_millis {
            warn!(
                now_millis,
                window_start_millis = self.window_start_millis,
                "Clock moved backwards, resetting rate window"
            );
            self.reset(now_millis);
        } else if now_millis - self.window_start_millis >= WINDOW_MILLIS {
            self.reset(now_millis);
        }

        match self.request_count.checked_add(cost) {
            Some(total) if total <= self.limit_per_minute => {
                self.request_count = total;
                observability::record_rate_window_usage(self.request_count, self.limit_per_minute);
                true
            }
            _ => {
                debug!(
                    used = self.request_count,
                    limit = self.limit_per_minute,
                    cost,
                    since = self.window_start_millis,
                    "Rate budget exhausted"
                );
                false
            }
        }
    }

    /// Time until the current window expires
    pub fn retry_after(&self, now_millis: i64) -> Duration {
        let remaining = (self.window_start_millis + WINDOW_MILLIS - now_millis).clamp(0, WINDOW_MILLIS);
        Duration::from_millis(remaining as u64)
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    pub fn limit_per_minute(&self) -> u32 {
        self.limit_per_minute
    }

    pub fn window_start_millis(&self) -> i64 {
        self.window_start_millis
    }

    fn reset(&mut self, now_millis: i64) {
        self.window_start_millis = now_millis;
        self.request_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_allows_up_to_limit() {
        let mut limiter = RateLimiter::new(3);
        assert!(limiter.try_acquire(1, T0));
        assert!(limiter.try_acquire(2, T0 + 10));
        assert!(!limiter.try_acquire(1, T0 + 20));
        assert_eq!(limiter.request_count(), 3);
    }

    #[test]
    fn test_window_expiry_resets() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire(1, T0));
        assert!(!limiter.try_acquire(1, T0 + WINDOW_MILLIS - 1));
        assert!(limiter.try_acquire(1, T0 + WINDOW_MILLIS));
        assert_eq!(limiter.window_start_millis(), T0 + WINDOW_MILLIS);
    }

    #[test]
    fn test_clock_regression_resets_window() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire(1, T0));
        assert!(limiter.try_acquire(1, T0 - 3_600_000));
        assert_eq!(limiter.window_start_millis(), T0 - 3_600_000);
        assert_eq!(limiter.request_count(), 1);
    }

    #[test]
    fn test_cost_above_limit_is_never_allowed() {
        let mut limiter = RateLimiter::new(2);
        assert!(!limiter.try_acquire(3, T0));
        assert_eq!(limiter.request_count(), 0);
    }

    #[test]
    fn test_retry_after() {
        let mut limiter = RateLimiter::new(1);
        limiter.try_acquire(1, T0);
        assert_eq!(limiter.retry_after(T0 + 15_000), Duration::from_secs(45));
        assert_eq!(limiter.retry_after(T0 + 90_000), Duration::ZERO);
        assert_eq!(limiter.retry_after(T0 - 1_000), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn prop_never_overshoots_silently(
            limit in 1u32..10,
            steps in proptest::collection::vec((-5_000i64..40_000, 0u32..4), 1..200),
        ) {
            let mut limiter = RateLimiter::new(limit);
            let mut now = T0;
            let mut granted_in_window = 0u32;
            let mut window = limiter.window_start_millis();

            for (delta, cost) in steps {
                now += delta;
                let before = limiter.request_count();
                let allowed = limiter.try_acquire(cost, now);

                if limiter.window_start_millis() != window {
                    window = limiter.window_start_millis();
                    granted_in_window = 0;
                }
                if allowed {
                    granted_in_window += cost;
                } else {
                    // a denial never charges the budget
                    prop_assert!(limiter.request_count() <= before);
                }

                prop_assert!(limiter.request_count() <= limit);
                prop_assert_eq!(limiter.request_count(), granted_in_window);
            }
        }
    }
}
