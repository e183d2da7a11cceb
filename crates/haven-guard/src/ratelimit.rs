//! Sliding counting window rate limiter for security-sensitive operations.
//!
//! Each `(user, operation)` pair owns one window, created lazily on
//! first use. An already-limited window rejects without counting;
//! otherwise the call increments the counter first and the call that
//! reaches the threshold is itself rejected, so a threshold of 5 admits
//! four calls per window.
//!
//! Windows never expire on their own. `reset` is the only way the
//! counter and the sticky limited flag come back down; production
//! deployments are expected to run an external sweeper that invokes it
//! on schedule. The increment-and-check must run under the store's
//! per-key atomic update so two racing callers cannot both slip under
//! the threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use haven_core::types::RateWindow;

/// Rate limiter settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Counter value at which a window becomes limited.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

fn default_threshold() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum Verdict {
    Admitted {
        count: u32,
    },
    Limited {
        /// The window's advisory end, surfaced as a retry-after hint.
        reset_at: Option<DateTime<Utc>>,
    },
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admitted { .. })
    }
}

/// Admit or reject one call against a window.
pub fn admit(window: &mut RateWindow, config: &RateLimitConfig) -> Verdict {
    if window.limited {
        return Verdict::Limited {
            reset_at: window.window_end,
        };
    }

    window.count += 1;
    if window.count >= config.threshold {
        window.limited = true;
        return Verdict::Limited {
            reset_at: window.window_end,
        };
    }

    Verdict::Admitted {
        count: window.count,
    }
}

/// The verdict a window would give without counting another call.
pub fn verdict(window: &RateWindow, config: &RateLimitConfig) -> Verdict {
    if window.limited || window.count >= config.threshold {
        Verdict::Limited {
            reset_at: window.window_end,
        }
    } else {
        Verdict::Admitted {
            count: window.count,
        }
    }
}

/// Zero the counter, restart the window at `now`, and clear the sticky
/// limited flag. The advisory `window_end` is left untouched.
pub fn reset(window: &mut RateWindow, now: DateTime<Utc>) {
    window.count = 0;
    window.window_start = now;
    window.limited = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use haven_core::types::UserId;

    fn window(now: DateTime<Utc>) -> RateWindow {
        RateWindow::new(UserId::new(), "unlock_door", now)
    }

    #[test]
    fn first_four_calls_admitted_fifth_limited() {
        let now = Utc::now();
        let mut w = window(now);
        let config = RateLimitConfig::default();

        for expected in 1..=4 {
            assert_eq!(
                admit(&mut w, &config),
                Verdict::Admitted { count: expected }
            );
        }
        assert_eq!(admit(&mut w, &config), Verdict::Limited { reset_at: None });
        assert_eq!(w.count, 5);
        assert!(w.limited);
    }

    #[test]
    fn limited_window_stays_limited_without_counting() {
        let now = Utc::now();
        let mut w = window(now);
        let config = RateLimitConfig::default();

        for _ in 0..5 {
            admit(&mut w, &config);
        }
        let count_at_trip = w.count;

        for _ in 0..3 {
            assert!(!admit(&mut w, &config).is_admitted());
        }
        assert_eq!(w.count, count_at_trip);
    }

    #[test]
    fn limited_verdict_carries_window_end() {
        let now = Utc::now();
        let end = now + Duration::minutes(1);
        let mut w = window(now);
        w.window_end = Some(end);
        let config = RateLimitConfig { threshold: 1 };

        assert_eq!(admit(&mut w, &config), Verdict::Limited { reset_at: Some(end) });
    }

    #[test]
    fn reset_reopens_the_window() {
        let now = Utc::now();
        let mut w = window(now);
        let config = RateLimitConfig::default();

        for _ in 0..6 {
            admit(&mut w, &config);
        }
        assert!(w.limited);

        let later = now + Duration::minutes(10);
        reset(&mut w, later);

        assert_eq!(w.count, 0);
        assert_eq!(w.window_start, later);
        assert!(!w.limited);
        assert_eq!(admit(&mut w, &config), Verdict::Admitted { count: 1 });
    }

    #[test]
    fn reset_keeps_the_advisory_end() {
        let now = Utc::now();
        let end = now + Duration::minutes(1);
        let mut w = window(now);
        w.window_end = Some(end);

        reset(&mut w, now);
        assert_eq!(w.window_end, Some(end));
    }

    #[test]
    fn peek_verdict_does_not_count() {
        let now = Utc::now();
        let mut w = window(now);
        let config = RateLimitConfig::default();

        admit(&mut w, &config);
        let before = w.count;
        assert!(verdict(&w, &config).is_admitted());
        assert_eq!(w.count, before);
    }
}
