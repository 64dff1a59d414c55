//! Sliding-window rate limiting keyed by caller fingerprint.
//!
//! The fingerprint (forwarded IP plus truncated user-agent) is a heuristic,
//! not cryptographic identity; shared proxies collapse onto one key. That is
//! a documented limitation, not a bug.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Quota categories, each with its own window and budget.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RateCategory {
    Auth,
    Api,
    PasswordReset,
    Webhook,
}

impl RateCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Api => "api",
            Self::PasswordReset => "password_reset",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitConfig {
    /// Default quotas per category.
    #[must_use]
    pub const fn for_category(category: RateCategory) -> Self {
        match category {
            RateCategory::Auth => Self {
                window: Duration::from_secs(15 * 60),
                max_requests: 5,
            },
            RateCategory::Api => Self {
                window: Duration::from_secs(60),
                max_requests: 100,
            },
            RateCategory::PasswordReset => Self {
                window: Duration::from_secs(60 * 60),
                max_requests: 3,
            },
            RateCategory::Webhook => Self {
                window: Duration::from_secs(60),
                max_requests: 120,
            },
        }
    }
}

/// Outcome of a quota check.
#[derive(Clone, Copy, Debug)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
    /// Seconds until the window rolls over; set only on denial.
    pub retry_after_seconds: Option<u64>,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, category: RateCategory, fingerprint: &str) -> Decision;

    /// Reclaim rolled-over windows. Stateless limiters have nothing to drop.
    fn sweep_expired(&self) -> usize {
        0
    }
}

struct WindowEntry {
    count: u32,
    window_reset_at: Instant,
}

/// In-process limiter backed by a concurrent map. Updates to the same key are
/// serialized by the map shard; different keys do not block each other.
pub struct SlidingWindowLimiter {
    entries: DashMap<(RateCategory, String), WindowEntry>,
    config: fn(RateCategory) -> RateLimitConfig,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            config: RateLimitConfig::for_category,
        }
    }

    /// Override the per-category configuration (used by tests and the
    /// sender-keyed dedup limiter).
    #[must_use]
    pub fn with_config(mut self, config: fn(RateCategory) -> RateLimitConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, category: RateCategory, fingerprint: &str) -> Decision {
        let config = (self.config)(category);
        let now = Instant::now();
        let key = (category, fingerprint.to_string());

        // The entry guard holds the shard lock, so count/window updates are
        // atomic per key.
        let mut entry = self.entries.entry(key).or_insert_with(|| WindowEntry {
            count: 0,
            window_reset_at: now + config.window,
        });

        if now >= entry.window_reset_at {
            // Window elapsed: reset atomically to a fresh count, no carry-over.
            entry.count = 1;
            entry.window_reset_at = now + config.window;
            return Decision {
                allowed: true,
                remaining: config.max_requests.saturating_sub(1),
                reset_at: entry.window_reset_at,
                retry_after_seconds: None,
            };
        }

        if entry.count >= config.max_requests {
            // Denials never increment; the window must be able to roll over.
            let retry_after = entry
                .window_reset_at
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Decision {
                allowed: false,
                remaining: 0,
                reset_at: entry.window_reset_at,
                retry_after_seconds: Some(retry_after),
            };
        }

        entry.count += 1;
        Decision {
            allowed: true,
            remaining: config.max_requests.saturating_sub(entry.count),
            reset_at: entry.window_reset_at,
            retry_after_seconds: None,
        }
    }

    /// Delete windows that have rolled over. Entries reset lazily on check as
    /// well, so the sweep only reclaims memory for idle keys.
    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now < entry.window_reset_at);
        before - self.entries.len()
    }
}

/// Limiter that always allows; used in tests.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, category: RateCategory, _fingerprint: &str) -> Decision {
        let config = RateLimitConfig::for_category(category);
        Decision {
            allowed: true,
            remaining: config.max_requests,
            reset_at: Instant::now() + config.window,
            retry_after_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        NoopRateLimiter, RateCategory, RateLimitConfig, RateLimiter, SlidingWindowLimiter,
    };
    use std::time::Duration;

    fn tight_config(category: RateCategory) -> RateLimitConfig {
        match category {
            RateCategory::Auth => RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: 3,
            },
            other => RateLimitConfig::for_category(other),
        }
    }

    fn instant_config(category: RateCategory) -> RateLimitConfig {
        match category {
            RateCategory::Auth => RateLimitConfig {
                window: Duration::ZERO,
                max_requests: 1,
            },
            other => RateLimitConfig::for_category(other),
        }
    }

    #[test]
    fn denies_after_budget_with_retry_after() {
        let limiter = SlidingWindowLimiter::new().with_config(tight_config);

        for _ in 0..3 {
            let decision = limiter.check(RateCategory::Auth, "1.2.3.4|ua");
            assert!(decision.allowed);
        }

        let denied = limiter.check(RateCategory::Auth, "1.2.3.4|ua");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_seconds.is_some_and(|s| s > 0));

        // Denied requests do not increment the counter twice.
        let denied_again = limiter.check(RateCategory::Auth, "1.2.3.4|ua");
        assert!(!denied_again.allowed);
    }

    #[test]
    fn window_rollover_resets_count() {
        let limiter = SlidingWindowLimiter::new().with_config(instant_config);
        assert!(limiter.check(RateCategory::Auth, "fp").allowed);
        // Zero-length window: the next request lands in a fresh window.
        assert!(limiter.check(RateCategory::Auth, "fp").allowed);
    }

    #[test]
    fn fingerprints_are_independent() {
        let limiter = SlidingWindowLimiter::new().with_config(tight_config);
        for _ in 0..3 {
            limiter.check(RateCategory::Auth, "first");
        }
        assert!(!limiter.check(RateCategory::Auth, "first").allowed);
        assert!(limiter.check(RateCategory::Auth, "second").allowed);
    }

    #[test]
    fn categories_are_independent() {
        let limiter = SlidingWindowLimiter::new().with_config(tight_config);
        for _ in 0..3 {
            limiter.check(RateCategory::Auth, "fp");
        }
        assert!(!limiter.check(RateCategory::Auth, "fp").allowed);
        assert!(limiter.check(RateCategory::Api, "fp").allowed);
    }

    #[test]
    fn sweep_reclaims_rolled_over_windows() {
        let limiter = SlidingWindowLimiter::new().with_config(instant_config);
        limiter.check(RateCategory::Auth, "fp");
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn noop_limiter_always_allows() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert!(limiter.check(RateCategory::Auth, "fp").allowed);
        }
    }
}
