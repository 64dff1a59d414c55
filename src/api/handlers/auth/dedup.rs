//! Webhook message deduplication and per-sender throughput caps.
//!
//! Messaging platforms redeliver webhooks on timeouts, so every inbound
//! message id is recorded once within a retention window; retries are acked
//! without side effects. A sender-keyed window rides alongside the global
//! webhook category quota so a single noisy sender cannot exhaust the shared
//! budget.

use std::time::Duration;

use super::kv::TtlMap;
use super::rate_limit::{
    Decision, RateCategory, RateLimitConfig, RateLimiter, SlidingWindowLimiter,
};

/// Retention must outlive every rate-limit window so a retry arriving after
/// a quota reset is still recognized.
const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60);
const SENDER_WINDOW: Duration = Duration::from_secs(5 * 60);
const SENDER_MAX_MESSAGES: u32 = 20;

fn sender_config(category: RateCategory) -> RateLimitConfig {
    match category {
        RateCategory::Webhook => RateLimitConfig {
            window: SENDER_WINDOW,
            max_requests: SENDER_MAX_MESSAGES,
        },
        other => RateLimitConfig::for_category(other),
    }
}

pub struct MessageDedupGuard {
    seen_ids: TtlMap<String, ()>,
    retention: Duration,
    sender_limiter: SlidingWindowLimiter,
}

impl MessageDedupGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen_ids: TtlMap::new(),
            retention: DEFAULT_RETENTION,
            sender_limiter: SlidingWindowLimiter::new().with_config(sender_config),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Whether this id was already recorded within the retention window.
    #[must_use]
    pub fn seen(&self, message_id: &str) -> bool {
        self.seen_ids.get(&message_id.to_string()).is_some()
    }

    /// Record an id, returning `true` only for the first delivery. Concurrent
    /// deliveries of the same id are serialized by the underlying map, so
    /// exactly one caller may proceed to mutate state.
    pub fn record(&self, message_id: &str) -> bool {
        self.seen_ids
            .insert_if_absent(message_id.to_string(), (), self.retention)
    }

    /// Sender-keyed throughput cap, independent of the global webhook quota.
    #[must_use]
    pub fn check_sender(&self, sender: &str) -> Decision {
        self.sender_limiter.check(RateCategory::Webhook, sender)
    }

    pub fn sweep_expired(&self) -> usize {
        self.seen_ids.sweep_expired() + self.sender_limiter.sweep_expired()
    }
}

impl Default for MessageDedupGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::MessageDedupGuard;
    use std::time::Duration;

    #[test]
    fn first_delivery_wins_retry_is_seen() {
        let guard = MessageDedupGuard::new();
        assert!(!guard.seen("wamid.1"));
        assert!(guard.record("wamid.1"));
        assert!(guard.seen("wamid.1"));
        // The retried delivery must not win the slot again.
        assert!(!guard.record("wamid.1"));
    }

    #[test]
    fn ids_age_out_after_retention() {
        let guard = MessageDedupGuard::new().with_retention(Duration::ZERO);
        assert!(guard.record("wamid.2"));
        assert!(!guard.seen("wamid.2"));
        assert!(guard.record("wamid.2"));
    }

    #[test]
    fn sender_cap_is_enforced() {
        let guard = MessageDedupGuard::new();
        for _ in 0..20 {
            assert!(guard.check_sender("15551234567").allowed);
        }
        let denied = guard.check_sender("15551234567");
        assert!(!denied.allowed);
        assert!(denied.retry_after_seconds.is_some());
        // Other senders are unaffected.
        assert!(guard.check_sender("15559876543").allowed);
    }

    #[test]
    fn sweep_drops_expired_ids() {
        let guard = MessageDedupGuard::new().with_retention(Duration::ZERO);
        guard.record("wamid.3");
        assert!(guard.sweep_expired() >= 1);
    }
}
