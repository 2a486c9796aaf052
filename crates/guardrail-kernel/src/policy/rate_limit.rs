//! Per-requester destructive-action rate limiting.
//!
//! Shared mutable state behind the one immutable rule that needs it.
//! Updates are atomic per requester (the map entry is locked for the
//! whole check-and-record), so concurrent evaluations cannot jointly
//! exceed the quota.

use crate::config::RateLimitConfig;
use crate::types::RequesterId;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitVerdict {
    /// The attempt was recorded; `used` includes it.
    Allowed { used: u32 },
    /// The quota is exhausted; the attempt was not recorded.
    Exceeded { limit: u32 },
}

/// Rolling-window counter of destructive attempts per requester.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    attempts: DashMap<RequesterId, Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
        }
    }

    /// Check the quota and, if there is headroom, record the attempt.
    /// Atomic: the entry stays locked between the check and the record.
    pub fn check_and_record(&self, requester: &RequesterId, now: DateTime<Utc>) -> RateLimitVerdict {
        let window = Duration::seconds(self.config.window_secs as i64);
        let cutoff = now - window;

        let mut entry = self.attempts.entry(requester.clone()).or_default();
        entry.retain(|t| *t > cutoff);

        if entry.len() as u32 >= self.config.max_destructive {
            return RateLimitVerdict::Exceeded {
                limit: self.config.max_destructive,
            };
        }

        entry.push(now);
        RateLimitVerdict::Allowed {
            used: entry.len() as u32,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
