//! Per-caller request limiting over fixed time windows.
//!
//! State lives in a sharded concurrent map so checks on the request path
//! never contend on a global lock. Windows expire lazily on the next
//! check; no background sweeper is required.

use crate::config::{RateLimitConfig, RatePolicy};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Endpoint classes with independent windows and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    General,
    Auth,
    Messaging,
}

/// Outcome of a rate check.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after: Duration,
}

impl RateDecision {
    /// Retry-After hint in whole seconds, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.as_secs().max(1)
    }
}

struct Window {
    count: u32,
    started: Instant,
}

pub struct RateGovernor {
    state: DashMap<(String, EndpointClass), Window>,
    config: RateLimitConfig,
}

impl RateGovernor {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: DashMap::new(),
            config,
        }
    }

    fn policy(&self, class: EndpointClass) -> &RatePolicy {
        match class {
            EndpointClass::General => &self.config.general,
            EndpointClass::Auth => &self.config.auth,
            EndpointClass::Messaging => &self.config.messaging,
        }
    }

    /// Count a request against (caller, class) and decide whether it may
    /// proceed. The caller surfaces a 429 on a denied decision; nothing is
    /// retried internally.
    pub fn check(&self, caller_key: &str, class: EndpointClass) -> RateDecision {
        let policy = self.policy(class);
        let now = Instant::now();

        let mut entry = self
            .state
            .entry((caller_key.to_string(), class))
            .or_insert(Window {
                count: 0,
                started: now,
            });
        let window = entry.value_mut();

        // Reset window if expired
        if now.duration_since(window.started) >= policy.window {
            window.count = 0;
            window.started = now;
        }

        let limited = window.count >= policy.max_requests;
        if !limited {
            window.count += 1;
        }

        let remaining = policy.max_requests.saturating_sub(window.count);
        let retry_after = policy
            .window
            .saturating_sub(now.duration_since(window.started));
        drop(entry);

        // Opportunistic reaping of stale windows off the hot path.
        if self.state.len() > self.config.cleanup_threshold {
            self.reap_stale(now);
        }

        RateDecision {
            allowed: !limited,
            limit: policy.max_requests,
            remaining,
            retry_after,
        }
    }

    /// Un-count a request that ultimately succeeded, for classes
    /// configured to accumulate failures only.
    pub fn record_success(&self, caller_key: &str, class: EndpointClass) {
        if !self.policy(class).count_failures_only {
            return;
        }
        if let Some(mut entry) = self.state.get_mut(&(caller_key.to_string(), class)) {
            let window = entry.value_mut();
            window.count = window.count.saturating_sub(1);
        }
    }

    fn reap_stale(&self, now: Instant) {
        self.state.retain(|(_, class), window| {
            now.duration_since(window.started) < self.policy(*class).window
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(window: Duration, max_requests: u32, failures_only: bool) -> RateGovernor {
        let policy = RatePolicy {
            window,
            max_requests,
            count_failures_only: failures_only,
        };
        RateGovernor::new(RateLimitConfig {
            general: policy.clone(),
            auth: RatePolicy {
                count_failures_only: true,
                ..policy.clone()
            },
            messaging: policy,
            cleanup_threshold: 10_000,
        })
    }

    #[test]
    fn sixth_call_is_limited_when_max_is_five() {
        let gov = governor(Duration::from_secs(900), 5, false);
        for _ in 0..5 {
            assert!(gov.check("caller-a", EndpointClass::General).allowed);
        }
        let denied = gov.check("caller-a", EndpointClass::General);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs() >= 1);

        // Another caller is unaffected.
        assert!(gov.check("caller-b", EndpointClass::General).allowed);
    }

    #[test]
    fn classes_are_counted_independently() {
        let gov = governor(Duration::from_secs(900), 1, false);
        assert!(gov.check("caller", EndpointClass::General).allowed);
        assert!(gov.check("caller", EndpointClass::Messaging).allowed);
        assert!(!gov.check("caller", EndpointClass::General).allowed);
    }

    #[test]
    fn window_expiry_allows_calls_again() {
        let gov = governor(Duration::from_millis(80), 2, false);
        assert!(gov.check("caller", EndpointClass::Messaging).allowed);
        assert!(gov.check("caller", EndpointClass::Messaging).allowed);
        assert!(!gov.check("caller", EndpointClass::Messaging).allowed);

        std::thread::sleep(Duration::from_millis(120));
        assert!(gov.check("caller", EndpointClass::Messaging).allowed);
    }

    #[test]
    fn successes_do_not_accumulate_for_auth_class() {
        let gov = governor(Duration::from_secs(900), 2, false);

        // Two successful attempts, each un-counted afterwards.
        for _ in 0..2 {
            assert!(gov.check("caller", EndpointClass::Auth).allowed);
            gov.record_success("caller", EndpointClass::Auth);
        }
        // Failures still accumulate and eventually deny.
        assert!(gov.check("caller", EndpointClass::Auth).allowed);
        assert!(gov.check("caller", EndpointClass::Auth).allowed);
        assert!(!gov.check("caller", EndpointClass::Auth).allowed);
    }

    #[test]
    fn record_success_is_ignored_for_counting_classes() {
        let gov = governor(Duration::from_secs(900), 1, false);
        assert!(gov.check("caller", EndpointClass::Messaging).allowed);
        gov.record_success("caller", EndpointClass::Messaging);
        assert!(!gov.check("caller", EndpointClass::Messaging).allowed);
    }
}
