//! Per-key sliding-window rate limiting with violation escalation.
//!
//! Keys over the ceiling accumulate violations; enough violations inside the
//! rolling violation window escalate the key into the block table, with an
//! exponentially growing block horizon per repeat offense. Idle state is
//! garbage-collected opportunistically every [`CLEANUP_EVERY_CHECKS`] calls.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    nubi_policy::RateLimitPolicy,
    tracing::{debug, warn},
};

const CLEANUP_EVERY_CHECKS: u64 = 512;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Over the ceiling for the current window; not (yet) blocked.
    Limited { retry_after: Duration },
    /// Key is in the block table.
    Blocked { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_started_at: Instant,
    count: usize,
    violations: u32,
    first_violation_at: Option<Instant>,
    /// Blocks issued against this key while its state stays warm.
    offenses: u32,
    last_seen: Instant,
}

impl WindowState {
    fn fresh(now: Instant) -> Self {
        Self {
            window_started_at: now,
            count: 1,
            violations: 0,
            first_violation_at: None,
            offenses: 0,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    blocked_until: Instant,
}

/// Process-wide rate-limit and block tables for the admission gate.
///
/// Safe for concurrent use: two messages from the same sender may race a
/// check, but each key's state is mutated under its own map entry.
pub struct RateLimiter {
    windows: DashMap<String, WindowState>,
    blocks: DashMap<String, BlockEntry>,
    checks_seen: AtomicU64,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            blocks: DashMap::new(),
            checks_seen: AtomicU64::new(0),
        }
    }

    /// Account one attempt for `key` and decide whether it may proceed.
    pub fn check(&self, key: &str, policy: &RateLimitPolicy) -> RateDecision {
        self.check_at(key, policy, Instant::now())
    }

    /// True if `key` currently sits in the block table.
    #[must_use]
    pub fn is_blocked(&self, key: &str) -> bool {
        self.blocks
            .get(key)
            .is_some_and(|entry| entry.blocked_until > Instant::now())
    }

    fn check_at(&self, key: &str, policy: &RateLimitPolicy, now: Instant) -> RateDecision {
        let decision = match self.consult_blocks(key, now) {
            Some(retry_after) => RateDecision::Blocked { retry_after },
            None => self.check_window(key, policy, now),
        };
        self.cleanup_if_needed(policy, now);
        decision
    }

    /// Expired block entries are removed on consult.
    fn consult_blocks(&self, key: &str, now: Instant) -> Option<Duration> {
        let entry = self.blocks.get(key)?;
        if entry.blocked_until > now {
            return Some(entry.blocked_until - now);
        }
        drop(entry);
        self.blocks.remove(key);
        None
    }

    fn check_window(&self, key: &str, policy: &RateLimitPolicy, now: Instant) -> RateDecision {
        let window = Duration::from_secs(policy.window_secs.max(1));
        let violation_window = Duration::from_secs(policy.violation_window_secs.max(1));

        match self.windows.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                if policy.max_per_window == 0 {
                    return RateDecision::Limited {
                        retry_after: window,
                    };
                }
                vacant.insert(WindowState::fresh(now));
                RateDecision::Allowed
            },
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                state.last_seen = now;

                // Violations outside the rolling period no longer count
                // toward escalation.
                if state
                    .first_violation_at
                    .is_some_and(|at| now.duration_since(at) >= violation_window)
                {
                    state.violations = 0;
                    state.first_violation_at = None;
                }

                let elapsed = now.duration_since(state.window_started_at);
                if elapsed >= window {
                    state.window_started_at = now;
                    state.count = 1;
                    return RateDecision::Allowed;
                }
                if state.count < policy.max_per_window {
                    state.count += 1;
                    return RateDecision::Allowed;
                }

                state.violations += 1;
                state.first_violation_at.get_or_insert(now);

                if state.violations >= policy.violation_limit.max(1) {
                    state.offenses += 1;
                    state.violations = 0;
                    state.first_violation_at = None;
                    let horizon = block_horizon(policy, state.offenses);
                    self.blocks.insert(
                        key.to_owned(),
                        BlockEntry {
                            blocked_until: now + horizon,
                        },
                    );
                    warn!(
                        key,
                        offense = state.offenses,
                        block_secs = horizon.as_secs(),
                        "rate-limit violations escalated to block"
                    );
                    return RateDecision::Blocked {
                        retry_after: horizon,
                    };
                }

                debug!(key, violations = state.violations, "over rate-limit ceiling");
                RateDecision::Limited {
                    retry_after: window.saturating_sub(elapsed),
                }
            },
        }
    }

    fn cleanup_if_needed(&self, policy: &RateLimitPolicy, now: Instant) {
        let seen = self.checks_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(CLEANUP_EVERY_CHECKS) {
            return;
        }
        let idle_ttl = Duration::from_secs(policy.idle_ttl_secs.max(1));
        self.windows
            .retain(|_, state| now.duration_since(state.last_seen) <= idle_ttl);
        self.blocks.retain(|_, entry| entry.blocked_until > now);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// First offense blocks for `base_block_secs`, doubling per repeat offense
/// up to `max_block_secs`.
fn block_horizon(policy: &RateLimitPolicy, offense: u32) -> Duration {
    let base = policy.base_block_secs.max(1);
    let cap = policy.max_block_secs.max(base);
    let doubled = base.saturating_mul(1u64 << (offense.saturating_sub(1)).min(32));
    Duration::from_secs(doubled.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_policy() -> RateLimitPolicy {
        RateLimitPolicy {
            max_per_window: 3,
            window_secs: 60,
            violation_limit: 2,
            violation_window_secs: 600,
            base_block_secs: 300,
            max_block_secs: 86_400,
            idle_ttl_secs: 180,
        }
    }

    #[test]
    fn allows_up_to_ceiling_then_limits() {
        let limiter = RateLimiter::new();
        let policy = tight_policy();
        let t0 = Instant::now();

        for _ in 0..3 {
            assert_eq!(limiter.check_at("u1", &policy, t0), RateDecision::Allowed);
        }
        assert!(matches!(
            limiter.check_at("u1", &policy, t0),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn window_rollover_resets_count() {
        let limiter = RateLimiter::new();
        let policy = tight_policy();
        let t0 = Instant::now();

        for _ in 0..3 {
            limiter.check_at("u1", &policy, t0);
        }
        let later = t0 + Duration::from_secs(61);
        assert_eq!(limiter.check_at("u1", &policy, later), RateDecision::Allowed);
    }

    #[test]
    fn repeated_violations_escalate_to_block() {
        let limiter = RateLimiter::new();
        let policy = tight_policy();
        let t0 = Instant::now();

        for _ in 0..3 {
            limiter.check_at("u1", &policy, t0);
        }
        // violation_limit = 2: first over-ceiling attempt is Limited, the
        // second escalates.
        assert!(matches!(
            limiter.check_at("u1", &policy, t0),
            RateDecision::Limited { .. }
        ));
        let blocked = limiter.check_at("u1", &policy, t0);
        let RateDecision::Blocked { retry_after } = blocked else {
            panic!("expected block, got {blocked:?}");
        };
        assert_eq!(retry_after.as_secs(), 300);

        // While blocked, every attempt is rejected without counting.
        assert!(matches!(
            limiter.check_at("u1", &policy, t0 + Duration::from_secs(10)),
            RateDecision::Blocked { .. }
        ));
    }

    #[test]
    fn block_expires_and_key_recovers() {
        let limiter = RateLimiter::new();
        let policy = tight_policy();
        let t0 = Instant::now();

        for _ in 0..5 {
            limiter.check_at("u1", &policy, t0);
        }
        assert!(matches!(
            limiter.check_at("u1", &policy, t0),
            RateDecision::Blocked { .. }
        ));

        let after_block = t0 + Duration::from_secs(301);
        assert_eq!(
            limiter.check_at("u1", &policy, after_block),
            RateDecision::Allowed
        );
    }

    #[test]
    fn second_offense_doubles_the_horizon() {
        let policy = tight_policy();
        assert_eq!(block_horizon(&policy, 1).as_secs(), 300);
        assert_eq!(block_horizon(&policy, 2).as_secs(), 600);
        assert_eq!(block_horizon(&policy, 3).as_secs(), 1_200);
        // Capped at max_block_secs.
        assert_eq!(block_horizon(&policy, 30).as_secs(), 86_400);
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = RateLimiter::new();
        let policy = tight_policy();
        let t0 = Instant::now();

        for _ in 0..4 {
            limiter.check_at("noisy", &policy, t0);
        }
        assert_eq!(limiter.check_at("quiet", &policy, t0), RateDecision::Allowed);
    }

    #[test]
    fn zero_ceiling_limits_everything() {
        let limiter = RateLimiter::new();
        let policy = RateLimitPolicy {
            max_per_window: 0,
            ..tight_policy()
        };
        assert!(matches!(
            limiter.check_at("u1", &policy, Instant::now()),
            RateDecision::Limited { .. }
        ));
    }
}
