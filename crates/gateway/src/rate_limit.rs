//! Per-caller command budgets.
//!
//! Fixed-window counters keyed by `(identity, operation class)`.  A window
//! resets completely once it has elapsed; nothing carries over.  Buckets are
//! created lazily and each one sits behind its own lock, so unrelated callers
//! never contend beyond the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use fg_domain::config::{RateLimitsConfig, WindowLimit};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    identity: String,
    class: String,
}

struct Bucket {
    window_start: Instant,
    window: Duration,
    limit: u32,
    used: u32,
}

impl Bucket {
    fn elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

/// Result of a [`RateLimiter::try_consume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Units left in the current window after this call.
    pub remaining: u32,
    /// Time until the window resets.  Zero when allowed.
    pub retry_after: Duration,
}

impl Decision {
    /// `retry_after` rounded up to whole seconds, never below 1 when denied.
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed {
            return 0;
        }
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RateLimiter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RateLimiter {
    config: RateLimitsConfig,
    buckets: Mutex<HashMap<BucketKey, Arc<Mutex<Bucket>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitsConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit_for(&self, class: &str) -> WindowLimit {
        self.config.for_class(class)
    }

    /// Consume one unit for `(identity, class)` if the window has room.
    pub fn try_consume(&self, identity: &str, class: &str) -> Decision {
        self.try_consume_at(identity, class, Instant::now())
    }

    pub fn try_consume_at(&self, identity: &str, class: &str, now: Instant) -> Decision {
        let bucket = {
            let mut buckets = self.buckets.lock();
            buckets
                .entry(BucketKey {
                    identity: identity.to_owned(),
                    class: class.to_owned(),
                })
                .or_insert_with(|| {
                    let limit = self.config.for_class(class);
                    Arc::new(Mutex::new(Bucket {
                        window_start: now,
                        window: Duration::from_secs(limit.window_secs),
                        limit: limit.limit,
                        used: 0,
                    }))
                })
                .clone()
        };

        let mut bucket = bucket.lock();
        if bucket.elapsed(now) {
            bucket.window_start = now;
            bucket.used = 0;
        }

        if bucket.used < bucket.limit {
            bucket.used += 1;
            Decision {
                allowed: true,
                remaining: bucket.limit - bucket.used,
                retry_after: Duration::ZERO,
            }
        } else {
            let reset_at = bucket.window_start + bucket.window;
            Decision {
                allowed: false,
                remaining: 0,
                retry_after: reset_at.saturating_duration_since(now),
            }
        }
    }

    /// Number of tracked buckets (for monitoring).
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Drop buckets whose window has elapsed; they would reset on next use
    /// anyway.  Buckets a consumer has already looked up are kept, so every
    /// unit it spends lands in the bucket the map still serves.  Returns how
    /// many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            Arc::strong_count(bucket) > 1 || !bucket.lock().elapsed(now)
        });
        before - buckets.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(files_limit: u32, window_secs: u64) -> RateLimiter {
        let mut config = RateLimitsConfig::default();
        config.classes.insert(
            "files".into(),
            WindowLimit {
                limit: files_limit,
                window_secs,
            },
        );
        RateLimiter::new(config)
    }

    #[test]
    fn denies_after_limit_with_retry_after() {
        let rl = limiter(3, 60);
        let now = Instant::now();
        for i in 0..3 {
            let d = rl.try_consume_at("alice", "files", now);
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.remaining, 2 - i);
        }
        let denied = rl.try_consume_at("alice", "files", now + Duration::from_secs(10));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(50));
        assert_eq!(denied.retry_after_secs(), 50);
    }

    #[test]
    fn classes_have_independent_buckets() {
        let rl = limiter(1, 60);
        let now = Instant::now();
        assert!(rl.try_consume_at("alice", "files", now).allowed);
        assert!(!rl.try_consume_at("alice", "files", now).allowed);
        assert!(rl.try_consume_at("alice", "search", now).allowed);
    }

    #[test]
    fn identities_have_independent_buckets() {
        let rl = limiter(1, 60);
        let now = Instant::now();
        assert!(rl.try_consume_at("alice", "files", now).allowed);
        assert!(rl.try_consume_at("bob", "files", now).allowed);
        assert_eq!(rl.bucket_count(), 2);
    }

    #[test]
    fn window_resets_fully_at_boundary() {
        let rl = limiter(2, 10);
        let start = Instant::now();
        assert!(rl.try_consume_at("a", "files", start).allowed);
        assert!(rl.try_consume_at("a", "files", start).allowed);
        assert!(!rl.try_consume_at("a", "files", start + Duration::from_secs(9)).allowed);

        let next = start + Duration::from_secs(10);
        let d = rl.try_consume_at("a", "files", next);
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn retry_after_rounds_up_and_is_never_zero_when_denied() {
        let denied = Decision {
            allowed: false,
            remaining: 0,
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(denied.retry_after_secs(), 2);

        let edge = Decision {
            allowed: false,
            remaining: 0,
            retry_after: Duration::ZERO,
        };
        assert_eq!(edge.retry_after_secs(), 1);
    }

    #[test]
    fn prune_drops_only_elapsed_buckets() {
        let rl = limiter(5, 10);
        let start = Instant::now();
        rl.try_consume_at("old", "files", start);
        rl.try_consume_at("fresh", "files", start + Duration::from_secs(8));

        assert_eq!(rl.prune_at(start + Duration::from_secs(11)), 1);
        assert_eq!(rl.bucket_count(), 1);
    }

    #[test]
    fn prune_keeps_a_bucket_that_is_being_consumed() {
        let rl = limiter(1, 10);
        let start = Instant::now();
        assert!(rl.try_consume_at("alice", "files", start).allowed);

        let key = BucketKey {
            identity: "alice".into(),
            class: "files".into(),
        };
        let in_flight = rl.buckets.lock()[&key].clone();
        let later = start + Duration::from_secs(11);
        assert_eq!(rl.prune_at(later), 0);

        // The in-flight consumer and the next caller share one window.
        {
            let mut bucket = in_flight.lock();
            assert!(bucket.elapsed(later));
            bucket.window_start = later;
            bucket.used = 1;
        }
        assert!(!rl.try_consume_at("alice", "files", later).allowed);

        drop(in_flight);
        assert_eq!(rl.prune_at(later + Duration::from_secs(10)), 1);
        assert_eq!(rl.bucket_count(), 0);
    }

    #[test]
    fn concurrent_consumers_never_exceed_the_limit() {
        let rl = Arc::new(limiter(50, 60));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| rl.try_consume("shared", "files").allowed)
                        .count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
    }
}
