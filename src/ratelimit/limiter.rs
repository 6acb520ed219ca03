//! In-memory token bucket limiter.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for a single rate limit.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window.
    pub capacity: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Remaining requests in the current window.
    pub remaining: u32,
    /// Seconds to wait before retrying (0 if allowed).
    pub retry_after: u64,
}

/// Per-identity token bucket. Invariant: `tokens <= capacity`.
struct ClientBucket {
    tokens: u32,
    last_refill: Instant,
}

/// Token bucket rate limiter over a concurrent map.
///
/// Buckets are created lazily on first sight of an identity. Refill is
/// whole-window: a bucket snaps back to full capacity once its window has
/// fully elapsed, it never accrues tokens incrementally.
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<ClientBucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Check and consume one token for `identity`.
    pub fn check(&self, identity: &str) -> RateLimitResult {
        let now = Instant::now();
        let entry = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| {
                Mutex::new(ClientBucket {
                    tokens: self.config.capacity,
                    last_refill: now,
                })
            });
        let mut bucket = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if now.duration_since(bucket.last_refill) >= self.config.window {
            bucket.tokens = self.config.capacity;
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            RateLimitResult {
                allowed: true,
                limit: self.config.capacity,
                remaining: bucket.tokens,
                retry_after: 0,
            }
        } else {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(bucket.last_refill))
                .as_secs()
                .max(1);
            RateLimitResult {
                allowed: false,
                limit: self.config.capacity,
                remaining: 0,
                retry_after,
            }
        }
    }

    /// Drop buckets idle for longer than `max_idle`. Returns the number of
    /// buckets removed.
    pub fn sweep_stale(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let bucket = bucket.get_mut().unwrap_or_else(PoisonError::into_inner);
            now.duration_since(bucket.last_refill) < max_idle
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Spawn a background task sweeping stale buckets every `interval`
    /// until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        max_idle: Duration,
        shutdown: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(interval) => {
                        let removed = self.sweep_stale(max_idle);
                        if removed > 0 {
                            debug!(removed, "swept stale rate limit buckets");
                        }
                    }
                }
            }
        });
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig { capacity, window })
    }

    #[test]
    fn allows_exactly_capacity_requests() {
        let limiter = limiter(3, Duration::from_secs(60));
        for i in 0..3 {
            let result = limiter.check("10.0.0.1");
            assert!(result.allowed, "request {i} should be allowed");
            assert_eq!(result.remaining, 2 - i);
        }
        let denied = limiter.check("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after >= 1);
    }

    #[test]
    fn identities_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1").allowed);
        assert!(!limiter.check("10.0.0.1").allowed);
        assert!(limiter.check("10.0.0.2").allowed);
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[test]
    fn whole_window_refill() {
        let limiter = limiter(2, Duration::from_millis(50));
        assert!(limiter.check("client").allowed);
        assert!(limiter.check("client").allowed);
        assert!(!limiter.check("client").allowed);

        // Partial elapse must not restore any tokens.
        std::thread::sleep(Duration::from_millis(10));
        assert!(!limiter.check("client").allowed);

        std::thread::sleep(Duration::from_millis(60));
        let result = limiter.check("client");
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }

    #[test]
    fn sweep_removes_only_idle_buckets() {
        let limiter = limiter(5, Duration::from_secs(60));
        limiter.check("old");
        std::thread::sleep(Duration::from_millis(30));
        limiter.check("fresh");

        let removed = limiter.sweep_stale(Duration::from_millis(20));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_identities(), 1);
    }
}
