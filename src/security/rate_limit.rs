//! Token bucket rate limiting keyed by client identity.
//!
//! Each key owns a bucket holding up to `burst` tokens, refilled continuously
//! at `requests_per_minute / 60_000` tokens per millisecond. A request costs
//! one token. Refill, decision and consumption for one key happen under that
//! key's map entry lock, so concurrent requests for the same key never both
//! spend the last token.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant, capacity: f64, refill_per_ms: f64) {
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * refill_per_ms).min(capacity);
        self.last_refill = now;
    }

    /// Full and untouched for at least `idle_ttl`.
    fn is_idle(&self, now: Instant, idle_ttl: Duration, capacity: f64, refill_per_ms: f64) -> bool {
        let idle = now.saturating_duration_since(self.last_refill);
        let projected = self.tokens + idle.as_secs_f64() * 1000.0 * refill_per_ms;
        idle >= idle_ttl && projected >= capacity
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Configured requests per minute, for `X-RateLimit-Limit`.
    pub limit: u32,
    /// Whole tokens left after this request.
    pub remaining: u64,
    /// Epoch seconds at which the bucket is full again.
    pub reset_at: u64,
    /// Seconds a denied client should wait, at least 1.
    pub retry_after_secs: u64,
}

/// Per-key token buckets sharing one rate and burst.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    requests_per_minute: u32,
    burst: u32,
    capacity: f64,
    refill_per_ms: f64,
    buckets: DashMap<String, TokenBucket>,
}

impl TokenBucketLimiter {
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self {
            requests_per_minute,
            burst: burst.max(1),
            capacity: f64::from(burst.max(1)),
            refill_per_ms: f64::from(requests_per_minute) / 60_000.0,
            buckets: DashMap::new(),
        }
    }

    /// Whether this limiter was created with the given rate and burst.
    pub fn has_rate(&self, requests_per_minute: u32, burst: u32) -> bool {
        self.requests_per_minute == requests_per_minute && self.burst == burst.max(1)
    }

    pub fn try_acquire(&self, key: &str) -> RateLimitDecision {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut bucket = match self.buckets.get_mut(key) {
            Some(bucket) => bucket,
            None => self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| TokenBucket::full(self.capacity, now)),
        };

        bucket.refill(now, self.capacity, self.refill_per_ms);
        let reset_in = self.time_to_full(bucket.tokens);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                limit: self.requests_per_minute,
                remaining: bucket.tokens.floor() as u64,
                reset_at: epoch_secs_after(reset_in),
                retry_after_secs: 0,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                limit: self.requests_per_minute,
                remaining: 0,
                reset_at: epoch_secs_after(reset_in),
                retry_after_secs: self.retry_after(bucket.tokens),
            }
        }
    }

    /// Seconds until one whole token is available, never less than one.
    fn retry_after(&self, tokens: f64) -> u64 {
        if self.refill_per_ms <= 0.0 {
            return 60;
        }
        let wait_secs = (1.0 - tokens) / self.refill_per_ms / 1000.0;
        (wait_secs.ceil() as u64).max(1)
    }

    /// A full bucket reports one minute; otherwise the time to refill completely.
    fn time_to_full(&self, tokens: f64) -> Duration {
        if tokens >= self.capacity || self.refill_per_ms <= 0.0 {
            return Duration::from_secs(60);
        }
        let needed_ms = (self.capacity - tokens) / self.refill_per_ms;
        Duration::from_millis(needed_ms.ceil() as u64)
    }

    /// Forget one key; its next request starts with a full bucket.
    pub fn reset(&self, key: &str) -> bool {
        self.buckets.remove(key).is_some()
    }

    pub fn reset_all(&self) {
        self.buckets.clear();
    }

    /// Remove buckets that are full and have been idle for `idle_ttl`.
    pub fn evict_idle(&self, idle_ttl: Duration) -> usize {
        self.evict_idle_at(idle_ttl, Instant::now())
    }

    pub fn evict_idle_at(&self, idle_ttl: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.is_idle(now, idle_ttl, self.capacity, self.refill_per_ms));
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn epoch_secs_after(delay: Duration) -> u64 {
    SystemTime::now()
        .checked_add(delay)
        .unwrap_or_else(SystemTime::now)
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
