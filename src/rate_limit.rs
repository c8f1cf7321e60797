//! Outbound call throttling.
//!
//! Token bucket rate limiting keyed by backend, so that every call site
//! hitting the same external system draws from the same bucket.
//!
//! # Configuration
//!
//! - `KEYWARD_RATE_LIMIT_PER_SECOND`: tokens added per second (default: 1)
//! - `KEYWARD_RATE_LIMIT_BURST`: bucket capacity (default: 1)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Bucket keys used by the built-in call sites.
pub mod keys {
    pub const DIRECTORY: &str = "directory";
    pub const VAULT: &str = "vault";
    pub const CI: &str = "ci";
    pub const REPOSITORY_SECRETS: &str = "repository_secrets";
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    last_refill: Instant,
    refill_rate_per_sec: f64,
}

impl TokenBucket {
    fn new(max_tokens: u32, refill_rate_per_sec: f64) -> Self {
        Self {
            tokens: max_tokens as f64,
            max_tokens: max_tokens as f64,
            last_refill: Instant::now(),
            refill_rate_per_sec,
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_consume(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate_per_sec).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let seconds_until_refill = (1.0 - self.tokens) / self.refill_rate_per_sec;
            Err(Duration::from_secs_f64(seconds_until_refill))
        }
    }
}

/// Keyed token bucket limiter. Clones share buckets.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    max_tokens: u32,
    refill_rate_per_sec: f64,
}

impl RateLimiter {
    /// `max_tokens` requests allowed per `refill_period`, bursting up to
    /// `max_tokens`.
    pub fn new(max_tokens: u32, refill_period: Duration) -> Self {
        let max_tokens = max_tokens.max(1);
        let refill_rate_per_sec = max_tokens as f64 / refill_period.as_secs_f64().max(f64::EPSILON);
        Self::with_rate(max_tokens, refill_rate_per_sec)
    }

    /// `rate` tokens per second with a bucket of `burst` tokens.
    pub fn per_second(rate: u32, burst: u32) -> Self {
        Self::with_rate(burst.max(1), rate.max(1) as f64)
    }

    /// Effectively unthrottled; used by tests and dry demos.
    pub fn unlimited() -> Self {
        Self::with_rate(u32::MAX, f64::MAX)
    }

    fn with_rate(max_tokens: u32, refill_rate_per_sec: f64) -> Self {
        Self { buckets: Arc::new(Mutex::new(HashMap::new())), max_tokens, refill_rate_per_sec }
    }

    /// Take a token for `key` without waiting.
    ///
    /// Returns the time until the next token when the bucket is empty.
    pub async fn try_acquire(&self, key: &str) -> Result<(), Duration> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.max_tokens, self.refill_rate_per_sec));

        bucket.try_consume()
    }

    /// Wait until a token for `key` is available and take it.
    ///
    /// ```
    /// use keyward::rate_limit::{keys, RateLimiter};
    ///
    /// # tokio_test::block_on(async {
    /// let limiter = RateLimiter::per_second(10, 2);
    /// limiter.acquire(keys::VAULT).await;
    /// limiter.acquire(keys::VAULT).await;
    /// assert!(limiter.try_acquire(keys::VAULT).await.is_err());
    /// assert!(limiter.try_acquire(keys::DIRECTORY).await.is_ok());
    /// # });
    /// ```
    pub async fn acquire(&self, key: &str) {
        loop {
            match self.try_acquire(key).await {
                Ok(()) => {
                    trace!(key = %key, "Rate limit token acquired");
                    return;
                }
                Err(wait) => {
                    debug!(key = %key, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_second(1, 1)
    }
}
