//! Client-side token bucket for platform API calls.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::trace;

/// Configuration for a rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens (burst capacity).
    pub max_tokens: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
    pub initial_tokens: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            refill_rate: 1.0,
            initial_tokens: 10,
        }
    }
}

impl RateLimiterConfig {
    /// Config for a requests-per-second limit, allowing bursts of twice that.
    pub fn with_rps(rps: f64) -> crate::Result<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(crate::Error::config(format!(
                "rate limit must be a positive finite number, got {rps}"
            )));
        }

        let max_tokens = (rps * 2.0).ceil().max(1.0) as u32;

        Ok(Self {
            max_tokens,
            refill_rate: rps,
            initial_tokens: max_tokens,
        })
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    max_tokens: u32,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens as f64);
        self.last_refill = now;
    }
}

/// Token bucket shared by every request to one platform.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.initial_tokens as f64,
                max_tokens: config.max_tokens,
                refill_rate: config.refill_rate,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn try_acquire(&self) -> bool {
        self.bucket.lock().await.try_acquire()
    }

    /// Acquire a token, waiting if necessary. Returns the time spent waiting.
    ///
    /// # Cancel Safety
    ///
    /// The lock is never held across the sleep, so dropping this future
    /// consumes no token and leaves the bucket consistent.
    pub async fn acquire(&self) -> Duration {
        let mut total_wait = Duration::ZERO;

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                if bucket.try_acquire() {
                    return total_wait;
                }
                bucket.time_until_available()
            };

            trace!(wait = ?wait, "rate limited");
            tokio::time::sleep(wait).await;
            total_wait += wait;
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        bucket.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
