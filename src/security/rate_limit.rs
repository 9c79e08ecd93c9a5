//! Token bucket rate limiting for `POST /execute`
//!
//! Each execution spawns an interpreter, so a flood of requests from one
//! misbehaving agent could starve every other conversation. The bucket
//! admits bursts up to `capacity` and then `refill_rate` requests per second.
//!
//! ```text
//!   capacity=50, refill_rate=10/s
//!   ┌──────────────┐
//!   │ ● ● ● ● ● ●  │ ◄── +10 tokens/s, capped at 50
//!   └──────┬───────┘
//!          ▼
//!   request: token? ── yes ─► execute
//!                    └─ no ──► 429 Too Many Requests (Retry-After)
//! ```

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket
pub struct RateLimiter {
    capacity: u64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// `capacity` is the burst size, `refill_rate` tokens are added per second
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 50 burst, 10 requests/sec
    pub fn with_defaults() -> Self {
        Self::new(50, 10.0)
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available (for monitoring)
    pub fn available_tokens(&self) -> u64 {
        match self.bucket.lock() {
            Ok(bucket) => bucket.tokens.floor() as u64,
            Err(poisoned) => poisoned.into_inner().tokens.floor() as u64,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Time until one token is available again
    pub fn retry_after(&self) -> Duration {
        if self.refill_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.refill_rate)
        } else {
            Duration::from_secs(1)
        }
    }
}
