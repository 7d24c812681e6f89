//! Rate Limiter (Token Bucket Algorithm)
//!
//! Guards the methods that start interpreters or change job state.

use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

/// Token bucket: `capacity` burst, refilled continuously at `refill_per_sec`
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `burst` - Maximum burst size (bucket starts full)
    /// * `refill_per_sec` - Tokens added per second
    ///
    /// # Example
    /// Allow 10 runs/sec with a burst of 20:
    /// `RateLimiter::new(20, 10)`
    pub fn new(burst: u32, refill_per_sec: u32) -> Self {
        Self {
            capacity: f64::from(burst),
            refill_per_sec: f64::from(refill_per_sec),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token; `false` means the caller is rate limited
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn remaining(&self) -> u32 {
        let bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.tokens.floor() as u32
    }
}
