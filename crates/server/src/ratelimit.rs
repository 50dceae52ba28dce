//! Token-bucket rate limiting for the ingestion endpoint.
//!
//! One bucket per source key (the authenticated token, or the peer
//! address as fallback). Capacity refills continuously at capacity per
//! minute; a batch is admitted whole or rejected whole, so partial
//! acceptance never happens. State is process-local and lost on restart,
//! which the ingestion contract allows.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tracing::debug;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    /// Tokens per second.
    refill_rate: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// `capacity` is both the bucket size and the per-minute refill.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate: capacity as f64 / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit `amount` units for `key`. On rejection, returns the
    /// seconds until the deficit would refill.
    pub fn try_acquire(&self, key: &str, amount: u64) -> Result<(), u64> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        let amount = amount as f64;
        if amount <= bucket.tokens {
            bucket.tokens -= amount;
            Ok(())
        } else {
            let deficit = amount - bucket.tokens;
            let retry_after = (deficit / self.refill_rate).ceil() as u64;
            debug!(key, retry_after, "rate limit exceeded");
            Err(retry_after.max(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_until_capacity() {
        let limiter = RateLimiter::new(100);
        assert!(limiter.try_acquire("a", 60).is_ok());
        assert!(limiter.try_acquire("a", 40).is_ok());
        assert!(limiter.try_acquire("a", 1).is_err());
    }

    #[test]
    fn test_whole_batch_or_nothing() {
        let limiter = RateLimiter::new(10);
        assert!(limiter.try_acquire("a", 8).is_ok());
        // 5 does not fit in the remaining 2; nothing is consumed.
        assert!(limiter.try_acquire("a", 5).is_err());
        assert!(limiter.try_acquire("a", 2).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(10);
        assert!(limiter.try_acquire("a", 10).is_ok());
        assert!(limiter.try_acquire("b", 10).is_ok());
        assert!(limiter.try_acquire("a", 1).is_err());
    }

    #[test]
    fn test_retry_after_scales_with_deficit() {
        let limiter = RateLimiter::new(60); // 1 token/sec
        assert!(limiter.try_acquire("a", 60).is_ok());
        let retry = limiter.try_acquire("a", 30).unwrap_err();
        assert!((29..=31).contains(&retry), "retry_after = {retry}");
    }

    #[test]
    fn test_equal_capacity_shares_proportionally() {
        // Two saturated keys with the same capacity admit the same amount.
        let limiter = RateLimiter::new(50);
        let mut admitted_a = 0;
        let mut admitted_b = 0;
        for _ in 0..100 {
            if limiter.try_acquire("a", 1).is_ok() {
                admitted_a += 1;
            }
            if limiter.try_acquire("b", 1).is_ok() {
                admitted_b += 1;
            }
        }
        assert_eq!(admitted_a, admitted_b);
        assert_eq!(admitted_a, 50);
    }
}
