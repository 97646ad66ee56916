//! Token-bucket rate limiter shared by calls to the same upstream service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ClausebookError, Result};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket refilled at `rate` tokens per second up to `burst`.
///
/// Clones share the same bucket, so every component holding a clone is
/// paced against the same upstream budget. Waiters are served in lock
/// order; [`RateLimiter::acquire`] never fails, it only delays.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst: u32) -> Result<Self> {
        if !(requests_per_second > 0.0) || burst == 0 {
            return Err(ClausebookError::InvalidConfig(format!(
                "rate limiter needs a positive rate and burst, got {requests_per_second}/s burst {burst}"
            )));
        }
        Ok(Self {
            rate: requests_per_second,
            burst: f64::from(burst),
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            })),
        })
    }

    /// A limiter that never delays.
    pub fn unlimited() -> Self {
        Self {
            rate: f64::INFINITY,
            burst: f64::INFINITY,
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: f64::INFINITY,
                last_refill: Instant::now(),
            })),
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        self.rate
    }

    /// Wait until one token is available and take it.
    pub async fn acquire(&self) {
        if self.rate.is_infinite() {
            return;
        }
        let mut bucket = self.bucket.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter pacing call");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate_then_paced() {
        let limiter = RateLimiter::new(1.0, 2).unwrap();
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(990), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_bucket() {
        let limiter = RateLimiter::new(2.0, 1).unwrap();
        let other = limiter.clone();
        let start = Instant::now();

        limiter.acquire().await;
        other.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(490));
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(RateLimiter::new(0.0, 1).is_err());
        assert!(RateLimiter::new(1.0, 0).is_err());
        assert!(RateLimiter::new(f64::NAN, 1).is_err());
    }
}
