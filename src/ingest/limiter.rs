//! Token-bucket rate limiter.
//!
//! Hand-rolled: no rate-limiter crate is used anywhere in the surveyed
//! corpus (see DESIGN.md), so this is built directly on `tokio::time` and
//! atomics, a lightweight `Arc<AtomicUsize>`-style concurrency primitive.
//! One instance is owned per upstream host or per investigation model; the
//! caller is responsible for sharing an `Arc` across workers that must
//! coordinate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single-bucket token limiter: `capacity` tokens, refilled continuously
/// at `rate_per_sec`. `acquire` suspends the caller until a token is
/// available rather than rejecting outright, since the ingester always
/// wants to eventually make progress rather than fail fast.
pub struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    state: Mutex<BucketState>,
    acquired_total: AtomicU64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            capacity: burst.max(1) as f64,
            rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: burst.max(1) as f64,
                last_refill: Instant::now(),
            }),
            acquired_total: AtomicU64::new(0),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Waits until a token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    self.acquired_total.fetch_add(1, Ordering::Relaxed);
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.rate_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    pub fn acquired_total(&self) -> u64 {
        self.acquired_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_of_one_serializes_calls() {
        let bucket = TokenBucket::new(1000.0, 1);
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(bucket.acquired_total(), 2);
    }

    #[tokio::test]
    async fn refill_eventually_allows_another_token() {
        let bucket = TokenBucket::new(1000.0, 1);
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(bucket.acquired_total(), 2);
    }
}
