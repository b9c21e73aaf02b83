//! Token-budget rate limiting for the embedding endpoint
//!
//! The embedding provider enforces a tokens-per-minute budget, so the
//! limiter meters estimated token cost rather than request count. A simple
//! poll-based bucket is enough here: callers are batch workers, not
//! latency-sensitive request handlers.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// How long to sleep between refill polls while waiting for capacity
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A token bucket metering estimated embedding tokens.
///
/// Capacity and refill are expressed in tokens; refill accrues continuously
/// based on elapsed time. `acquire` blocks (async) until the requested cost
/// is available, so callers never observe a rejected acquisition.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_second: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket from a tokens-per-minute budget. The bucket starts
    /// full, so the first burst up to `tokens_per_minute` is not delayed.
    pub fn per_minute(tokens_per_minute: f64) -> Self {
        Self::new(tokens_per_minute, tokens_per_minute / 60.0)
    }

    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_second,
        }
    }

    /// Wait until `cost` tokens are available, then deduct them.
    ///
    /// Costs larger than the bucket capacity are clamped to the capacity:
    /// an oversized batch waits for a full bucket rather than forever.
    pub async fn acquire(&self, cost: f64) {
        let cost = cost.min(self.capacity);

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens =
                    (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= cost {
                    state.tokens -= cost;
                    None
                } else {
                    Some(state.tokens)
                }
            };

            match wait {
                None => return,
                Some(available) => {
                    debug!(
                        cost,
                        available, "Waiting for embedding token budget to refill"
                    );
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    #[cfg(test)]
    async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = Instant::now();
        state.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_burst_is_immediate() {
        let bucket = TokenBucket::new(100.0, 10.0);
        let start = Instant::now();
        bucket.acquire(100.0).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_refill() {
        // 20 tokens/sec refill; draining the bucket then asking for 10 more
        // should take roughly half a second
        let bucket = TokenBucket::new(10.0, 20.0);
        bucket.acquire(10.0).await;

        let start = Instant::now();
        bucket.acquire(10.0).await;
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_oversized_cost_is_clamped() {
        let bucket = TokenBucket::new(10.0, 1000.0);
        // Without clamping this would never complete
        bucket.acquire(50.0).await;
        assert!(bucket.available().await < 10.0);
    }

    #[tokio::test]
    async fn test_refill_caps_at_capacity() {
        let bucket = TokenBucket::new(5.0, 1000.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bucket.available().await <= 5.0);
    }
}
