//! Single-lane rate limiter (spec.md §4.A).
//!
//! Not a token bucket: callers serialise through `acquire()`, which
//! enforces a minimum delay since the previous call and makes no burst
//! allowance. Grounded on the teacher's `reliability::RetryConfig`-style
//! config structs (plain `Default`-able data) but the gating logic itself
//! has no teacher counterpart (riptide rate-limits via its HTTP client's
//! backoff, not a standalone lane), so it is built directly from spec.md's
//! description.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Bounds {
    min_delay: Duration,
    max_delay: Duration,
}

struct State {
    bounds: Bounds,
    last_request_at: Option<Instant>,
}

/// Enforces minimum spacing between successive `acquire()` calls on a
/// single lane, with optional jitter in `[minDelay, maxDelay]`.
pub struct RateLimiter {
    state: Mutex<State>,
    jitter: bool,
    #[allow(dead_code)] // kept for parity with CircuitBreaker's injectable clock
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration, jitter: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                bounds: Bounds { min_delay, max_delay },
                last_request_at: None,
            }),
            jitter,
            clock,
        }
    }

    /// Picks a target delay, sleeps for whatever remains since the last
    /// call, then stamps `lastRequestAt = now`. Holds the state lock for
    /// the whole call, including the sleep, so concurrent callers queue up
    /// one at a time rather than racing to read the same `last_request_at`
    /// and both computing a near-zero wait.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let target = if self.jitter && state.bounds.max_delay > state.bounds.min_delay {
            let min = state.bounds.min_delay.as_millis() as u64;
            let max = state.bounds.max_delay.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(min..=max))
        } else {
            state.bounds.min_delay
        };
        let now = Instant::now();
        let sleep_for = match state.last_request_at {
            Some(last) => target.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
        state.last_request_at = Some(Instant::now());
    }

    /// Multiplies both bounds by `k` (used on detected upstream 429).
    pub async fn increase_delay(&self, k: f64) {
        let mut state = self.state.lock().await;
        state.bounds.min_delay = state.bounds.min_delay.mul_f64(k);
        state.bounds.max_delay = state.bounds.max_delay.mul_f64(k);
    }

    /// Restores explicit bounds (used to undo `increase_delay`).
    pub async fn reset_delay(&self, min: Duration, max: Duration) {
        let mut state = self.state.lock().await;
        state.bounds.min_delay = min;
        state.bounds.max_delay = max;
    }

    pub async fn current_bounds(&self) -> (Duration, Duration) {
        let state = self.state.lock().await;
        (state.bounds.min_delay, state.bounds.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::real_clock;

    #[tokio::test]
    async fn deterministic_spacing_when_bounds_equal() {
        let limiter = RateLimiter::new(
            Duration::from_millis(20),
            Duration::from_millis(20),
            true,
            real_clock(),
        );
        let t0 = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = t0.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn concurrent_callers_still_serialise_spacing() {
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(30),
            Duration::from_millis(30),
            false,
            real_clock(),
        ));
        let t0 = Instant::now();
        let a = { let l = limiter.clone(); tokio::spawn(async move { l.acquire().await; }) };
        let b = { let l = limiter.clone(); tokio::spawn(async move { l.acquire().await; }) };
        let c = { let l = limiter.clone(); tokio::spawn(async move { l.acquire().await; }) };
        a.await.unwrap();
        b.await.unwrap();
        c.await.unwrap();
        // Three callers through a 30ms single lane must take at least
        // 2x the spacing, not all land near t0 because they raced past
        // the same `last_request_at` snapshot.
        assert!(t0.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn first_call_never_sleeps() {
        let limiter = RateLimiter::new(
            Duration::from_millis(500),
            Duration::from_millis(500),
            false,
            real_clock(),
        );
        let t0 = Instant::now();
        limiter.acquire().await;
        assert!(t0.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn increase_delay_widens_bounds() {
        let limiter = RateLimiter::new(
            Duration::from_millis(10),
            Duration::from_millis(20),
            true,
            real_clock(),
        );
        limiter.increase_delay(3.0).await;
        let (min, max) = limiter.current_bounds().await;
        assert_eq!(min, Duration::from_millis(30));
        assert_eq!(max, Duration::from_millis(60));
    }

    #[tokio::test]
    async fn reset_delay_restores_bounds() {
        let limiter = RateLimiter::new(
            Duration::from_millis(10),
            Duration::from_millis(20),
            true,
            real_clock(),
        );
        limiter.increase_delay(5.0).await;
        limiter.reset_delay(Duration::from_millis(10), Duration::from_millis(20)).await;
        let (min, max) = limiter.current_bounds().await;
        assert_eq!(min, Duration::from_millis(10));
        assert_eq!(max, Duration::from_millis(20));
    }
}
