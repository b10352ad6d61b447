//! Human-like delay generation (spec.md §4.J): a base delay drawn
//! uniformly from `[min, max]`, with optional Gaussian jitter of ±15%
//! via Box–Muller. Grounded on the teacher's
//! `riptide-stealth::behavior::BehaviorSimulator`'s use of `rand_distr`
//! for mouse-path/timing jitter, simplified here to a single scalar.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl DelayConfig {
    pub const fn off() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    pub const fn balanced() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 200,
            jitter: true,
        }
    }

    pub const fn aggressive() -> Self {
        Self {
            min_delay_ms: 150,
            max_delay_ms: 600,
            jitter: true,
        }
    }

    /// Draws a delay using `rng`. Base is uniform in `[min, max]`
    /// (inclusive); when `jitter` is set, a Gaussian sample with mean 0
    /// and standard deviation `0.15 * base` is added via Box–Muller and
    /// the result is clamped to non-negative.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::from_millis(0);
        }
        let base = if self.min_delay_ms >= self.max_delay_ms {
            self.min_delay_ms
        } else {
            rng.gen_range(self.min_delay_ms..=self.max_delay_ms)
        } as f64;

        let millis = if self.jitter && base > 0.0 {
            let stddev = base * 0.15;
            let normal = Normal::new(0.0, stddev).expect("stddev is non-negative for base > 0");
            (base + normal.sample(rng)).max(0.0)
        } else {
            base
        };

        Duration::from_millis(millis.round() as u64)
    }
}
