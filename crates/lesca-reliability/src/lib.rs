//! Circuit breaker and rate limiter primitives (spec.md §4.A, §4.E).

pub mod circuit;
pub mod clock;
pub mod rate_limiter;

pub use circuit::{CircuitBreaker, CircuitConfig, CircuitError, CircuitState};
pub use clock::{Clock, RealClock};
pub use rate_limiter::RateLimiter;
