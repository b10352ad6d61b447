//! Injectable clock, grounded on the teacher's `circuit::Clock` trait —
//! lets breaker/rate-limiter tests advance time deterministically instead
//! of sleeping.

use std::sync::Arc;

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> i64;
}

#[derive(Default, Debug)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as i64
    }
}

pub fn real_clock() -> Arc<dyn Clock> {
    Arc::new(RealClock)
}
