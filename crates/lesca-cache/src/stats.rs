//! Cache hit/miss statistics (spec.md §4.B "getStats").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1: TierStats,
    pub l2: TierStats,
    pub aggregate: TierStats,
}
