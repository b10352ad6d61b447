//! On-disk JSON envelope for an L2 cache entry (spec.md §3, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub key: String,
    /// JSON-serialised value, or base64(gzip(JSON)) when `compressed`.
    pub data: String,
    pub timestamp: i64,
    pub ttl: u64,
    pub compressed: bool,
}
