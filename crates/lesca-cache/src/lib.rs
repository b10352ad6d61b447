//! Two-tier read-through cache (spec.md §4.B): an in-memory LRU (L1) in
//! front of a gzip-compressed, sharded on-disk store (L2).
//!
//! Grounded on the teacher's `riptide-core::cache::CacheManager` for the
//! envelope shape (`{data, created_at/timestamp, ttl}`) and its
//! `sha2`-based key hashing in `cache_key.rs`, but re-pointed at the
//! local filesystem instead of Redis since spec.md's tiered cache has no
//! external cache server — L1 is `lru::LruCache` guarded by a
//! `parking_lot::Mutex` (spec.md §5 "mutex over the LRU structure"), L2
//! writes go through a temp-file + rename exactly like the session store
//! (spec.md §4.C "Atomic write").

pub mod entry;
mod graphql_key;
pub mod stats;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

pub use entry::CacheEnvelope;
pub use graphql_key::graphql_cache_key;
pub use stats::{CacheStats, TierStats};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// L1 max resident entries.
    pub l1_max_entries: usize,
    /// Default TTL applied when L1 is populated from an L2 hit.
    pub l1_default_ttl_ms: u64,
    /// Root directory for the L2 shard tree.
    pub l2_root: PathBuf,
    /// Total L2 size budget in bytes; exceeding it evicts the
    /// smallest-`timestamp` entry before each write.
    pub l2_max_size_bytes: u64,
    /// Enable gzip compression for L2 payloads over the threshold.
    pub compression_enabled: bool,
    /// Payloads at or under this size are stored uncompressed even when
    /// compression is enabled (spec.md: "exceeds 1 KiB").
    pub compression_threshold_bytes: usize,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: 500,
            l1_default_ttl_ms: 5 * 60_000,
            l2_root: PathBuf::from(".lesca-cache"),
            l2_max_size_bytes: 256 * 1024 * 1024,
            compression_enabled: true,
            compression_threshold_bytes: 1024,
        }
    }
}

struct L1Entry<V> {
    data: V,
    stored_at_ms: i64,
    ttl_ms: u64,
}

impl<V> L1Entry<V> {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) as u64 > self.ttl_ms
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

struct TierCounters {
    hits: u64,
    misses: u64,
}

impl Default for TierCounters {
    fn default() -> Self {
        Self { hits: 0, misses: 0 }
    }
}

impl TierCounters {
    fn stats(&self) -> TierStats {
        let total = self.hits + self.misses;
        TierStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                self.hits as f64 / total as f64
            },
        }
    }
}

/// Two-tier read-through cache over an opaque, serde-serialisable value
/// type `V`.
pub struct TieredCache<V> {
    config: TieredCacheConfig,
    l1: Mutex<LruCache<String, L1Entry<V>>>,
    l1_counters: Mutex<TierCounters>,
    l2_counters: Mutex<TierCounters>,
}

impl<V> TieredCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(config: TieredCacheConfig) -> Self {
        let cap = std::num::NonZeroUsize::new(config.l1_max_entries.max(1)).unwrap();
        Self {
            config,
            l1: Mutex::new(LruCache::new(cap)),
            l1_counters: Mutex::new(TierCounters::default()),
            l2_counters: Mutex::new(TierCounters::default()),
        }
    }

    fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn shard_path(&self, key: &str) -> PathBuf {
        let hash = Self::hash_key(key);
        self.config
            .l2_root
            .join(&hash[0..2])
            .join(format!("{hash}.json"))
    }

    /// `get` checks L1 first; on miss, reads L2 and, on hit, populates L1
    /// with L1's default TTL (spec.md §4.B "Contract").
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(v) = self.get_l1(key) {
            return Some(v);
        }
        match self.get_l2(key).await {
            Some(v) => {
                self.put_l1(key, v.clone(), self.config.l1_default_ttl_ms);
                Some(v)
            }
            None => None,
        }
    }

    fn get_l1(&self, key: &str) -> Option<V> {
        let mut l1 = self.l1.lock();
        let now = now_ms();
        let expired = l1.peek(key).is_some_and(|e| e.is_expired(now));
        if expired {
            l1.pop(key);
        }
        let hit = l1.get(key).map(|e| e.data.clone());
        let mut counters = self.l1_counters.lock();
        if hit.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        hit
    }

    fn put_l1(&self, key: &str, value: V, ttl_ms: u64) {
        let mut l1 = self.l1.lock();
        l1.put(
            key.to_string(),
            L1Entry {
                data: value,
                stored_at_ms: now_ms(),
                ttl_ms,
            },
        );
    }

    async fn get_l2(&self, key: &str) -> Option<V> {
        let path = self.shard_path(key);
        let result = tokio::task::spawn_blocking(move || Self::read_l2_file(&path))
            .await
            .ok()
            .flatten();
        let mut counters = self.l2_counters.lock();
        match &result {
            Some(_) => counters.hits += 1,
            None => counters.misses += 1,
        }
        result.and_then(|envelope| {
            let now = now_ms();
            if envelope.is_expired(now) {
                None
            } else {
                Self::decode_envelope(&envelope).ok()
            }
        })
    }

    fn read_l2_file(path: &Path) -> Option<CacheEnvelope> {
        let bytes = std::fs::read(path).ok()?;
        let envelope: CacheEnvelope = serde_json::from_slice(&bytes).ok()?;
        let now = now_ms();
        if envelope.is_expired(now) {
            let _ = std::fs::remove_file(path);
            return None;
        }
        Some(envelope)
    }

    fn decode_envelope(envelope: &CacheEnvelope) -> Result<V, CacheError> {
        let json_bytes: Vec<u8> = if envelope.compressed {
            let raw = base64::engine::general_purpose::STANDARD
                .decode(envelope.data.as_bytes())
                .map_err(|e| CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut out = Vec::new();
            std::io::Read::read_to_end(&mut decoder, &mut out)?;
            out
        } else {
            envelope.data.as_bytes().to_vec()
        };
        Ok(serde_json::from_slice(&json_bytes)?)
    }

    /// Write-through both tiers. `ttl_ms` governs both the L1 entry and
    /// the L2 envelope.
    pub async fn set(&self, key: &str, value: V, ttl_ms: u64) -> Result<(), CacheError> {
        self.put_l1(key, value.clone(), ttl_ms);
        self.set_l2(key, &value, ttl_ms).await
    }

    async fn set_l2(&self, key: &str, value: &V, ttl_ms: u64) -> Result<(), CacheError> {
        let json = serde_json::to_vec(value)?;
        let (data, compressed) = if self.config.compression_enabled
            && json.len() > self.config.compression_threshold_bytes
        {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            std::io::Write::write_all(&mut encoder, &json)?;
            let gz = encoder.finish()?;
            (base64::engine::general_purpose::STANDARD.encode(gz), true)
        } else {
            (String::from_utf8_lossy(&json).into_owned(), false)
        };

        let envelope = CacheEnvelope {
            key: key.to_string(),
            data,
            timestamp: now_ms(),
            ttl: ttl_ms,
            compressed,
        };

        let path = self.shard_path(key);
        let root = self.config.l2_root.clone();
        let max_size = self.config.l2_max_size_bytes;
        tokio::task::spawn_blocking(move || Self::write_l2_file(&root, &path, &envelope, max_size))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        Ok(())
    }

    fn write_l2_file(
        root: &Path,
        path: &Path,
        envelope: &CacheEnvelope,
        max_size: u64,
    ) -> Result<(), CacheError> {
        Self::evict_until_under_budget(root, max_size)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(envelope)?;
        let tmp_path = path.with_extension(format!("json.tmp.{}.{}", now_ms(), fastrand::u32(..)));
        let write_result = std::fs::write(&tmp_path, &bytes).and_then(|_| std::fs::rename(&tmp_path, path));
        if write_result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        write_result?;
        Ok(())
    }

    fn evict_until_under_budget(root: &Path, max_size: u64) -> Result<(), CacheError> {
        loop {
            let entries = Self::scan_l2(root)?;
            let total: u64 = entries.iter().map(|(_, size, _)| *size).sum();
            if total < max_size || entries.is_empty() {
                return Ok(());
            }
            if let Some((oldest_path, _, _)) =
                entries.into_iter().min_by_key(|(_, _, ts)| *ts)
            {
                let _ = std::fs::remove_file(oldest_path);
            } else {
                return Ok(());
            }
        }
    }

    fn scan_l2(root: &Path) -> Result<Vec<(PathBuf, u64, i64)>, CacheError> {
        let mut out = Vec::new();
        if !root.exists() {
            return Ok(out);
        }
        for shard in std::fs::read_dir(root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(shard.path())? {
                let file = file?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let size = file.metadata()?.len();
                let timestamp = std::fs::read(&path)
                    .ok()
                    .and_then(|b| serde_json::from_slice::<CacheEnvelope>(&b).ok())
                    .map(|e| e.timestamp)
                    .unwrap_or(0);
                out.push((path, size, timestamp));
            }
        }
        Ok(out)
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1.lock().pop(key);
        let path = self.shard_path(key);
        tokio::task::spawn_blocking(move || {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            Ok::<_, CacheError>(())
        })
        .await
        .map_err(|e| CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.l1.lock().clear();
        let root = self.config.l2_root.clone();
        tokio::task::spawn_blocking(move || {
            if root.exists() {
                std::fs::remove_dir_all(&root)?;
            }
            Ok::<_, CacheError>(())
        })
        .await
        .map_err(|e| CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        debug!("cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let l1 = self.l1_counters.lock().stats();
        let l2 = self.l2_counters.lock().stats();
        let aggregate = TierStats {
            hits: l1.hits + l2.hits,
            misses: l2.misses, // an L1 miss that hits L2 is not a cache miss overall
            hit_rate: {
                let total_hits = l1.hits + l2.hits;
                let total = total_hits + l2.misses;
                if total == 0 {
                    0.0
                } else {
                    total_hits as f64 / total as f64
                }
            },
        };
        CacheStats { l1, l2, aggregate }
    }
}

impl CacheEnvelope {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) as u64 > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Payload {
        body: String,
    }

    fn cache(dir: &Path) -> TieredCache<Payload> {
        TieredCache::new(TieredCacheConfig {
            l1_max_entries: 2,
            l2_root: dir.to_path_buf(),
            compression_threshold_bytes: 8,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn round_trips_through_both_tiers() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());
        let value = Payload { body: "hello world".into() };
        cache.set("k1", value.clone(), 10_000).await.unwrap();
        assert_eq!(cache.get("k1").await, Some(value));
    }

    #[tokio::test]
    async fn l2_hit_repopulates_l1() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());
        let value = Payload { body: "x".repeat(50) };
        cache.set("k1", value.clone(), 10_000).await.unwrap();
        cache.l1.lock().clear();
        assert_eq!(cache.get("k1").await, Some(value));
        assert!(cache.l1.lock().contains("k1"));
    }

    #[tokio::test]
    async fn expired_entry_is_miss_and_evicted() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());
        cache
            .set("k1", Payload { body: "v".into() }, 1)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(cache.get("k1").await, None);
        assert!(!cache.shard_path("k1").exists());
    }

    #[tokio::test]
    async fn l1_evicts_oldest_beyond_capacity() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());
        cache.set("a", Payload { body: "a".into() }, 60_000).await.unwrap();
        cache.set("b", Payload { body: "b".into() }, 60_000).await.unwrap();
        cache.set("c", Payload { body: "c".into() }, 60_000).await.unwrap();
        assert!(!cache.l1.lock().contains("a"));
        assert!(cache.l1.lock().contains("c"));
    }

    #[tokio::test]
    async fn compression_disabled_never_sets_compressed_flag() {
        let dir = tempdir().unwrap();
        let cache = TieredCache::<Payload>::new(TieredCacheConfig {
            l2_root: dir.path().to_path_buf(),
            compression_enabled: false,
            ..Default::default()
        });
        cache
            .set("k1", Payload { body: "x".repeat(5000) }, 60_000)
            .await
            .unwrap();
        let bytes = std::fs::read(cache.shard_path("k1")).unwrap();
        let envelope: CacheEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert!(!envelope.compressed);
    }

    #[tokio::test]
    async fn delete_removes_both_tiers() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());
        cache.set("k1", Payload { body: "v".into() }, 60_000).await.unwrap();
        cache.delete("k1").await.unwrap();
        assert_eq!(cache.get("k1").await, None);
        assert!(!cache.shard_path("k1").exists());
    }
}
