//! Cross-cutting error taxonomy (spec.md §7).
//!
//! Individual crates define their own `thiserror` enums for the errors
//! they actually produce; this `ErrorKind` is the shared vocabulary those
//! enums map onto so that callers (the batch executor, the CLI) can
//! dispatch on *kind* without matching every crate's concrete type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network blip, 5xx from upstream, transient browser disconnect.
    Transient,
    /// Upstream 429; the rate limiter widens its window, no internal retry.
    RateLimited,
    /// Requested entity absent (session, problem, user).
    NotFound,
    /// Content gated behind auth/premium.
    Unauthorized,
    /// Session file unparsable/invalid; quarantined and treated as NotFound.
    CorruptData,
    /// Pool waiters timed out.
    PoolExhausted,
    /// Breaker fast-failed without invoking the underlying operation.
    CircuitOpen,
    /// Programmer/IO errors (disk full, permissions, logic bugs).
    Fatal,
}

impl ErrorKind {
    /// Whether the owning component should retry internally. Per spec.md
    /// §7, only `Transient` is retried by the owning component itself;
    /// everything else either never retries or is retried by a layer
    /// above (batch resume) rather than in place.
    pub fn is_internally_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}
