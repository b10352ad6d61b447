//! Shared data model for the lesca content-extraction substrate.
//!
//! No logic lives here beyond small invariant helpers (name sanitisation,
//! expiry checks) — everything else is plain data shared across crates so
//! that the pool, the session store and the metrics collector agree on a
//! single vocabulary.

pub mod error;
pub mod metrics;
pub mod redact;
pub mod session;

pub use error::ErrorKind;
pub use metrics::{DestroyReason, MetricEvent, MetricPayload, PreviousBreakerState, GLOBAL_BUCKET};
pub use redact::redact;
pub use session::{
    Cookie, SameSite, Session, SessionMetadata, StorageMap,
};

/// Milliseconds since the Unix epoch. Kept as a type alias (not a newtype)
/// because every crate that touches it also talks to `chrono`/`serde_json`
/// and a wrapper would just add `.0` noise at every call site.
pub type EpochMs = i64;

/// Seconds since the Unix epoch, used where the wire format is seconds
/// (cookie `expires`) rather than milliseconds (session `metadata`).
pub type EpochSecs = i64;

/// Replace any character outside `[A-Za-z0-9_-]` with `_`.
///
/// This is the directory-traversal defence spec.md §3 requires for
/// session names before they are ever used to build a filesystem path.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_replaces_traversal_chars() {
        assert_eq!(sanitize_name("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_name("my session #1"), "my_session__1");
        assert_eq!(sanitize_name("plain-name_42"), "plain-name_42");
    }
}
