//! On-disk session data model (spec.md §3, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{EpochMs, EpochSecs};

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A single cookie record as captured from (or restored into) a browser
/// context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Epoch seconds; `-1` means a session cookie (no persistent expiry).
    pub expires: EpochSecs,
    #[serde(rename = "httpOnly", default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(rename = "sameSite")]
    pub same_site: SameSite,
}

impl Cookie {
    pub const SESSION_EXPIRY: EpochSecs = -1;

    pub fn is_session_cookie(&self) -> bool {
        self.expires == Self::SESSION_EXPIRY
    }
}

/// Unordered key/value snapshot of either `localStorage` or
/// `sessionStorage`.
pub type StorageMap = HashMap<String, String>;

/// Session-level metadata (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub created: EpochMs,
    #[serde(rename = "lastUsed")]
    pub last_used: EpochMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<EpochMs>,
    #[serde(rename = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(now_ms: EpochMs) -> Self {
        Self {
            created: now_ms,
            last_used: now_ms,
            expires: None,
            user_agent: None,
            description: None,
        }
    }

    /// A session is expired iff `expires` is set and `now > expires`.
    pub fn is_expired(&self, now_ms: EpochMs) -> bool {
        self.expires.is_some_and(|e| now_ms > e)
    }
}

/// A named capture of a browser authentication context. This is the
/// exact shape persisted to `<sessionsDir>/<sanitisedName>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub cookies: Vec<Cookie>,
    #[serde(rename = "localStorage", default)]
    pub local_storage: StorageMap,
    #[serde(rename = "sessionStorage", default)]
    pub session_storage: StorageMap,
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(name: impl Into<String>, now_ms: EpochMs) -> Self {
        Self {
            name: name.into(),
            cookies: Vec::new(),
            local_storage: StorageMap::new(),
            session_storage: StorageMap::new(),
            metadata: SessionMetadata::new(now_ms),
        }
    }

    /// Structural validity check used on load: non-empty name, and
    /// (implicitly, by the type system) `cookies` is an array. Schema
    /// validation of raw JSON happens before deserialization succeeds, so
    /// by the time we hold a `Session` the only residual invariant to
    /// check is the non-empty name and `created <= last_used`.
    pub fn is_structurally_valid(&self) -> bool {
        !self.name.is_empty() && self.metadata.created <= self.metadata.last_used
    }

    pub fn is_expired(&self, now_ms: EpochMs) -> bool {
        self.metadata.is_expired(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_has_sentinel_expiry() {
        let c = Cookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: "example.com".into(),
            path: "/".into(),
            expires: -1,
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        };
        assert!(c.is_session_cookie());
    }

    #[test]
    fn metadata_expiry_is_strictly_after() {
        let mut m = SessionMetadata::new(1_000);
        m.expires = Some(2_000);
        assert!(!m.is_expired(2_000));
        assert!(m.is_expired(2_001));
    }

    #[test]
    fn structural_validity_requires_name_and_ordering() {
        let mut s = Session::new("x", 100);
        assert!(s.is_structurally_valid());
        s.name.clear();
        assert!(!s.is_structurally_valid());
    }
}
