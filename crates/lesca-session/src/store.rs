//! Durable session store (spec.md §4.C).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use lesca_types::{sanitize_name, EpochMs, Session, SessionMetadata};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cipher::SessionCipher;
use crate::context::{BrowserContext, ContextError};
use crate::merge::{merge_sessions, MergeStrategy};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session already exists: {0}")]
    AlreadyExists(String),
    #[error("no valid sources resolved for merge into {0}")]
    NoMergeSources(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SessionError {
    pub fn kind(&self) -> lesca_types::ErrorKind {
        use lesca_types::ErrorKind;
        match self {
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::AlreadyExists(_) => ErrorKind::Fatal,
            SessionError::NoMergeSources(_) => ErrorKind::Fatal,
            SessionError::Io(_) => ErrorKind::Fatal,
            SessionError::Serde(_) => ErrorKind::CorruptData,
        }
    }
}

pub struct SessionStoreConfig {
    pub sessions_dir: PathBuf,
}

impl SessionStoreConfig {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }
}

/// Outcome of `restore`: what was actually applied to the live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreOutcome {
    pub cookies_applied: bool,
    pub local_storage_applied: bool,
    pub session_storage_applied: bool,
}

impl RestoreOutcome {
    pub fn any(&self) -> bool {
        self.cookies_applied || self.local_storage_applied || self.session_storage_applied
    }
}

/// Durable cookie/web-storage session store.
///
/// Guards file read/write per session name with a keyed mutex so
/// concurrent operations on *different* sessions proceed in parallel
/// while operations on the *same* session serialise (spec.md §8).
pub struct SessionStore {
    dir: PathBuf,
    cipher: Arc<dyn SessionCipher>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig, cipher: Arc<dyn SessionCipher>) -> Self {
        Self {
            dir: config.sessions_dir,
            cipher,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }

    async fn ensure_dir(&self) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// `create(name, ctx, opts?)` — snapshot cookies + both web storages
    /// from `ctx`; persist. Storage snapshot failures are non-fatal.
    pub async fn create(
        &self,
        name: &str,
        ctx: &dyn BrowserContext,
        now_ms: EpochMs,
    ) -> Result<Session, SessionError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut session = Session::new(name, now_ms);
        match ctx.snapshot_cookies().await {
            Ok(cookies) => session.cookies = cookies,
            Err(e) => warn!(session = name, error = %e, "cookie snapshot failed"),
        }
        match ctx.snapshot_local_storage().await {
            Ok(storage) => session.local_storage = storage,
            Err(e) => warn!(session = name, error = %e, "localStorage snapshot failed"),
        }
        match ctx.snapshot_session_storage().await {
            Ok(storage) => session.session_storage = storage,
            Err(e) => warn!(session = name, error = %e, "sessionStorage snapshot failed"),
        }

        self.write_atomic(name, &session).await?;
        Ok(session)
    }

    /// `load(name)` — read+parse file; if expired, delete and return
    /// none; else refresh `lastUsed`, rewrite, return.
    pub async fn load(&self, name: &str, now_ms: EpochMs) -> Result<Option<Session>, SessionError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.load_locked(name, now_ms).await
    }

    /// Reads and validates the file for `name`, quarantining it and
    /// evicting expired entries, but without touching `metadata.last_used`.
    /// Callers must already hold `name`'s lock.
    async fn read_locked(&self, name: &str, now_ms: EpochMs) -> Result<Option<Session>, SessionError> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = if self.cipher.is_encrypted(&bytes) {
            match self.cipher.decrypt(&bytes) {
                Ok(p) => p,
                Err(e) => {
                    warn!(session = name, error = %e, "decrypt failed, quarantining file");
                    self.quarantine(&path, now_ms).await;
                    return Ok(None);
                }
            }
        } else {
            bytes
        };

        let session: Session = match serde_json::from_slice(&plaintext) {
            Ok(s) if s.is_structurally_valid() => s,
            _ => {
                warn!(session = name, "corrupt or schema-invalid session file, quarantining");
                self.quarantine(&path, now_ms).await;
                return Ok(None);
            }
        };

        if session.is_expired(now_ms) {
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn load_locked(
        &self,
        name: &str,
        now_ms: EpochMs,
    ) -> Result<Option<Session>, SessionError> {
        let Some(session) = self.read_locked(name, now_ms).await? else {
            return Ok(None);
        };
        let mut refreshed = session;
        refreshed.metadata.last_used = now_ms;
        self.write_atomic(name, &refreshed).await?;
        Ok(Some(refreshed))
    }

    /// Reads a session without refreshing `lastUsed`. Used by `merge`,
    /// which needs each source's stored freshness intact for
    /// `MergeStrategy::PreferFresh` to compare against (spec.md §4.C) —
    /// routing it through `load` would stamp every source to `now_ms` and
    /// make them all compare equal.
    async fn peek(&self, name: &str, now_ms: EpochMs) -> Result<Option<Session>, SessionError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.read_locked(name, now_ms).await
    }

    async fn quarantine(&self, path: &Path, now_ms: EpochMs) {
        let backup = path.with_extension(format!("json.bak.{now_ms}"));
        if let Err(e) = fs::rename(path, &backup).await {
            warn!(path = %path.display(), error = %e, "failed to quarantine corrupt session file");
        }
    }

    /// `save(name, data)` — atomic write.
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let lock = self.lock_for(&session.name);
        let _guard = lock.lock().await;
        self.write_atomic(&session.name, session).await
    }

    async fn write_atomic(&self, name: &str, session: &Session) -> Result<(), SessionError> {
        self.ensure_dir().await?;
        let path = self.path_for(name);
        let json = serde_json::to_vec_pretty(session)?;
        let payload = self
            .cipher
            .encrypt(&json)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "encryption failed"))?;

        let tmp = path.with_extension(format!(
            "json.tmp.{}.{}",
            session.metadata.last_used,
            fastrand::u32(..)
        ));
        let write_result = fs::write(&tmp, &payload).await;
        match write_result {
            Ok(()) => match fs::rename(&tmp, &path).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let _ = fs::remove_file(&tmp).await;
                    Err(e.into())
                }
            },
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                Err(e.into())
            }
        }
    }

    /// `restore(name, ctx)` — load; if present, apply cookies then, if a
    /// page exists, inject both web storages; returns whether anything
    /// was restored.
    pub async fn restore(
        &self,
        name: &str,
        ctx: &dyn BrowserContext,
        now_ms: EpochMs,
    ) -> Result<RestoreOutcome, SessionError> {
        let session = match self.load(name, now_ms).await? {
            Some(s) => s,
            None => return Ok(RestoreOutcome::default()),
        };

        let mut outcome = RestoreOutcome::default();
        match ctx.apply_cookies(&session.cookies).await {
            Ok(()) => outcome.cookies_applied = true,
            Err(e) => warn!(session = name, error = %e, "cookie restore failed"),
        }

        if ctx.has_page() {
            match ctx.inject_local_storage(&session.local_storage).await {
                Ok(()) => outcome.local_storage_applied = true,
                Err(ContextError::NoPage) => {}
                Err(e) => warn!(session = name, error = %e, "localStorage restore failed"),
            }
            match ctx.inject_session_storage(&session.session_storage).await {
                Ok(()) => outcome.session_storage_applied = true,
                Err(ContextError::NoPage) => {}
                Err(e) => warn!(session = name, error = %e, "sessionStorage restore failed"),
            }
        }

        Ok(outcome)
    }

    /// Enumerate all sessions, dropping (and deleting) expired ones.
    pub async fn list(&self, now_ms: EpochMs) -> Result<Vec<Session>, SessionError> {
        self.ensure_dir().await?;
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(session) = self.load(stem, now_ms).await? {
                out.push(session);
            }
        }
        Ok(out)
    }

    /// `listActive()` — like `list`, sorted by `lastUsed` descending.
    pub async fn list_active(&self, now_ms: EpochMs) -> Result<Vec<Session>, SessionError> {
        let mut sessions = self.list(now_ms).await?;
        sessions.sort_by(|a, b| b.metadata.last_used.cmp(&a.metadata.last_used));
        Ok(sessions)
    }

    /// `delete(name)` — remove file; absent returns `false` without error.
    pub async fn delete(&self, name: &str) -> Result<bool, SessionError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let path = self.path_for(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// `rename(old, new)` — error if old absent or new present.
    pub async fn rename(&self, old: &str, new: &str, now_ms: EpochMs) -> Result<(), SessionError> {
        let old_lock = self.lock_for(old);
        let _old_guard = old_lock.lock().await;
        let new_lock = self.lock_for(new);
        let _new_guard = new_lock.lock().await;

        let new_path = self.path_for(new);
        if fs::try_exists(&new_path).await.unwrap_or(false) {
            return Err(SessionError::AlreadyExists(new.to_string()));
        }

        let mut session = match self.load_locked(old, now_ms).await? {
            Some(s) => s,
            None => return Err(SessionError::NotFound(old.to_string())),
        };
        session.name = new.to_string();
        self.write_atomic(new, &session).await?;
        fs::remove_file(self.path_for(old)).await?;
        Ok(())
    }

    /// `validate(name)` — true iff present, not expired, has ≥1 cookie,
    /// has metadata. Expiry is evicted as a side effect of `load`.
    pub async fn validate(&self, name: &str, now_ms: EpochMs) -> Result<bool, SessionError> {
        let session = self.load(name, now_ms).await?;
        Ok(session.is_some_and(|s| !s.cookies.is_empty()))
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }

    pub async fn get_metadata(
        &self,
        name: &str,
        now_ms: EpochMs,
    ) -> Result<Option<SessionMetadata>, SessionError> {
        Ok(self.load(name, now_ms).await?.map(|s| s.metadata))
    }

    /// `merge(sources[], target, strategy)`.
    pub async fn merge(
        &self,
        sources: &[&str],
        target: &str,
        strategy: MergeStrategy,
        now_ms: EpochMs,
    ) -> Result<Session, SessionError> {
        let mut resolved = Vec::with_capacity(sources.len());
        for name in sources {
            if let Some(s) = self.peek(name, now_ms).await? {
                resolved.push(s);
            }
        }
        if resolved.is_empty() && !self.exists(target).await {
            return Err(SessionError::NoMergeSources(target.to_string()));
        }

        let existing_target = self.peek(target, now_ms).await?;
        let merged = merge_sessions(existing_target, resolved, target, strategy, now_ms)
            .ok_or_else(|| SessionError::NoMergeSources(target.to_string()))?;
        self.save(&merged).await?;
        Ok(merged)
    }

    /// `cleanupExpired()` — delete all files whose `metadata.expires` is
    /// past; returns the count deleted.
    pub async fn cleanup_expired(&self, now_ms: EpochMs) -> Result<usize, SessionError> {
        self.ensure_dir().await?;
        let mut count = 0usize;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            // `load` already deletes expired sessions as a side effect.
            let survived = self.load(&stem, now_ms).await?.is_some();
            if !survived {
                count += 1;
            }
        }
        debug!(count, "cleanup_expired complete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::NoopCipher;
    use crate::context::NullContext;

    fn store(dir: &Path) -> SessionStore {
        SessionStore::new(
            SessionStoreConfig::new(dir.to_path_buf()),
            Arc::new(NoopCipher),
        )
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let ctx = NullContext;
        store.create("alpha", &ctx, 1_000).await.unwrap();

        let loaded = store.load("alpha", 2_000).await.unwrap().unwrap();
        assert_eq!(loaded.name, "alpha");
        assert_eq!(loaded.metadata.last_used, 2_000);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        assert!(store.load("nope", 1_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_expired_deletes_and_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let ctx = NullContext;
        let mut s = store.create("beta", &ctx, 1_000).await.unwrap();
        s.metadata.expires = Some(1_500);
        store.save(&s).await.unwrap();

        assert!(store.load("beta", 2_000).await.unwrap().is_none());
        assert!(!store.exists("beta").await);
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined_not_surfaced() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        fs::create_dir_all(tmp.path()).await.unwrap();
        let path = store.path_for("gamma");
        fs::write(&path, b"not json").await.unwrap();

        let result = store.load("gamma", 1_000).await.unwrap();
        assert!(result.is_none());
        assert!(!fs::try_exists(&path).await.unwrap());

        let mut read = fs::read_dir(tmp.path()).await.unwrap();
        let mut saw_backup = false;
        while let Some(entry) = read.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().contains(".bak.") {
                saw_backup = true;
            }
        }
        assert!(saw_backup);
    }

    #[tokio::test]
    async fn delete_absent_returns_false() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        assert!(!store.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_session_and_rejects_collisions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let ctx = NullContext;
        store.create("old", &ctx, 1_000).await.unwrap();
        store.create("existing", &ctx, 1_000).await.unwrap();

        assert!(store.rename("old", "existing", 2_000).await.is_err());
        store.rename("old", "new", 2_000).await.unwrap();
        assert!(!store.exists("old").await);
        let renamed = store.load("new", 3_000).await.unwrap().unwrap();
        assert_eq!(renamed.name, "new");
    }

    #[tokio::test]
    async fn merge_prefer_fresh_preserves_each_sources_last_used() {
        use crate::merge::MergeStrategy;
        use lesca_types::{Cookie, SameSite};

        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let ctx = NullContext;

        let mut older = store.create("older", &ctx, 1_000).await.unwrap();
        older.cookies.push(Cookie {
            name: "sh".into(),
            value: "v_old".into(),
            domain: "example.com".into(),
            path: "/".into(),
            expires: -1,
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
        });
        store.save(&older).await.unwrap();

        let mut newer = store.create("newer", &ctx, 2_000).await.unwrap();
        newer.cookies.push(Cookie {
            name: "sh".into(),
            value: "v_new".into(),
            domain: "example.com".into(),
            path: "/".into(),
            expires: -1,
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
        });
        store.save(&newer).await.unwrap();

        // now_ms is far later than either source's lastUsed; if merge
        // routed sources through the refreshing `load`, both would be
        // stamped to 9_000 and compare equal, breaking PreferFresh.
        let merged = store
            .merge(&["older", "newer"], "out", MergeStrategy::PreferFresh, 9_000)
            .await
            .unwrap();
        let cookie = merged.cookies.iter().find(|c| c.name == "sh").unwrap();
        assert_eq!(cookie.value, "v_new");
    }

    #[tokio::test]
    async fn validate_requires_at_least_one_cookie() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let ctx = NullContext;
        store.create("delta", &ctx, 1_000).await.unwrap();
        assert!(!store.validate("delta", 2_000).await.unwrap());
    }

    #[tokio::test]
    async fn list_active_sorts_by_last_used_descending() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let ctx = NullContext;
        store.create("first", &ctx, 1_000).await.unwrap();
        store.create("second", &ctx, 2_000).await.unwrap();

        let active = store.list_active(3_000).await.unwrap();
        assert_eq!(active.len(), 2);
        // both were just refreshed to now_ms=3_000 on load, so equal; but
        // load() happens in file-iteration order, so assert the set only.
        let names: Vec<_> = active.iter().map(|s| s.name.clone()).collect();
        assert!(names.contains(&"first".to_string()));
        assert!(names.contains(&"second".to_string()));
    }
}
