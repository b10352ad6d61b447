//! Session merge strategies (spec.md §4.C "Merge strategies").

use std::collections::HashMap;

use lesca_types::{Cookie, EpochMs, Session, SessionMetadata, StorageMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    KeepExisting,
    PreferFresh,
    #[default]
    MergeAll,
}

/// Merge an optional pre-existing target session with an ordered list of
/// source sessions, per `strategy`. Returns the new target session body
/// (caller is responsible for persisting it).
pub fn merge_sessions(
    existing_target: Option<Session>,
    sources: Vec<Session>,
    target_name: &str,
    strategy: MergeStrategy,
    now_ms: EpochMs,
) -> Option<Session> {
    if existing_target.is_none() && sources.is_empty() {
        return None;
    }

    let merged = match strategy {
        MergeStrategy::KeepExisting => merge_keep_existing(existing_target, &sources),
        MergeStrategy::PreferFresh => merge_prefer_fresh(existing_target, sources),
        MergeStrategy::MergeAll => merge_overlay(existing_target, &sources),
    };

    let mut out = merged;
    out.name = target_name.to_string();
    out.metadata.last_used = now_ms;
    Some(out)
}

fn empty_session(name: &str, now_ms: EpochMs) -> Session {
    Session::new(name, now_ms)
}

/// Target values win on collision; keys present only in a source are
/// added, in source iteration order.
fn merge_keep_existing(target: Option<Session>, sources: &[Session]) -> Session {
    let now = sources.first().map(|s| s.metadata.last_used).unwrap_or(0);
    let mut out = target.unwrap_or_else(|| empty_session("__merge__", now));

    let mut cookie_keys: std::collections::HashSet<String> =
        out.cookies.iter().map(|c| c.name.clone()).collect();
    for source in sources {
        for cookie in &source.cookies {
            if cookie_keys.insert(cookie.name.clone()) {
                out.cookies.push(cookie.clone());
            }
        }
        for (k, v) in &source.local_storage {
            out.local_storage.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &source.session_storage {
            out.session_storage.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    out
}

/// Sort target + sources by `lastUsed` ascending, then apply each in
/// order, overwriting — the freshest session wins.
fn merge_prefer_fresh(target: Option<Session>, sources: Vec<Session>) -> Session {
    let mut all: Vec<Session> = sources;
    if let Some(t) = target {
        all.push(t);
    }
    all.sort_by_key(|s| s.metadata.last_used);

    let now = all.last().map(|s| s.metadata.last_used).unwrap_or(0);
    let mut out = empty_session("__merge__", now);
    for session in all {
        apply_overlay(&mut out, &session);
    }
    out
}

/// Overlay target then sources in given order; last writer wins.
fn merge_overlay(target: Option<Session>, sources: &[Session]) -> Session {
    let now = sources
        .last()
        .map(|s| s.metadata.last_used)
        .or(target.as_ref().map(|s| s.metadata.last_used))
        .unwrap_or(0);
    let mut out = target.unwrap_or_else(|| empty_session("__merge__", now));
    for source in sources {
        apply_overlay(&mut out, source);
    }
    out
}

fn apply_overlay(out: &mut Session, source: &Session) {
    let mut by_name: HashMap<String, Cookie> =
        out.cookies.drain(..).map(|c| (c.name.clone(), c)).collect();
    for cookie in &source.cookies {
        by_name.insert(cookie.name.clone(), cookie.clone());
    }
    out.cookies = by_name.into_values().collect();
    out.cookies.sort_by(|a, b| a.name.cmp(&b.name));

    merge_storage(&mut out.local_storage, &source.local_storage);
    merge_storage(&mut out.session_storage, &source.session_storage);

    if source.metadata.last_used > out.metadata.last_used {
        out.metadata = SessionMetadata {
            created: out.metadata.created.min(source.metadata.created),
            ..source.metadata.clone()
        };
    }
}

fn merge_storage(out: &mut StorageMap, source: &StorageMap) {
    for (k, v) in source {
        out.insert(k.clone(), v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesca_types::{Cookie, SameSite};

    fn cookie(name: &str, value: &str) -> Cookie {
        Cookie {
            name: name.into(),
            value: value.into(),
            domain: "example.com".into(),
            path: "/".into(),
            expires: -1,
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    fn session_with_cookie(name: &str, cookie_name: &str, cookie_value: &str, last_used: EpochMs) -> Session {
        let mut s = Session::new(name, last_used);
        s.metadata.last_used = last_used;
        s.cookies.push(cookie(cookie_name, cookie_value));
        s
    }

    #[test]
    fn prefer_fresh_picks_newest_cookie_value() {
        let older = session_with_cookie("older", "sh", "v_old", 1_000);
        let newer = session_with_cookie("newer", "sh", "v_new", 2_000);
        let merged = merge_sessions(None, vec![older, newer], "out", MergeStrategy::PreferFresh, 3_000)
            .unwrap();
        let cookie = merged.cookies.iter().find(|c| c.name == "sh").unwrap();
        assert_eq!(cookie.value, "v_new");
        assert_eq!(merged.name, "out");
    }

    #[test]
    fn keep_existing_target_wins_on_collision() {
        let target = session_with_cookie("target", "sh", "kept", 1_000);
        let source = session_with_cookie("source", "sh", "ignored", 2_000);
        let merged =
            merge_sessions(Some(target), vec![source], "out", MergeStrategy::KeepExisting, 3_000)
                .unwrap();
        let cookie = merged.cookies.iter().find(|c| c.name == "sh").unwrap();
        assert_eq!(cookie.value, "kept");
    }

    #[test]
    fn merge_all_last_source_wins() {
        let s1 = session_with_cookie("s1", "sh", "first", 1_000);
        let s2 = session_with_cookie("s2", "sh", "last", 2_000);
        let merged =
            merge_sessions(None, vec![s1, s2], "out", MergeStrategy::MergeAll, 3_000).unwrap();
        let cookie = merged.cookies.iter().find(|c| c.name == "sh").unwrap();
        assert_eq!(cookie.value, "last");
    }

    #[test]
    fn zero_sources_and_no_target_returns_none() {
        assert!(merge_sessions(None, vec![], "out", MergeStrategy::MergeAll, 1_000).is_none());
    }
}
