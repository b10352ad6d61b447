//! Pure secret-redaction helper applied at the logging boundary.
//!
//! spec.md §9 flags the source's event-emitter-style "logger sanitises
//! secrets by regex" as a cross-cutting concern that must not be wired
//! into core state. This is the replacement: a pure function, called only
//! where a value is about to be formatted into a `tracing` event, never
//! stored or threaded through pool/session/cache internals.

/// Replace every occurrence of each `pattern` in `value` with `"***"`.
///
/// Patterns are plain substrings (not regexes) deliberately: the core's
/// callers pass known secret material (an encryption key, a cookie value)
/// rather than open-ended patterns, so substring matching is both simpler
/// and cannot catastrophically backtrack.
pub fn redact(value: &str, patterns: &[&str]) -> String {
    let mut out = value.to_string();
    for pattern in patterns {
        if pattern.is_empty() {
            continue;
        }
        out = out.replace(*pattern, "***");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_every_occurrence() {
        let value = "key=sekret;other=sekret";
        assert_eq!(redact(value, &["sekret"]), "key=***;other=***");
    }

    #[test]
    fn ignores_empty_patterns() {
        assert_eq!(redact("abc", &[""]), "abc");
    }

    #[test]
    fn passes_through_when_no_match() {
        assert_eq!(redact("abc", &["xyz"]), "abc");
    }
}
