//! Exit codes (spec.md §6 "CLI surface").
//!
//! Grounded on the teacher's `riptide-cli::error::ExitCode`, extended
//! from its two variants to the three the spec names: operational
//! failures (network, pool exhaustion, upstream errors) are distinct
//! from usage/config mistakes so scripts can tell "the scrape failed"
//! from "you typed the command wrong".

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    OperationalFailure = 1,
    UsageError = 2,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Marker attached to a `CliError` so `main` can pick an exit code
/// without the core crates' `ErrorKind` needing a usage-error variant
/// that only this thin layer has any use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Operational,
    Usage,
}

/// Wraps an `anyhow::Error` with the severity used to pick an exit
/// code, matching `riptide-cli`'s thin-anyhow-at-the-edge style while
/// still distinguishing the spec's three exit codes.
#[derive(Debug)]
pub struct CliError {
    pub severity: Severity,
    pub source: anyhow::Error,
}

impl CliError {
    pub fn operational(source: impl Into<anyhow::Error>) -> Self {
        Self { severity: Severity::Operational, source: source.into() }
    }

    pub fn usage(message: impl std::fmt::Display) -> Self {
        Self { severity: Severity::Usage, source: anyhow::anyhow!("{message}") }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.severity {
            Severity::Operational => ExitCode::OperationalFailure,
            Severity::Usage => ExitCode::UsageError,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(source: anyhow::Error) -> Self {
        Self::operational(source)
    }
}
