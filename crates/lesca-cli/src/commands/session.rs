//! `lesca session rename|delete|merge|list|cleanup` (spec.md §6).

use clap::{Args, Subcommand};
use lesca_session::cleanup::{run_cleanup, CleanupConfig};
use lesca_session::merge::MergeStrategy;
use lesca_session::store::SessionStore;

use crate::error::CliError;
use crate::output;

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// List every stored session, most recently used first.
    List,
    /// Rename a session, failing if the new name is already taken.
    Rename { old: String, new: String },
    /// Delete a session by name.
    Delete { name: String },
    /// Merge one or more source sessions into a target.
    Merge {
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long)]
        target: String,
        #[arg(long, value_enum, default_value = "merge-all")]
        strategy: MergeStrategyArg,
    },
    /// Evict expired/excess sessions.
    Cleanup {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        max_session_age_days: Option<i64>,
        #[arg(long)]
        max_sessions: Option<usize>,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum MergeStrategyArg {
    KeepExisting,
    PreferFresh,
    MergeAll,
}

impl From<MergeStrategyArg> for MergeStrategy {
    fn from(value: MergeStrategyArg) -> Self {
        match value {
            MergeStrategyArg::KeepExisting => MergeStrategy::KeepExisting,
            MergeStrategyArg::PreferFresh => MergeStrategy::PreferFresh,
            MergeStrategyArg::MergeAll => MergeStrategy::MergeAll,
        }
    }
}

fn now_ms() -> lesca_types::EpochMs {
    chrono::Utc::now().timestamp_millis()
}

pub async fn execute(store: &SessionStore, command: SessionCommand) -> Result<(), CliError> {
    match command {
        SessionCommand::List => {
            let sessions = store.list_active(now_ms()).await.map_err(CliError::operational)?;
            let rows: Vec<Vec<(&'static str, String)>> = sessions
                .iter()
                .map(|s| {
                    vec![
                        ("name", s.name.clone()),
                        ("cookies", s.cookies.len().to_string()),
                        ("last_used", s.metadata.last_used.to_string()),
                        (
                            "expires",
                            s.metadata.expires.map(|e| e.to_string()).unwrap_or_default(),
                        ),
                    ]
                })
                .collect();
            output::print_rows_as_table(&rows);
            Ok(())
        }
        SessionCommand::Rename { old, new } => {
            store.rename(&old, &new, now_ms()).await.map_err(CliError::operational)?;
            output::print_success(&format!("renamed {old} to {new}"));
            Ok(())
        }
        SessionCommand::Delete { name } => {
            let deleted = store.delete(&name).await.map_err(CliError::operational)?;
            if deleted {
                output::print_success(&format!("deleted {name}"));
            } else {
                output::print_warning(&format!("{name} did not exist"));
            }
            Ok(())
        }
        SessionCommand::Merge { sources, target, strategy } => {
            let source_refs: Vec<&str> = sources.iter().map(String::as_str).collect();
            let merged = store
                .merge(&source_refs, &target, strategy.into(), now_ms())
                .await
                .map_err(CliError::operational)?;
            output::print_success(&format!(
                "merged {} source(s) into {} ({} cookies)",
                sources.len(),
                merged.name,
                merged.cookies.len()
            ));
            Ok(())
        }
        SessionCommand::Cleanup {
            dry_run,
            max_session_age_days,
            max_sessions,
        } => {
            let mut config = CleanupConfig {
                interval: None,
                run_at_start: false,
                ..CleanupConfig::default()
            };
            if let Some(days) = max_session_age_days {
                config.max_session_age_ms = days * 24 * 60 * 60 * 1000;
            }
            if let Some(max) = max_sessions {
                config.max_sessions = max;
            }
            let report = run_cleanup(store, config, now_ms(), dry_run).await;
            output::print_info(&format!(
                "scanned {}, evicted {} (age: {}, count: {})",
                report.scanned,
                report.total_evicted(),
                report.age_evicted.len(),
                report.count_evicted.len()
            ));
            for error in &report.errors {
                output::print_warning(error);
            }
            Ok(())
        }
    }
}
