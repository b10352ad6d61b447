//! `lesca scrape problem <slug>`, `lesca scrape list`, `lesca scrape
//! batch --file <path>` (spec.md §6). Drives the pool/plugin/writer
//! seams directly; the real fetch and the HTML→Markdown conversion are
//! out of scope (spec.md §1) and stand in as `backend::NoopScrapeBackend`
//! unless a real `ScrapeBackend` is wired in by an embedder.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use lesca_batch::{BatchConfig, BatchExecutor, ItemOutcome};
use lesca_plugins::PluginChain;
use lesca_pool::SessionPoolManager;

use crate::backend::{ContentWriter, ScrapeBackend, ScrapeRequest, ScrapeResult, ScrapeTarget};
use crate::config::CliConfig;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    #[command(subcommand)]
    pub command: ScrapeCommand,
}

#[derive(Debug, Subcommand)]
pub enum ScrapeCommand {
    /// Scrape a single problem by slug.
    Problem {
        slug: String,
        #[arg(long, default_value = "default")]
        session: String,
    },
    /// Scrape the problem list page.
    List {
        #[arg(long, default_value = "default")]
        session: String,
    },
    /// Scrape every slug in a newline-delimited file through the batch
    /// executor, with checkpoint/resume.
    Batch {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "default")]
        session: String,
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        progress_file: Option<PathBuf>,
    },
}

/// Bundles the per-invocation collaborators a scrape command needs, so
/// `main` wires them up once and every subcommand just borrows.
pub struct ScrapeServices {
    pub pool: Arc<SessionPoolManager>,
    pub backend: Arc<dyn ScrapeBackend>,
    pub plugins: Arc<PluginChain<ScrapeRequest, ScrapeResult, ScrapeResult>>,
    pub writer: Arc<dyn ContentWriter>,
}

/// Runs one request through `pool → backend → plugins → writer`,
/// acquiring and releasing a session browser around the opaque fetch
/// (spec.md §2 pipeline shape).
async fn scrape_one(services: &ScrapeServices, request: ScrapeRequest) -> anyhow::Result<ScrapeResult> {
    let handle = services.pool.acquire(&request.session_name).await?;
    let request = services.plugins.run_scrape(request).await;
    let outcome = services.backend.scrape(request).await;
    drop(handle);

    let result = outcome?;
    let result = services.plugins.run_scrape_result(result).await;
    let result = services.plugins.run_save(result).await;
    services.writer.write(&result).await?;
    Ok(result)
}

pub async fn execute(config: &CliConfig, args: ScrapeArgs, services: &ScrapeServices) -> Result<(), CliError> {
    match args.command {
        ScrapeCommand::Problem { slug, session } => {
            let request = ScrapeRequest {
                target: ScrapeTarget::Problem { slug },
                session_name: session,
            };
            let result = scrape_one(services, request).await.map_err(CliError::operational)?;
            output::print_json(&result);
            Ok(())
        }
        ScrapeCommand::List { session } => {
            let request = ScrapeRequest {
                target: ScrapeTarget::List,
                session_name: session,
            };
            let result = scrape_one(services, request).await.map_err(CliError::operational)?;
            output::print_json(&result);
            Ok(())
        }
        ScrapeCommand::Batch {
            file,
            session,
            concurrency,
            resume,
            progress_file,
        } => run_batch(config, file, session, concurrency, resume, progress_file, services).await,
    }
}

async fn run_batch(
    config: &CliConfig,
    file: PathBuf,
    session: String,
    concurrency: usize,
    resume: bool,
    progress_file: Option<PathBuf>,
    services: &ScrapeServices,
) -> Result<(), CliError> {
    let text = tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| CliError::usage(format!("reading {}: {e}", file.display())))?;
    let slugs: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if slugs.is_empty() {
        return Err(CliError::usage(format!("{} contains no slugs", file.display())));
    }

    let requests: Vec<ScrapeRequest> = slugs
        .into_iter()
        .map(|slug| ScrapeRequest {
            target: ScrapeTarget::Problem { slug },
            session_name: session.clone(),
        })
        .collect();

    let batch_config = BatchConfig {
        concurrency,
        resume,
        progress_file: progress_file.unwrap_or_else(|| config.output_dir.join("scrape-batch.json")),
        ..Default::default()
    };
    let executor: BatchExecutor<ScrapeRequest, ScrapeResult, String> = BatchExecutor::new(batch_config)
        .with_progress_callback(|p| {
            output::print_info(&format!(
                "batch {}/{}: {}/{} complete",
                p.current_batch, p.total_batches, p.completed, p.total
            ));
        });

    let pool = services.pool.clone();
    let backend = services.backend.clone();
    let summary = executor
        .run(requests, move |request| {
            let pool = pool.clone();
            let backend = backend.clone();
            async move {
                let handle = pool
                    .acquire(&request.session_name)
                    .await
                    .map_err(|e| e.to_string())?;
                let result = backend.scrape(request).await.map_err(|e| e.to_string());
                drop(handle);
                result
            }
        })
        .await
        .map_err(|e| CliError::operational(anyhow::anyhow!(e)))?;

    for item in &summary.results {
        match &item.outcome {
            ItemOutcome::Success(result) => output::print_success(&result.title),
            ItemOutcome::Failed(error) => output::print_error(&format!("index {}: {error}", item.index)),
        }
    }
    output::print_info(&format!(
        "{} total, {} succeeded, {} failed, {} skipped",
        summary.total, summary.successful, summary.failed, summary.skipped
    ));

    if !summary.success {
        return Err(CliError::operational(anyhow::anyhow!(
            "{} of {} items failed",
            summary.failed,
            summary.total
        )));
    }
    Ok(())
}
