//! `lesca` CLI entry point (spec.md §6 "CLI surface").
//!
//! Wires the core crates directly into the process — no HTTP server
//! sits between this binary and `lesca-pool`/`lesca-session`/etc, per
//! spec.md's "the CLI drives the content-extraction substrate
//! in-process" framing.

mod backend;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use lesca_events::EventBus;
use lesca_metrics::{CollectorConfig, MetricsCollector};
use lesca_plugins::PluginChain;
use lesca_pool::{PoolConfig, SessionPoolManager};
use lesca_session::{Aes256GcmCipher, NoopCipher, SessionCipher, SessionStore, SessionStoreConfig};
use spider_chrome::BrowserConfig;

use backend::{InMemoryContentWriter, NoopScrapeBackend};
use commands::scrape::ScrapeServices;
use config::CliConfig;
use error::{CliError, ExitCode};

#[derive(Parser)]
#[command(name = "lesca", version, about = "Content-extraction browser execution substrate")]
struct Cli {
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the on-disk layout and write a starter config.
    Init,
    /// Drive a scrape through the pool/plugin/writer pipeline.
    Scrape(commands::scrape::ScrapeArgs),
    /// Manage durable browser sessions.
    Session(commands::session::SessionArgs),
    /// Export collected pool/breaker metrics.
    Metrics(commands::metrics::MetricsArgs),
}

fn init_tracing(verbose: bool) {
    if std::env::var("RUST_LOG").is_err() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", format!("lesca_cli={level},lesca_pool={level}"));
    }
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(ExitCode::Success.as_i32()),
        Err(e) => {
            output::print_error(&e.to_string());
            std::process::exit(e.exit_code().as_i32())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::load()?;

    match cli.command {
        Commands::Init => commands::init::execute(&config).await,
        Commands::Scrape(args) => {
            let services = build_scrape_services(&config)?;
            commands::scrape::execute(&config, args, &services).await
        }
        Commands::Session(args) => {
            let store = SessionStore::new(
                SessionStoreConfig::new(config.sessions_dir.clone()),
                session_cipher(),
            );
            commands::session::execute(&store, args.command).await
        }
        Commands::Metrics(args) => {
            let collector = MetricsCollector::new(CollectorConfig::default());
            let bus = EventBus::default();
            collector.start(&bus);
            commands::metrics::execute(&collector, args.command).await
        }
    }
}

/// Resolves the session store's at-rest cipher from `LESCA_ENCRYPTION_KEY`
/// (spec.md §6). Falls back to a passthrough cipher when the variable is
/// unset, or when it is set but malformed — a bad key must not make
/// session commands unusable, it just means sessions are stored in the
/// clear, and the misconfiguration is surfaced as a warning.
fn session_cipher() -> Arc<dyn SessionCipher> {
    match Aes256GcmCipher::from_env() {
        Ok(cipher) => Arc::new(cipher),
        Err(lesca_session::CipherError::MissingKey) => Arc::new(NoopCipher),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "{} set but invalid, storing sessions unencrypted",
                Aes256GcmCipher::ENV_VAR
            );
            Arc::new(NoopCipher)
        }
    }
}

/// Builds the pool/plugin/writer collaborators a scrape command needs.
/// A fresh `SessionPoolManager` per invocation keeps the CLI stateless
/// between runs, matching the rest of its command surface.
fn build_scrape_services(config: &CliConfig) -> Result<ScrapeServices, CliError> {
    let pool_config = PoolConfig {
        min_size: config.pool_min_size,
        max_size: config.pool_max_size,
        ..PoolConfig::default()
    };
    let browser_config = BrowserConfig::builder()
        .build()
        .map_err(|e| CliError::operational(anyhow::anyhow!(e)))?;
    let pool = SessionPoolManager::new(
        pool_config,
        browser_config,
        lesca_reliability::clock::real_clock(),
        None,
    );

    Ok(ScrapeServices {
        pool: Arc::new(pool),
        backend: Arc::new(NoopScrapeBackend),
        plugins: Arc::new(PluginChain::new()),
        writer: Arc::new(InMemoryContentWriter::new()),
    })
}
