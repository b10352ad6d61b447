//! `lesca metrics export` (spec.md §6).

use clap::{Args, ValueEnum};
use lesca_metrics::{export_csv, export_json, MetricsCollector};

use crate::error::CliError;
use crate::output;

#[derive(Debug, Args)]
pub struct MetricsArgs {
    #[command(subcommand)]
    pub command: MetricsCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum MetricsCommand {
    Export {
        #[arg(long, value_enum, default_value = "table")]
        format: ExportFormat,
        #[arg(long)]
        include_history: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Table,
}

fn now_ms() -> lesca_types::EpochMs {
    chrono::Utc::now().timestamp_millis()
}

pub async fn execute(collector: &MetricsCollector, command: MetricsCommand) -> Result<(), CliError> {
    match command {
        MetricsCommand::Export { format, include_history } => match format {
            ExportFormat::Json => {
                let text = export_json(collector, now_ms(), include_history).map_err(CliError::operational)?;
                println!("{text}");
                Ok(())
            }
            ExportFormat::Csv => {
                let text = export_csv(collector, now_ms()).map_err(CliError::operational)?;
                println!("{text}");
                Ok(())
            }
            ExportFormat::Table => {
                let summary = collector.get_summary(now_ms());
                output::print_rows_as_table(&summary.to_table_rows());
                Ok(())
            }
        },
    }
}
