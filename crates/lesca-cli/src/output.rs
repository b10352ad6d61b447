//! Console output helpers (grounded on `riptide-cli::output`).

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Table};
use lesca_session::Aes256GcmCipher;
use serde::Serialize;

/// Redacts the configured session-encryption key out of a message before
/// it reaches stderr/the log — an error bubbling up from a misconfigured
/// `Aes256GcmCipher` can otherwise echo the raw env var value back at the
/// operator (spec.md §9 cross-cutting logging/sanitisation).
fn sanitized(message: &str) -> String {
    match std::env::var(Aes256GcmCipher::ENV_VAR) {
        Ok(key) if !key.is_empty() => lesca_types::redact(message, &[key.as_str()]),
        _ => message.to_string(),
    }
}

pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{} failed to serialize JSON: {e}", "x".red()),
    }
}

pub fn print_success(message: &str) {
    println!("{} {message}", "+".green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "x".red().bold(), sanitized(message));
}

pub fn print_info(message: &str) {
    println!("{} {message}", "i".blue().bold());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), sanitized(message));
}

/// Renders rows of `(header, value)` pairs — as produced by
/// `lesca_metrics::Summary::to_table_rows()` — into one table, one row
/// per input row vector, with the headers taken from the first row.
pub fn print_rows_as_table(rows: &[Vec<(&'static str, String)>]) {
    let Some(first) = rows.first() else {
        print_info("nothing to show");
        return;
    };
    let headers: Vec<&str> = first.iter().map(|(h, _)| *h).collect();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(
        headers
            .into_iter()
            .map(|h| Cell::new(h).set_alignment(CellAlignment::Center)),
    );
    for row in rows {
        table.add_row(row.iter().map(|(_, v)| v.clone()));
    }
    println!("{table}");
}
