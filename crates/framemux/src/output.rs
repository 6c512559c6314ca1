use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A one-record command result: serialized as-is for JSON, shown as
/// `rows` otherwise.
pub fn print_summary<T: Serialize>(value: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(rows.iter().map(|(key, _)| key.to_uppercase()))
                .add_row(rows.iter().map(|(_, value)| value.clone()));
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = rows
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Raw => {
            let values: Vec<&str> = rows.iter().map(|(_, value)| value.as_str()).collect();
            println!("{}", values.join("\t"));
        }
    }
}

/// A multi-row report rendered as a table.
pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}
