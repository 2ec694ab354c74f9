use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{IdRange, Strategy};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Synchronize spreadsheet rows into a SQL table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile, normalize and write one or more sources into the destination table
    Sync(SyncArgs),
    /// Show how a source's columns map onto the canonical schema
    Map(MapArgs),
    /// List the canonical schema and its destination columns
    Schema(SchemaArgs),
    /// Verify the destination table can be reached
    Check(CheckArgs),
}

/// Options describing how to read a single source.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Sheet to read (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Identifier range `start:end` assigned to the source's rows
    #[arg(long)]
    pub range: Option<IdRange>,
    /// Text marking the sub-table; its header is the following row
    #[arg(long, conflicts_with = "header_row")]
    pub marker: Option<String>,
    /// 1-based row holding the column headers
    #[arg(long = "header-row")]
    pub header_row: Option<usize>,
    /// Delimiter for CSV/TSV sources (supports ',', 'tab', ';', '|')
    #[arg(long)]
    pub delimiter: Option<String>,
    /// Character encoding of CSV/TSV sources (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// YAML run configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Source spreadsheet or CSV file (repeatable)
    #[arg(short = 'i', long = "input", action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// SQLite database file holding the destination table
    #[arg(short, long)]
    pub database: Option<PathBuf>,
    /// Destination table name
    #[arg(short, long)]
    pub table: Option<String>,
    /// How existing destination rows are treated
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,
    /// Rows per batch when a bulk insert is rejected
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// Insert records whose identifier has no destination row during keyed updates
    #[arg(long = "insert-unmatched")]
    pub insert_unmatched: bool,
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    /// Source spreadsheet or CSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML schema file (defaults to the built-in leads schema)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Render the first N normalized records
    #[arg(long)]
    pub preview: Option<usize>,
    /// Print the mapping as JSON instead of a table
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// YAML schema file (defaults to the built-in leads schema)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Print the CREATE TABLE statement for this table name
    #[arg(long)]
    pub ddl: Option<String>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// YAML run configuration providing the destination
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// SQLite database file holding the destination table
    #[arg(short, long)]
    pub database: Option<PathBuf>,
    /// Destination table name
    #[arg(short, long)]
    pub table: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
