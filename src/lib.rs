pub mod check;
pub mod cli;
pub mod config;
pub mod data;
pub mod inspect;
pub mod io_utils;
pub mod normalize;
pub mod reconcile;
pub mod schema;
pub mod schema_cmd;
pub mod source;
pub mod store;
pub mod sync;
pub mod table;
pub mod upsert;
pub mod workbook;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_sync", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    debug!("Command: {:?}", cli.command);
    match cli.command {
        Commands::Sync(args) => sync::execute(&args),
        Commands::Map(args) => inspect::execute(&args),
        Commands::Schema(args) => schema_cmd::execute(&args),
        Commands::Check(args) => check::execute(&args),
    }
}
