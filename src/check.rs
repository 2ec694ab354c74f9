use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::CheckArgs,
    config::{DestinationConfig, SyncConfig},
    store::connect_with_retry,
};

pub fn execute(args: &CheckArgs) -> Result<()> {
    let (mut destination, schema) = match &args.config {
        Some(path) => {
            let config = SyncConfig::load(path)?;
            (config.destination.clone(), config.canonical_schema()?)
        }
        None => {
            let database = args
                .database
                .clone()
                .context("Either --config or --database must be provided")?;
            (DestinationConfig::new(database), Default::default())
        }
    };
    if let Some(table) = &args.table {
        destination.table = table.clone();
    }

    let settings = destination.connect_settings();
    let mut store = connect_with_retry(&settings, &schema)?;
    let rows = store
        .probe()
        .with_context(|| format!("Reading table '{}'", store.table()))?;
    info!("Table '{}' is reachable ({rows} row(s))", store.table());
    println!("ok: {} row(s) in '{}'", rows, store.table());
    Ok(())
}
