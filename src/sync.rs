use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{error, info};

use crate::{
    cli::SyncArgs,
    config::{SourceConfig, SyncConfig},
    normalize::normalize_rows,
    reconcile::{log_mapping, reconcile},
    schema::CanonicalSchema,
    source::{HeaderLocator, load_table, open_source},
    store::{Destination, connect_with_retry},
    upsert::{self, UpsertOptions, UpsertReport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source: String,
    pub rows_read: usize,
    pub rows_failed: usize,
    pub report: UpsertReport,
}

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub outcomes: Vec<SourceOutcome>,
    pub failed_sources: Vec<String>,
    pub elapsed: Duration,
}

impl SyncSummary {
    pub fn rows_applied(&self) -> usize {
        self.outcomes.iter().map(|o| o.report.applied()).sum()
    }

    pub fn rows_skipped(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| o.rows_failed + o.report.failed + o.report.unmatched + o.report.out_of_range)
            .sum()
    }
}

pub fn execute(args: &SyncArgs) -> Result<()> {
    let config = SyncConfig::from_args(args)?;
    let summary = run(&config)?;
    info!(
        "Synchronization complete: {} row(s) applied, {} skipped, {}/{} source(s) failed in {:.2}s",
        summary.rows_applied(),
        summary.rows_skipped(),
        summary.failed_sources.len(),
        config.sources.len(),
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

/// Connects, synchronizes every source and commits once.
pub fn run(config: &SyncConfig) -> Result<SyncSummary> {
    let schema = config.canonical_schema()?;
    let settings = config.destination.connect_settings();
    let mut destination = connect_with_retry(&settings, &schema)?;
    let summary = run_with(&mut destination, &schema, config);
    destination
        .commit()
        .with_context(|| format!("Committing to {:?}", settings.database))?;
    Ok(summary)
}

/// Synchronizes every source into `destination` without committing.
pub fn run_with(
    destination: &mut dyn Destination,
    schema: &CanonicalSchema,
    config: &SyncConfig,
) -> SyncSummary {
    let started = Instant::now();
    let mut summary = SyncSummary::default();
    for source in &config.sources {
        info!("Synchronizing '{}'", source.display_name());
        match sync_source(destination, schema, source, config) {
            Ok(outcome) => {
                info!(
                    "'{}': {} record(s) applied via {} ({} read, {} failed)",
                    outcome.source,
                    outcome.report.applied(),
                    outcome.report.path,
                    outcome.rows_read,
                    outcome.rows_failed + outcome.report.failed
                );
                summary.outcomes.push(outcome);
            }
            Err(err) => {
                error!("Skipping source '{}': {err:#}", source.display_name());
                summary.failed_sources.push(source.display_name().to_string());
            }
        }
    }
    summary.elapsed = started.elapsed();
    summary
}

pub fn sync_source(
    destination: &mut dyn Destination,
    schema: &CanonicalSchema,
    source: &SourceConfig,
    config: &SyncConfig,
) -> Result<SourceOutcome> {
    let mut tabular = open_source(source)?;
    let table = load_table(
        tabular.as_mut(),
        source.sheet.as_deref(),
        &HeaderLocator::for_source(source),
    )?;
    info!(
        "Read sheet '{}': {} row(s), {} column(s)",
        table.sheet,
        table.rows.len(),
        table.headers.len()
    );

    let mapping = reconcile(schema, &table.headers);
    log_mapping(source.display_name(), &mapping);
    let batch = normalize_rows(schema, &mapping, &table.rows);

    let options = UpsertOptions {
        strategy: config.strategy,
        scheme: source.id_scheme(),
        batch_size: config.batch_size,
        insert_unmatched: config.insert_unmatched,
    };
    let rows_read = table.rows.len() - batch.skipped_blank;
    let report = upsert::apply(destination, batch.records, &options)
        .with_context(|| format!("Writing records from '{}'", source.display_name()))?;
    Ok(SourceOutcome {
        source: source.display_name().to_string(),
        rows_read,
        rows_failed: batch.failed,
        report,
    })
}
