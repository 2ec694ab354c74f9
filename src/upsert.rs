//! Applying canonical records to the destination.
//!
//! Two strategies are supported. Replace-all deletes every row and inserts
//! the new set (an empty set leaves the table untouched), first as a single bulk insert and, when the store rejects
//! it, in fixed-size batches; a rejected batch is retried row by row so only
//! the offending rows are lost. Keyed update counts the table first: an
//! empty table receives plain inserts, otherwise each record overwrites the
//! row carrying its identifier. Row failures are logged and skipped and
//! never undo rows already written.

use std::{fmt, time::Instant};

use log::{debug, error, info, warn};

use crate::{
    config::{IdScheme, Strategy},
    normalize::PositionedRecord,
    store::{Destination, DestinationRow, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOptions {
    pub strategy: Strategy,
    pub scheme: IdScheme,
    pub batch_size: usize,
    pub insert_unmatched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertPath {
    #[default]
    Nothing,
    BulkInsert,
    BatchedInsert,
    Insert,
    Update,
}

impl fmt::Display for UpsertPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpsertPath::Nothing => "nothing to apply",
            UpsertPath::BulkInsert => "bulk insert",
            UpsertPath::BatchedInsert => "batched insert",
            UpsertPath::Insert => "insert",
            UpsertPath::Update => "update",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub path: UpsertPath,
    pub deleted: u64,
    pub inserted: usize,
    pub updated: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub out_of_range: usize,
}

impl UpsertReport {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Pairs records with identifiers, stopping at the first one past the range.
pub fn assign_ids(records: Vec<PositionedRecord>, scheme: IdScheme) -> (Vec<DestinationRow>, usize) {
    let total = records.len();
    let rows: Vec<DestinationRow> = records
        .into_iter()
        .map_while(|positioned| {
            scheme.id_for(positioned.position).map(|id| DestinationRow {
                id,
                record: positioned.record,
            })
        })
        .collect();
    let discarded = total - rows.len();
    (rows, discarded)
}

pub fn apply(
    destination: &mut dyn Destination,
    records: Vec<PositionedRecord>,
    options: &UpsertOptions,
) -> Result<UpsertReport, StoreError> {
    let (rows, out_of_range) = assign_ids(records, options.scheme);
    if out_of_range > 0 {
        warn!("{out_of_range} record(s) fall outside the identifier range and were skipped");
    }
    let mut report = match options.strategy {
        Strategy::ReplaceAll => replace_all(destination, &rows, options.batch_size)?,
        Strategy::KeyedUpdate => keyed_update(destination, &rows, options.insert_unmatched)?,
    };
    report.out_of_range = out_of_range;
    Ok(report)
}

pub fn replace_all(
    destination: &mut dyn Destination,
    rows: &[DestinationRow],
    batch_size: usize,
) -> Result<UpsertReport, StoreError> {
    if rows.is_empty() {
        warn!("No records to write; keeping the existing destination rows");
        return Ok(UpsertReport::default());
    }
    let started = Instant::now();
    let mut report = UpsertReport {
        deleted: destination.delete_all()?,
        ..UpsertReport::default()
    };
    info!("Deleted {} existing row(s)", report.deleted);

    match destination.insert_many(rows) {
        Ok(inserted) => {
            report.path = UpsertPath::BulkInsert;
            report.inserted = inserted;
            info!(
                "Bulk insert of {inserted} record(s) succeeded in {:.2}s",
                started.elapsed().as_secs_f64()
            );
            return Ok(report);
        }
        Err(err) => {
            warn!("Bulk insert of {} record(s) failed: {err}", rows.len());
            info!("Retrying in batches of {batch_size}");
        }
    }

    report.path = UpsertPath::BatchedInsert;
    for (batch_idx, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        match destination.insert_many(batch) {
            Ok(inserted) => {
                report.inserted += inserted;
                info!("Batch {}: {} record(s)", batch_idx + 1, batch.len());
            }
            Err(err) => {
                error!("Batch {} failed: {err}; inserting its rows one by one", batch_idx + 1);
                let (inserted, failed) = insert_individually(destination, batch);
                report.inserted += inserted;
                report.failed += failed;
            }
        }
    }
    info!(
        "Batched insert finished in {:.2}s ({} inserted, {} rejected)",
        started.elapsed().as_secs_f64(),
        report.inserted,
        report.failed
    );
    Ok(report)
}

fn insert_individually(destination: &mut dyn Destination, rows: &[DestinationRow]) -> (usize, usize) {
    let mut inserted = 0;
    let mut failed = 0;
    for row in rows {
        match destination.insert_one(row) {
            Ok(()) => inserted += 1,
            Err(err) => {
                warn!("Row with id {} rejected: {err}", row.id);
                failed += 1;
            }
        }
    }
    (inserted, failed)
}

pub fn keyed_update(
    destination: &mut dyn Destination,
    rows: &[DestinationRow],
    insert_unmatched: bool,
) -> Result<UpsertReport, StoreError> {
    let existing = destination.count_rows()?;
    let mut report = UpsertReport::default();
    if rows.is_empty() {
        return Ok(report);
    }

    if existing == 0 {
        info!("Destination is empty; inserting {} record(s)", rows.len());
        report.path = UpsertPath::Insert;
        let (inserted, failed) = insert_individually(destination, rows);
        report.inserted = inserted;
        report.failed = failed;
        return Ok(report);
    }

    info!(
        "Destination holds {existing} row(s); updating {} record(s) by id",
        rows.len()
    );
    report.path = UpsertPath::Update;
    for row in rows {
        match destination.update_one(row) {
            Ok(true) => report.updated += 1,
            Ok(false) if insert_unmatched => match destination.insert_one(row) {
                Ok(()) => report.inserted += 1,
                Err(err) => {
                    warn!("Row with id {} rejected: {err}", row.id);
                    report.failed += 1;
                }
            },
            Ok(false) => {
                debug!("No destination row with id {}", row.id);
                report.unmatched += 1;
            }
            Err(err) => {
                warn!("Update of id {} failed: {err}", row.id);
                report.failed += 1;
            }
        }
    }
    if report.unmatched > 0 {
        warn!(
            "{} record(s) had no matching destination row and were not written",
            report.unmatched
        );
    }
    Ok(report)
}
