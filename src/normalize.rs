//! Row normalization: turning a reconciled source row into a canonical record.
//!
//! Text fields are rendered and silently truncated to their maximum length
//! in characters. Date fields accept date cells directly and parse date text
//! leniently; anything that is not a recognisable date becomes null. A bound
//! cell carrying a spreadsheet error marker rejects the whole row, so a
//! record either normalizes completely or is skipped.

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    data::{CellValue, format_timestamp, parse_date_text, truncate_chars},
    reconcile::ColumnMapping,
    schema::{CanonicalSchema, FieldSpec, FieldType},
};

#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("row {position}: column '{column}' for field '{field}' holds error value {marker}")]
    ErrorCell {
        position: usize,
        field: String,
        column: String,
        marker: String,
    },
}

/// One data row of a source sheet, keyed by cleaned header label.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based position among the data rows of the sheet.
    pub position: usize,
    pub cells: Vec<(String, CellValue)>,
}

impl SourceRow {
    pub fn new(position: usize, cells: Vec<(String, CellValue)>) -> Self {
        Self { position, cells }
    }

    /// First cell under `label`; duplicate labels resolve to the leftmost column.
    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDateTime),
    Null,
}

impl FieldValue {
    /// Value as stored in the destination's text columns.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Date(dt) => Some(format_timestamp(dt)),
            FieldValue::Null => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub values: Vec<FieldValue>,
}

impl CanonicalRecord {
    pub fn get(&self, schema: &CanonicalSchema, field: &str) -> Option<&FieldValue> {
        schema.position(field).and_then(|idx| self.values.get(idx))
    }

    pub fn display_values(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|value| value.to_sql_text().unwrap_or_default())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedRecord {
    pub position: usize,
    pub record: CanonicalRecord,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<PositionedRecord>,
    pub skipped_blank: usize,
    pub failed: usize,
}

pub fn coerce_text(value: &CellValue, field: &FieldSpec) -> String {
    let rendered = value.as_display();
    match field.max_length {
        Some(max) => truncate_chars(&rendered, max),
        None => rendered,
    }
}

pub fn coerce_date(value: &CellValue) -> FieldValue {
    match value {
        CellValue::DateTime(dt) => FieldValue::Date(*dt),
        CellValue::Text(text) => parse_date_text(text)
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Null),
        _ => FieldValue::Null,
    }
}

pub fn normalize_row(
    schema: &CanonicalSchema,
    mapping: &ColumnMapping,
    row: &SourceRow,
) -> Result<CanonicalRecord, RowError> {
    let empty = CellValue::Empty;
    let mut values = Vec::with_capacity(schema.len());
    for field in &schema.fields {
        let column = mapping
            .column_for(&field.name)
            .unwrap_or(field.name.as_str());
        let raw = row.get(column).unwrap_or(&empty);
        if let CellValue::Error(marker) = raw {
            return Err(RowError::ErrorCell {
                position: row.position,
                field: field.name.clone(),
                column: column.to_string(),
                marker: marker.clone(),
            });
        }
        let value = match field.field_type {
            FieldType::Text => FieldValue::Text(coerce_text(raw, field)),
            FieldType::Date => coerce_date(raw),
        };
        values.push(value);
    }
    Ok(CanonicalRecord { values })
}

/// Normalizes every row, dropping blank rows and logging rows that fail.
pub fn normalize_rows(
    schema: &CanonicalSchema,
    mapping: &ColumnMapping,
    rows: &[SourceRow],
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for row in rows {
        if row.is_blank() {
            batch.skipped_blank += 1;
            continue;
        }
        match normalize_row(schema, mapping, row) {
            Ok(record) => batch.records.push(PositionedRecord {
                position: row.position,
                record,
            }),
            Err(err) => {
                warn!("Skipping {err}");
                batch.failed += 1;
            }
        }
    }
    if batch.skipped_blank > 0 {
        debug!("Dropped {} blank row(s)", batch.skipped_blank);
    }
    info!(
        "Prepared {} record(s) ({} failed)",
        batch.records.len(),
        batch.failed
    );
    batch
}
