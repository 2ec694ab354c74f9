#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use sheet_sync::{
    data::CellValue,
    normalize::{CanonicalRecord, FieldValue, PositionedRecord, SourceRow},
    schema::{CanonicalSchema, FieldType},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a single-sheet workbook. Cells that look like `date:YYYY-MM-DD`
    /// become real date cells, numeric-looking cells become numbers.
    pub fn write_workbook(&self, name: &str, sheet: &str, rows: &[&[&str]]) -> PathBuf {
        let path = self.join(name);
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet).expect("sheet name");
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, value) in row.iter().enumerate() {
                let (r, c) = (row_idx as u32, col_idx as u16);
                if value.is_empty() {
                    continue;
                }
                if let Some(date) = value.strip_prefix("date:") {
                    let parts = date
                        .split('-')
                        .map(|p| p.parse::<u32>().expect("date part"))
                        .collect::<Vec<_>>();
                    let datetime = ExcelDateTime::from_ymd(parts[0] as u16, parts[1] as u8, parts[2] as u8)
                        .expect("valid date");
                    worksheet
                        .write_datetime_with_format(r, c, &datetime, &date_format)
                        .expect("write date");
                } else if let Ok(number) = value.parse::<f64>() {
                    worksheet.write_number(r, c, number).expect("write number");
                } else {
                    worksheet.write_string(r, c, *value).expect("write string");
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn text_row(position: usize, pairs: &[(&str, &str)]) -> SourceRow {
    SourceRow::new(
        position,
        pairs
            .iter()
            .map(|(label, value)| (label.to_string(), CellValue::from_text(value)))
            .collect(),
    )
}

/// Leads record with `Ejecutivo` set to `name` and every other field empty.
pub fn lead(name: &str) -> CanonicalRecord {
    let schema = CanonicalSchema::leads();
    let mut values = schema
        .fields
        .iter()
        .map(|field| match field.field_type {
            FieldType::Text => FieldValue::Text(String::new()),
            FieldType::Date => FieldValue::Null,
        })
        .collect::<Vec<_>>();
    values[0] = FieldValue::Text(name.to_string());
    CanonicalRecord { values }
}

pub fn leads(count: usize) -> Vec<PositionedRecord> {
    (1..=count)
        .map(|position| PositionedRecord {
            position,
            record: lead(&format!("row {position}")),
        })
        .collect()
}
