//! Tabular sources: locating a sheet and turning it into header-labelled rows.
//!
//! Every acquisition mechanism implements [`TabularSource`], which only has
//! to list sheet names and return a sheet as a grid of raw cells. Header
//! detection, sub-table lookup by marker text and blank-column pruning are
//! shared and happen in [`SheetTable::from_grid`].

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::debug;
use thiserror::Error;

use crate::{
    config::SourceConfig,
    data::CellValue,
    io_utils,
    normalize::SourceRow,
    reconcile::clean_label,
    workbook::WorkbookSource,
};

pub type Grid = Vec<Vec<CellValue>>;

const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{0}' does not exist")]
    NotFound(String),
    #[error("unsupported source '{0}': expected one of csv, tsv, txt, xlsx, xlsm, xlsb, xls, ods")]
    Unsupported(String),
    #[error("failed to read '{locator}': {message}")]
    Read { locator: String, message: String },
    #[error("failed to open workbook '{locator}'")]
    Workbook {
        locator: String,
        #[source]
        source: calamine::Error,
    },
    #[error("'{0}' has no sheets")]
    NoSheets(String),
    #[error("sheet '{sheet}' not found in '{locator}' (available: {available})")]
    UnknownSheet {
        locator: String,
        sheet: String,
        available: String,
    },
    #[error("marker '{marker}' not found in sheet '{sheet}'")]
    MarkerNotFound { sheet: String, marker: String },
    #[error("header row {row} is beyond the {rows} row(s) of sheet '{sheet}'")]
    HeaderRowOutOfRange {
        sheet: String,
        row: usize,
        rows: usize,
    },
}

pub trait TabularSource {
    fn locator(&self) -> &str;
    fn sheet_names(&mut self) -> Result<Vec<String>, SourceError>;
    fn read_sheet(&mut self, sheet: &str) -> Result<Grid, SourceError>;
}

/// Where the header row of a sheet is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLocator {
    /// 1-based sheet row.
    Row(usize),
    /// The row after the first cell containing this text; the table ends at
    /// the next blank row.
    Marker(String),
}

impl Default for HeaderLocator {
    fn default() -> Self {
        HeaderLocator::Row(1)
    }
}

impl HeaderLocator {
    pub fn for_source(config: &SourceConfig) -> Self {
        match (&config.marker, config.header_row) {
            (Some(marker), _) => HeaderLocator::Marker(marker.clone()),
            (None, Some(row)) => HeaderLocator::Row(row),
            (None, None) => HeaderLocator::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet: String,
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SheetTable {
    pub fn from_grid(
        sheet: &str,
        grid: &[Vec<CellValue>],
        locator: &HeaderLocator,
    ) -> Result<Self, SourceError> {
        let (header_idx, bounded) = match locator {
            HeaderLocator::Row(row) => (row.saturating_sub(1), false),
            HeaderLocator::Marker(marker) => {
                let row = find_marker(grid, marker).ok_or_else(|| SourceError::MarkerNotFound {
                    sheet: sheet.to_string(),
                    marker: marker.clone(),
                })?;
                debug!("Marker '{marker}' found on row {} of '{sheet}'", row + 1);
                (row + 1, true)
            }
        };
        if header_idx >= grid.len() {
            return Err(SourceError::HeaderRowOutOfRange {
                sheet: sheet.to_string(),
                row: header_idx + 1,
                rows: grid.len(),
            });
        }

        let header_cells = &grid[header_idx];
        let mut data_rows = &grid[header_idx + 1..];
        if bounded {
            let end = data_rows
                .iter()
                .position(|row| row.iter().all(CellValue::is_empty))
                .unwrap_or(data_rows.len());
            data_rows = &data_rows[..end];
        }

        let width = data_rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_cells.len()))
            .max()
            .unwrap_or(0);
        let empty = CellValue::Empty;
        let cell = |row: &[CellValue], idx: usize| row.get(idx).unwrap_or(&empty).clone();

        let mut kept = Vec::new();
        let mut headers = Vec::new();
        for idx in 0..width {
            let label = clean_label(&cell(header_cells.as_slice(), idx).as_display());
            let has_data = data_rows.iter().any(|row| !cell(row.as_slice(), idx).is_empty());
            if label.is_empty() && !has_data {
                continue;
            }
            kept.push(idx);
            headers.push(if label.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                label
            });
        }

        let rows = data_rows
            .iter()
            .enumerate()
            .map(|(offset, row)| {
                let cells = kept
                    .iter()
                    .zip(&headers)
                    .map(|(idx, label)| (label.clone(), cell(row.as_slice(), *idx)))
                    .collect();
                SourceRow::new(offset + 1, cells)
            })
            .collect();

        Ok(Self {
            sheet: sheet.to_string(),
            headers,
            rows,
        })
    }
}

fn find_marker(grid: &[Vec<CellValue>], marker: &str) -> Option<usize> {
    let needle = marker.trim().to_lowercase();
    grid.iter().position(|row| {
        row.iter()
            .any(|cell| cell.as_display().to_lowercase().contains(&needle))
    })
}

/// Picks the requested sheet (case-insensitive) or the first one and locates its table.
pub fn load_table(
    source: &mut dyn TabularSource,
    sheet: Option<&str>,
    locator: &HeaderLocator,
) -> Result<SheetTable, SourceError> {
    let names = source.sheet_names()?;
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|name| name.trim().eq_ignore_ascii_case(wanted.trim()))
            .cloned()
            .ok_or_else(|| SourceError::UnknownSheet {
                locator: source.locator().to_string(),
                sheet: wanted.to_string(),
                available: names.join(", "),
            })?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| SourceError::NoSheets(source.locator().to_string()))?,
    };
    let grid = source.read_sheet(&name)?;
    debug!("Read {} row(s) from sheet '{name}'", grid.len());
    SheetTable::from_grid(&name, &grid, locator)
}

pub fn open_source(config: &SourceConfig) -> Result<Box<dyn TabularSource>, SourceError> {
    let path = Path::new(&config.locator);
    if io_utils::is_dash(path) {
        return DelimitedSource::open(path, config).map(|s| Box::new(s) as Box<dyn TabularSource>);
    }
    if !path.exists() {
        return Err(SourceError::NotFound(config.locator.clone()));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if DELIMITED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(Box::new(DelimitedSource::open(path, config)?))
    } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        Ok(Box::new(WorkbookSource::open(path)?))
    } else {
        Err(SourceError::Unsupported(config.locator.clone()))
    }
}

/// CSV/TSV file (or stdin) exposed as a single sheet named after the file stem.
pub struct DelimitedSource {
    path: PathBuf,
    locator: String,
    sheet: String,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl DelimitedSource {
    pub fn open(path: &Path, config: &SourceConfig) -> Result<Self, SourceError> {
        let locator = config.locator.clone();
        let read_error = |message: String| SourceError::Read {
            locator: locator.clone(),
            message,
        };
        let delimiter = config
            .delimiter_byte()
            .map_err(|err| read_error(err.to_string()))?;
        let encoding = io_utils::resolve_encoding(config.encoding.as_deref())
            .map_err(|err| read_error(format!("{err:#}")))?;
        let sheet = if io_utils::is_dash(path) {
            "stdin".to_string()
        } else {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| locator.clone())
        };
        Ok(Self {
            path: path.to_path_buf(),
            delimiter: io_utils::resolve_input_delimiter(path, delimiter),
            locator,
            sheet,
            encoding,
        })
    }
}

impl TabularSource for DelimitedSource {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(vec![self.sheet.clone()])
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<Grid, SourceError> {
        if sheet != self.sheet {
            return Err(SourceError::UnknownSheet {
                locator: self.locator.clone(),
                sheet: sheet.to_string(),
                available: self.sheet.clone(),
            });
        }
        let records = io_utils::read_all_records(&self.path, self.delimiter, self.encoding)
            .map_err(|err| SourceError::Read {
                locator: self.locator.clone(),
                message: format!("{err:#}"),
            })?;
        Ok(records
            .iter()
            .map(|record| record.iter().map(|value| CellValue::from_text(value)).collect())
            .collect())
    }
}

/// Sheets held in memory, for callers that already have the data.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    sheets: Vec<(String, Grid)>,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sheets: Vec::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: &str, grid: Grid) -> Self {
        self.sheets.push((sheet.to_string(), grid));
        self
    }

    /// Sheet whose first row is `headers`, followed by text `rows`.
    pub fn with_text_sheet(self, sheet: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        let grid = std::iter::once(headers)
            .chain(rows.iter().copied())
            .map(|row| row.iter().map(|value| CellValue::from_text(value)).collect())
            .collect();
        self.with_sheet(sheet, grid)
    }
}

impl TabularSource for MemorySource {
    fn locator(&self) -> &str {
        &self.name
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(self.sheets.iter().map(|(name, _)| name.clone()).collect())
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<Grid, SourceError> {
        self.sheets
            .iter()
            .find(|(name, _)| name == sheet)
            .map(|(_, grid)| grid.clone())
            .ok_or_else(|| SourceError::UnknownSheet {
                locator: self.name.clone(),
                sheet: sheet.to_string(),
                available: self
                    .sheets
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
