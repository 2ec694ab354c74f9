//! Workbook sources (xlsx, xlsm, xlsb, xls, ods) read through calamine.

use std::{fs::File, io::BufReader, path::Path};

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};

use crate::{
    data::{CellValue, parse_date_text},
    source::{Grid, SourceError, TabularSource},
};

pub struct WorkbookSource {
    locator: String,
    workbook: Sheets<BufReader<File>>,
}

impl WorkbookSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let locator = path.display().to_string();
        let workbook = open_workbook_auto(path).map_err(|source| SourceError::Workbook {
            locator: locator.clone(),
            source,
        })?;
        Ok(Self { locator, workbook })
    }
}

impl TabularSource for WorkbookSource {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(self.workbook.sheet_names().to_vec())
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<Grid, SourceError> {
        let range = self
            .workbook
            .worksheet_range(sheet)
            .map_err(|err| SourceError::Read {
                locator: self.locator.clone(),
                message: format!("sheet '{sheet}': {err}"),
            })?;
        Ok(range_to_grid(&range))
    }
}

/// Lays the used range out on sheet coordinates so row numbers match what
/// the user sees in the spreadsheet.
pub fn range_to_grid(range: &Range<Data>) -> Grid {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let mut grid: Grid = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; start_col as usize];
        cells.extend(row.iter().map(cell_value));
        grid.push(cells);
    }
    grid
}

pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from_text(s),
        Data::Float(f) => CellValue::Float(*f),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Bool(b) => CellValue::Boolean(*b),
        // Serial numbers outside chrono's range stay numeric.
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Float(dt.as_f64())),
        Data::DateTimeIso(s) => parse_date_text(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(err) => CellValue::Error(err.to_string()),
    }
}
