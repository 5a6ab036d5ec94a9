// Previous-Revision Loader
//
// Reads the data region of a report produced by an earlier run. Rows are
// returned raw, every column up to the sheet's last used column, so extra
// annotation columns added by a reviewer are carried into the next revision.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use revsheet_engine::{CellValue, ReportError, SheetLayout};

use crate::package::XlsxPackage;

/// Where the prior report comes from.
#[derive(Debug, Clone)]
pub enum PreviousRevision {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl PreviousRevision {
    fn read(self) -> Result<Vec<u8>, ReportError> {
        match self {
            PreviousRevision::Path(path) => std::fs::read(&path)
                .map_err(|e| ReportError::Io(format!("{}: {}", path.display(), e))),
            PreviousRevision::Bytes(bytes) => Ok(bytes),
        }
    }
}

impl From<&Path> for PreviousRevision {
    fn from(path: &Path) -> Self {
        PreviousRevision::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for PreviousRevision {
    fn from(bytes: Vec<u8>) -> Self {
        PreviousRevision::Bytes(bytes)
    }
}

/// Data region of a prior report plus the labels of its header row.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousReport {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Load the data rows of the active worksheet. Extraction starts at the
/// layout's data row and stops at the first row whose sequence, page and
/// comment cells are all blank. Rows are not re-filtered.
pub fn load_previous_rows(
    source: PreviousRevision,
    layout: &SheetLayout,
) -> Result<Vec<Vec<CellValue>>, ReportError> {
    let report = load_previous_report(source, layout)?;
    log::debug!("loaded {} rows from previous revision", report.rows.len());
    Ok(report.rows)
}

/// Like `load_previous_rows`, also returning the header row's labels.
pub fn load_previous_report(
    source: PreviousRevision,
    layout: &SheetLayout,
) -> Result<PreviousReport, ReportError> {
    let bytes = source.read()?;

    // calamine has no notion of the active tab; resolve it from the package.
    let sheet_index = XlsxPackage::from_bytes(&bytes)?.active_sheet_index()?;

    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| ReportError::Workbook(format!("cannot open previous revision: {}", e)))?;

    let Some(sheet_name) = workbook.sheet_names().get(sheet_index).cloned() else {
        return Err(ReportError::Workbook(format!(
            "previous revision has no worksheet at index {}",
            sheet_index
        )));
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ReportError::Workbook(e.to_string()))?;
    // Formula text lives in a separate range, laid over the cached values.
    let formulas = workbook
        .worksheet_formula(&sheet_name)
        .map_err(|e| ReportError::Workbook(e.to_string()))?;

    let sheet = SheetCells {
        values: &range,
        formulas: &formulas,
    };
    Ok(PreviousReport {
        headers: header_labels(&sheet, layout),
        rows: extract_rows(&sheet, layout),
    })
}

/// Cached values plus formula text of one worksheet.
struct SheetCells<'a> {
    values: &'a Range<Data>,
    formulas: &'a Range<String>,
}

impl SheetCells<'_> {
    /// Last used (row, column) over values and formulas, 0-based.
    fn end(&self) -> Option<(u32, u32)> {
        [self.values.end(), self.formulas.end()]
            .into_iter()
            .flatten()
            .reduce(|(r1, c1), (r2, c2)| (r1.max(r2), c1.max(c2)))
    }

    fn cell(&self, row: u32, col: u32) -> CellValue {
        let value = self
            .values
            .get_value((row, col))
            .map(cell_value)
            .unwrap_or(CellValue::Empty);
        match self.formulas.get_value((row, col)) {
            Some(text) if !text.is_empty() => CellValue::Formula {
                text: text.trim_start_matches('=').to_string(),
                cached: Box::new(value),
            },
            _ => value,
        }
    }
}

fn header_labels(sheet: &SheetCells<'_>, layout: &SheetLayout) -> Vec<String> {
    let Some((_, last_col)) = sheet.end() else {
        return Vec::new();
    };
    let row = layout.header_row.saturating_sub(1);
    (0..=last_col)
        .map(|c| sheet.cell(row, c).raw_display())
        .collect()
}

fn extract_rows(sheet: &SheetCells<'_>, layout: &SheetLayout) -> Vec<Vec<CellValue>> {
    let Some((last_row, last_col)) = sheet.end() else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    // calamine positions are 0-based
    let mut row = layout.data_start_row.saturating_sub(1);
    while row <= last_row {
        let terminator = [layout.sequence_column, layout.page_column, layout.comment_column]
            .iter()
            .all(|&c| sheet.cell(row, (c as u32).saturating_sub(1)).is_blank());
        if terminator {
            break;
        }

        rows.push((0..=last_col).map(|c| sheet.cell(row, c)).collect());
        row += 1;
    }
    rows
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // durations have no built-in date format to write back with
        Data::DateTime(dt) if dt.is_duration() => CellValue::Number(dt.as_f64()),
        Data::DateTime(dt) => CellValue::Date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}
