//! Row Merger - previous-revision rows followed by new comments
//!
//! Sequence numbers are assigned in two passes over one running counter:
//! first every carried-forward row (only its sequence cell is rewritten),
//! then every new record (all canonical cells written fresh).
//!
//! Key invariants:
//! - All previous rows precede all new rows, each group in source order
//! - Sequence numbers are exactly 1..N in row order
//! - The revision marker only ever lands on new rows
//! - Carried-forward cells beyond the canonical columns survive verbatim
//! - No deduplication between previous and new rows

use crate::cell::CellValue;
use crate::layout::SheetLayout;
use crate::record::InputRecord;

/// Revision tag for newly added rows ("B", "2", ...).
///
/// The tag is written exactly as given. Only the empty string means
/// "no revision"; whitespace is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionMarker(Option<String>);

impl RevisionMarker {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(marker: impl AsRef<str>) -> Self {
        match marker.as_ref() {
            "" => Self(None),
            tag => Self(Some(tag.to_string())),
        }
    }

    pub fn from_option(marker: Option<&str>) -> Self {
        marker.map(Self::new).unwrap_or_default()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    fn to_cell(&self) -> CellValue {
        CellValue::from_optional_text(self.as_str())
    }
}

/// Where a merged row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    Previous,
    New,
}

/// One data row of the output sheet. `cells[0]` is column 1.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub cells: Vec<CellValue>,
    pub origin: RowOrigin,
}

impl OutputRow {
    /// Cell at 1-based `column`; `Empty` past the end of the row.
    pub fn cell(&self, column: u16) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        if column == 0 {
            return &EMPTY;
        }
        self.cells.get(column as usize - 1).unwrap_or(&EMPTY)
    }

    fn set(&mut self, column: u16, value: CellValue) {
        if column == 0 {
            return;
        }
        let idx = column as usize - 1;
        if self.cells.len() <= idx {
            self.cells.resize(idx + 1, CellValue::Empty);
        }
        self.cells[idx] = value;
    }

    /// Number of columns this row spans (last column index, 1-based).
    pub fn width(&self) -> usize {
        self.cells.len()
    }
}

/// Ordered, renumbered rows ready for the template filler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRowSet {
    rows: Vec<OutputRow>,
    previous_count: usize,
}

impl MergedRowSet {
    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn previous_count(&self) -> usize {
        self.previous_count
    }

    pub fn new_count(&self) -> usize {
        self.rows.len() - self.previous_count
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputRow> {
        self.rows.iter()
    }
}

/// Combine carried-forward rows with filtered new records.
///
/// `previous` rows are raw cell tuples starting at column 1, exactly as the
/// previous-revision loader returned them.
pub fn merge_rows(
    previous: Vec<Vec<CellValue>>,
    new: &[InputRecord],
    revision: &RevisionMarker,
    layout: &SheetLayout,
) -> MergedRowSet {
    let previous_count = previous.len();
    let mut rows = Vec::with_capacity(previous_count + new.len());
    let mut sequence = 0u32;

    for cells in previous {
        sequence += 1;
        let mut row = OutputRow {
            cells,
            origin: RowOrigin::Previous,
        };
        row.set(layout.sequence_column, CellValue::Number(sequence as f64));
        rows.push(row);
    }

    let width = layout.canonical_width() as usize;
    for record in new {
        sequence += 1;
        let mut row = OutputRow {
            cells: vec![CellValue::Empty; width],
            origin: RowOrigin::New,
        };
        row.set(layout.sequence_column, CellValue::Number(sequence as f64));
        row.set(layout.revision_column, revision.to_cell());
        // an empty page stays a truly blank cell
        let page = match record.page.as_str() {
            "" => CellValue::Empty,
            page => CellValue::Text(page.to_string()),
        };
        row.set(layout.page_column, page);
        row.set(layout.comment_column, CellValue::Text(record.text.clone()));
        rows.push(row);
    }

    log::debug!(
        "merged {} previous + {} new rows (revision {:?})",
        previous_count,
        new.len(),
        revision.as_str()
    );

    MergedRowSet {
        rows,
        previous_count,
    }
}
