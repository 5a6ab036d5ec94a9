// Fixed worksheet layout of a comment report
//
// Row 1 = title, row 2 = column headers, row 3+ = data.
// Column A = "No.", B = "Rev.", C = "Page.", D = "OE/Owner Comment".
// All indices are 1-based, the way spreadsheet users count them.

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SheetLayout {
    /// Row holding the report title (never written).
    pub title_row: u32,
    /// Row holding the column headers (never written).
    pub header_row: u32,
    /// First row of the data region.
    pub data_start_row: u32,
    pub sequence_column: u16,
    pub revision_column: u16,
    pub page_column: u16,
    pub comment_column: u16,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            title_row: 1,
            header_row: 2,
            data_start_row: 3,
            sequence_column: 1,
            revision_column: 2,
            page_column: 3,
            comment_column: 4,
        }
    }
}

impl SheetLayout {
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.title_row == 0 || self.header_row == 0 || self.data_start_row == 0 {
            return Err(ReportError::Layout("row indices are 1-based".into()));
        }
        if self.header_row <= self.title_row {
            return Err(ReportError::Layout(format!(
                "header row {} must come after title row {}",
                self.header_row, self.title_row
            )));
        }
        if self.data_start_row <= self.header_row {
            return Err(ReportError::Layout(format!(
                "data start row {} must come after header row {}",
                self.data_start_row, self.header_row
            )));
        }

        let columns = self.canonical_columns();
        if columns.contains(&0) {
            return Err(ReportError::Layout("column indices are 1-based".into()));
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].contains(col) {
                return Err(ReportError::Layout(format!(
                    "column {col} is assigned to more than one field"
                )));
            }
        }
        Ok(())
    }

    /// Sequence, revision, page, comment, in that order.
    pub fn canonical_columns(&self) -> [u16; 4] {
        [
            self.sequence_column,
            self.revision_column,
            self.page_column,
            self.comment_column,
        ]
    }

    /// Rightmost canonical column (1-based).
    pub fn canonical_width(&self) -> u16 {
        self.canonical_columns().into_iter().max().unwrap_or(0)
    }

    /// Worksheet row (1-based) of the data row at merged index `index`.
    pub fn data_row(&self, index: usize) -> u32 {
        self.data_start_row + index as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_report_contract() {
        let layout = SheetLayout::default();
        assert_eq!(layout.header_row, 2);
        assert_eq!(layout.data_start_row, 3);
        assert_eq!(layout.canonical_columns(), [1, 2, 3, 4]);
        assert_eq!(layout.canonical_width(), 4);
        assert_eq!(layout.data_row(0), 3);
        assert_eq!(layout.data_row(4), 7);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn rejects_data_start_at_or_above_header() {
        let layout = SheetLayout {
            data_start_row: 2,
            ..Default::default()
        };
        assert!(matches!(layout.validate(), Err(ReportError::Layout(_))));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let layout = SheetLayout {
            page_column: 4,
            ..Default::default()
        };
        let err = layout.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid sheet layout: column 4 is assigned to more than one field"
        );
    }

    #[test]
    fn rejects_zero_indices() {
        let layout = SheetLayout {
            sequence_column: 0,
            ..Default::default()
        };
        assert!(layout.validate().is_err());

        let layout = SheetLayout {
            title_row: 0,
            ..Default::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let layout: SheetLayout = serde_json::from_str(r#"{"dataStartRow": 5, "headerRow": 4}"#).unwrap();
        assert_eq!(layout.data_start_row, 5);
        assert_eq!(layout.header_row, 4);
        assert_eq!(layout.title_row, 1);
        assert_eq!(layout.comment_column, 4);
        assert!(layout.validate().is_ok());
    }
}
