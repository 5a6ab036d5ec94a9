//! `revsheet-engine` - review-comment report engine.
//!
//! Pure engine crate: receives parsed input records and previous-revision
//! rows, returns the merged row set the template filler writes out.
//! No file or workbook I/O.

pub mod cell;
pub mod error;
pub mod filter;
pub mod layout;
pub mod merge;
pub mod record;

pub use cell::CellValue;
pub use error::ReportError;
pub use filter::{filter_records, is_trackable, StatusTokens};
pub use layout::SheetLayout;
pub use merge::{merge_rows, MergedRowSet, OutputRow, RevisionMarker, RowOrigin};
pub use record::InputRecord;
