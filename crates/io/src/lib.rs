//! `revsheet-io` - file formats for the comment report.
//!
//! Reads the delimited comment input and prior report revisions, and fills
//! XLSX templates in place. The `transform` module ties the stages together.

pub mod csv;
pub mod package;
pub mod previous;
pub mod sheet_xml;
pub mod styles;
pub mod template;
pub mod transform;

pub use self::csv::InputEncoding;
pub use previous::{load_previous_report, load_previous_rows, PreviousReport, PreviousRevision};
pub use template::{create_default_template, OutputDocument, TemplateDocument};
pub use transform::{transform, InputSource, TransformOptions, TransformSummary};
