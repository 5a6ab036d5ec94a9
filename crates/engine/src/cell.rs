use serde::{Deserialize, Serialize};

/// Value of one worksheet cell as carried between revisions.
///
/// Previous-revision cells keep their kind: numbers stay numbers, booleans
/// stay booleans, error cells stay error cells, dates stay dates and formulas
/// keep their text alongside the last calculated value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Spreadsheet error literal such as `#N/A`.
    Error(String),
    /// Date or time as a spreadsheet serial number (1900 date system).
    Date(f64),
    /// Formula text without the leading `=`, with its cached result.
    Formula { text: String, cached: Box<CellValue> },
}

impl CellValue {
    /// Text cell, or `Empty` for `None`.
    pub fn from_optional_text(text: Option<&str>) -> Self {
        match text {
            Some(s) => CellValue::Text(s.to_string()),
            None => CellValue::Empty,
        }
    }

    /// Missing cell or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn raw_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            CellValue::Error(e) => e.clone(),
            CellValue::Date(serial) => format_number(*serial),
            CellValue::Formula { text, .. } => format!("={}", text),
        }
    }
}

/// Shortest faithful rendering: integers without decimals.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}
