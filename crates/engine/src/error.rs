use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum ReportError {
    /// Required header fields absent from the delimited input.
    Schema { found: Vec<String> },
    /// Template workbook does not exist at call time.
    TemplateMissing(PathBuf),
    /// Input bytes are not valid text in the requested encoding.
    Decode(String),
    /// Malformed delimited record.
    Csv(String),
    /// Workbook package structure (zip entries, XML parts) is unusable.
    Package(String),
    /// Cell data of a workbook could not be read.
    Workbook(String),
    /// Layout configuration is inconsistent.
    Layout(String),
    /// IO error (file read/write, etc.).
    Io(String),
}

impl ReportError {
    /// Header names the input actually carried, for `Schema` errors.
    pub fn found_headers(&self) -> Option<&[String]> {
        match self {
            Self::Schema { found } => Some(found),
            _ => None,
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { found } => {
                write!(f, "input must have columns 'Page' and 'Text'; got {found:?}")
            }
            Self::TemplateMissing(path) => write!(f, "template not found: {}", path.display()),
            Self::Decode(msg) => write!(f, "input could not be decoded: {msg}"),
            Self::Csv(msg) => write!(f, "malformed input row: {msg}"),
            Self::Package(msg) => write!(f, "invalid workbook package: {msg}"),
            Self::Workbook(msg) => write!(f, "workbook read error: {msg}"),
            Self::Layout(msg) => write!(f, "invalid sheet layout: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_found_headers() {
        let err = ReportError::Schema {
            found: vec!["ID".to_string(), "Text".to_string()],
        };
        assert_eq!(
            err.to_string(),
            r#"input must have columns 'Page' and 'Text'; got ["ID", "Text"]"#
        );
        assert_eq!(err.found_headers().unwrap(), &["ID".to_string(), "Text".to_string()]);
    }

    #[test]
    fn template_missing_shows_path() {
        let err = ReportError::TemplateMissing(PathBuf::from("out/template.xlsx"));
        assert_eq!(err.to_string(), "template not found: out/template.xlsx");
        assert!(err.found_headers().is_none());
    }
}
