// Comment CSV + template (+ previous revision) → filled report
//
// The single entry point the CLI and any other front end call. Each call
// loads its own template and reads its inputs fully; nothing is shared
// between calls.

use std::path::{Path, PathBuf};

use revsheet_engine::{
    filter_records, merge_rows, ReportError, RevisionMarker, SheetLayout, StatusTokens,
};

use crate::csv::{decode_input, parse_records, InputEncoding};
use crate::previous::{load_previous_rows, PreviousRevision};
use crate::template::{OutputDocument, TemplateDocument};

/// The delimited comment input.
#[derive(Debug, Clone)]
pub enum InputSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// Already-decoded text; the encoding option does not apply.
    Text(String),
}

impl InputSource {
    fn into_text(self, encoding: InputEncoding) -> Result<String, ReportError> {
        match self {
            InputSource::Path(path) => {
                let bytes = std::fs::read(&path)
                    .map_err(|e| ReportError::Io(format!("{}: {}", path.display(), e)))?;
                decode_input(&bytes, encoding)
            }
            InputSource::Bytes(bytes) => decode_input(&bytes, encoding),
            InputSource::Text(text) => Ok(match text.strip_prefix('\u{feff}') {
                Some(rest) => rest.to_string(),
                None => text,
            }),
        }
    }
}

/// Knobs for one transformation.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub revision: RevisionMarker,
    pub layout: SheetLayout,
    pub status_tokens: StatusTokens,
    pub encoding: InputEncoding,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(mut self, marker: impl AsRef<str>) -> Self {
        self.revision = RevisionMarker::new(marker);
        self
    }

    pub fn layout(mut self, layout: SheetLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn status_tokens(mut self, tokens: StatusTokens) -> Self {
        self.status_tokens = tokens;
        self
    }

    pub fn encoding(mut self, encoding: InputEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Row counts of a finished transformation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub previous_rows: usize,
    pub input_rows: usize,
    pub filtered_out: usize,
    pub new_rows: usize,
    pub total_rows: usize,
}

/// Fill `template` with the previous revision's rows (if any) followed by
/// the trackable rows of `input`.
///
/// The template is checked before the input is touched, so a missing
/// template is reported even when the input is also bad.
pub fn transform(
    input: InputSource,
    template: &Path,
    previous: Option<PreviousRevision>,
    options: &TransformOptions,
) -> Result<(OutputDocument, TransformSummary), ReportError> {
    options.layout.validate()?;
    let template = TemplateDocument::open(template)?;

    let previous_rows = match previous {
        Some(source) => load_previous_rows(source, &options.layout)?,
        None => Vec::new(),
    };

    log::debug!("decoding input as {}", options.encoding.label());
    let text = input.into_text(options.encoding)?;
    let records = parse_records(&text)?;
    let input_rows = records.len();
    let kept = filter_records(records, &options.status_tokens);

    let merged = merge_rows(previous_rows, &kept, &options.revision, &options.layout);
    let summary = TransformSummary {
        previous_rows: merged.previous_count(),
        input_rows,
        filtered_out: input_rows - kept.len(),
        new_rows: merged.new_count(),
        total_rows: merged.len(),
    };
    log::debug!("{:?}", summary);

    let output = template.fill(&merged, &options.layout)?;
    Ok((output, summary))
}
