// Comment CSV input: decoding and header-keyed parsing
//
// The input is comma-separated with a header row that must contain "Page"
// and "Text". Spreadsheet exports frequently start with a UTF-8 byte-order
// mark, so the first header may arrive as "\u{feff}Page".

use revsheet_engine::{InputRecord, ReportError};

const BOM: char = '\u{feff}';

pub const PAGE_HEADER: &str = "Page";
pub const TEXT_HEADER: &str = "Text";

/// Text encoding of the input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputEncoding {
    /// Strict UTF-8; invalid bytes are a decode error.
    #[default]
    Utf8,
    /// Legacy Windows-1252 export (explicit opt-in only).
    Windows1252,
}

impl InputEncoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" | "utf-8-sig" => Some(Self::Utf8),
            "windows-1252" | "cp1252" | "latin1" | "latin-1" => Some(Self::Windows1252),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Windows1252 => "windows-1252",
        }
    }
}

/// Decode raw input bytes, stripping a leading byte-order mark.
pub fn decode_input(bytes: &[u8], encoding: InputEncoding) -> Result<String, ReportError> {
    let text = match encoding {
        InputEncoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(e) => {
                return Err(ReportError::Decode(format!(
                    "invalid UTF-8 at byte {}; re-save the file as UTF-8",
                    e.valid_up_to()
                )));
            }
        },
        InputEncoding::Windows1252 => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };

    Ok(match text.strip_prefix(BOM) {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Parse header-keyed records. Fails with `Schema` when "Page" or "Text" is
/// missing; no rows are read in that case.
pub fn parse_records(content: &str) -> Result<Vec<InputRecord>, ReportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReportError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let index = HeaderIndex::resolve(&headers)?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReportError::Csv(e.to_string()))?;
        records.push(InputRecord {
            page: record.get(index.page).unwrap_or("").to_string(),
            text: record.get(index.text).unwrap_or("").to_string(),
        });
    }

    log::debug!("parsed {} input rows (headers: {:?})", records.len(), headers);
    Ok(records)
}

/// Column positions of the two required fields.
struct HeaderIndex {
    page: usize,
    text: usize,
}

impl HeaderIndex {
    fn resolve(headers: &[String]) -> Result<Self, ReportError> {
        let page = headers
            .iter()
            .position(|h| h == PAGE_HEADER)
            .or_else(|| {
                headers
                    .iter()
                    .position(|h| h.strip_prefix(BOM) == Some(PAGE_HEADER))
            });
        let text = headers.iter().position(|h| h == TEXT_HEADER);

        match (page, text) {
            (Some(page), Some(text)) => Ok(Self { page, text }),
            _ => Err(ReportError::Schema {
                found: headers.to_vec(),
            }),
        }
    }
}
