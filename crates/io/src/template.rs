// Template Filler
//
// A template is an existing XLSX file whose title and header rows are
// already laid out and styled. Filling it assigns the merged rows into the
// data region of the active worksheet and leaves every other part of the
// package alone, so fonts, borders, column widths and print setup come
// through unchanged.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook};
use revsheet_engine::{CellValue, MergedRowSet, ReportError, SheetLayout};

use crate::package::{XlsxPackage, CONTENT_TYPES_PART, WORKBOOK_RELS_PART};
use crate::sheet_xml::{patch_cells, CellWrites};
use crate::styles::{CellStyles, STYLES_PART};

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CALC_CHAIN_REL_SUFFIX: &str = "/calcChain";

/// Header labels of the canonical columns, in sequence/revision/page/comment order.
pub const DEFAULT_HEADERS: [&str; 4] = ["No.", "Rev.", "Page.", "OE/Owner Comment"];
pub const DEFAULT_TITLE: &str = "Comment Response Sheet";

/// A template loaded for a single fill. Never cached between calls.
#[derive(Debug)]
pub struct TemplateDocument {
    path: PathBuf,
    package: XlsxPackage,
}

impl TemplateDocument {
    /// Load the template at `path`. Fails with `TemplateMissing` when the
    /// file does not exist right now.
    pub fn open(path: &Path) -> Result<Self, ReportError> {
        if !path.is_file() {
            return Err(ReportError::TemplateMissing(path.to_path_buf()));
        }
        let package = XlsxPackage::open(path)?;
        log::debug!("loaded template {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            package,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write each merged row at `data_start_row + i`, every carried column
    /// included. Consumes the template; the result is a separate document.
    pub fn fill(self, rows: &MergedRowSet, layout: &SheetLayout) -> Result<OutputDocument, ReportError> {
        let mut package = self.package;
        let sheet_part = package.active_worksheet_part()?;
        let sheet_xml = package.read_xml(&sheet_part)?;

        let mut writes = CellWrites::new();
        for (i, row) in rows.iter().enumerate() {
            let row_number = layout.data_row(i);
            for (c, value) in row.cells.iter().enumerate() {
                writes.insert((row_number, c as u32 + 1), value.clone());
            }
        }

        let mut styles = if writes.values().any(shows_as_date) && package.contains(STYLES_PART) {
            CellStyles::parse(&package.read_xml(STYLES_PART)?)?
        } else {
            None
        };

        let patched = patch_cells(&sheet_xml, &writes, styles.as_mut())?;
        package.write_part(&sheet_part, patched.into_bytes());
        if let Some(styles) = styles.filter(CellStyles::is_modified) {
            let rewritten = styles.apply(&package.read_xml(STYLES_PART)?)?;
            package.write_part(STYLES_PART, rewritten.into_bytes());
        }
        drop_calc_chain(&mut package)?;

        log::debug!(
            "filled {} rows ({} cells) into {}",
            rows.len(),
            writes.len(),
            sheet_part
        );
        Ok(OutputDocument { package })
    }
}

fn shows_as_date(value: &CellValue) -> bool {
    match value {
        CellValue::Date(_) => true,
        CellValue::Formula { cached, .. } => shows_as_date(cached),
        _ => false,
    }
}

/// A filled report, ready to serialize.
#[derive(Debug)]
pub struct OutputDocument {
    package: XlsxPackage,
}

impl OutputDocument {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReportError> {
        self.package.to_bytes()
    }

    /// Write the report to `path`, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.package.save(path)?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

// ============================================================================
// Calculation chain
// ============================================================================

/// Remove the calculation chain so spreadsheet applications rebuild it.
/// Cells we overwrite may have held formulas the chain still lists.
fn drop_calc_chain(package: &mut XlsxPackage) -> Result<(), ReportError> {
    if !package.remove_part(CALC_CHAIN_PART) {
        return Ok(());
    }

    if package.contains(WORKBOOK_RELS_PART) {
        let rels = package.read_xml(WORKBOOK_RELS_PART)?;
        let rels = remove_elements(&rels, b"Relationship", |attrs| {
            attrs
                .iter()
                .any(|(k, v)| k == "Type" && v.ends_with(CALC_CHAIN_REL_SUFFIX))
        })?;
        package.write_part(WORKBOOK_RELS_PART, rels.into_bytes());
    }

    if package.contains(CONTENT_TYPES_PART) {
        let types = package.read_xml(CONTENT_TYPES_PART)?;
        let target = format!("/{}", CALC_CHAIN_PART);
        let types = remove_elements(&types, b"Override", |attrs| {
            attrs.iter().any(|(k, v)| k == "PartName" && *v == target)
        })?;
        package.write_part(CONTENT_TYPES_PART, types.into_bytes());
    }

    log::debug!("dropped {}", CALC_CHAIN_PART);
    Ok(())
}

/// Copy `xml`, leaving out every `name` element whose attributes match.
fn remove_elements<F>(xml: &str, name: &[u8], matches: F) -> Result<String, ReportError>
where
    F: Fn(&[(String, String)]) -> bool,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    let attrs_of = |e: &quick_xml::events::BytesStart<'_>| -> Vec<(String, String)> {
        e.attributes()
            .flatten()
            .map(|a| {
                (
                    String::from_utf8_lossy(a.key.as_ref()).to_string(),
                    String::from_utf8_lossy(&a.value).to_string(),
                )
            })
            .collect()
    };

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ReportError::Package(format!("XML: {}", e)))?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Empty(ref e) if e.name().as_ref() == name && matches(&attrs_of(e)) => {}
            Event::Start(ref e) if e.name().as_ref() == name && matches(&attrs_of(e)) => {
                skip_depth = 1;
            }
            other => writer
                .write_event(other)
                .map_err(|e| ReportError::Package(format!("XML write: {}", e)))?,
        }
        buf.clear();
    }

    String::from_utf8(writer.into_inner())
        .map_err(|_| ReportError::Package("rewritten XML is not UTF-8".into()))
}

// ============================================================================
// Default template
// ============================================================================

/// Scaffold a blank template: merged bold title across the canonical
/// columns, bordered header row, widths sized for comment text.
pub fn create_default_template(path: &Path, title: &str, layout: &SheetLayout) -> Result<(), ReportError> {
    layout.validate()?;

    let xlsx_err = |e: rust_xlsxwriter::XlsxError| ReportError::Workbook(e.to_string());

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Comments").map_err(xlsx_err)?;

    let title_format = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center)
        .set_background_color(rust_xlsxwriter::Color::RGB(0xD9E1F2));

    // rust_xlsxwriter is 0-based
    let columns = layout.canonical_columns();
    let first_col = columns.iter().copied().min().unwrap_or(1) - 1;
    let last_col = layout.canonical_width() - 1;
    let title_row = layout.title_row - 1;

    sheet
        .merge_range(title_row, first_col, title_row, last_col, title, &title_format)
        .map_err(xlsx_err)?;
    sheet.set_row_height(title_row, 24).map_err(xlsx_err)?;

    let widths = [6.0, 6.0, 10.0, 80.0];
    for ((col, label), width) in columns.iter().zip(DEFAULT_HEADERS).zip(widths) {
        sheet
            .write_string_with_format(layout.header_row - 1, col - 1, label, &header_format)
            .map_err(xlsx_err)?;
        sheet.set_column_width(col - 1, width).map_err(xlsx_err)?;
    }
    sheet.set_freeze_panes(layout.header_row, 0).map_err(xlsx_err)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    workbook.save(path).map_err(xlsx_err)?;
    log::info!("created template {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;

    #[test]
    fn calc_chain_relationship_is_removed() {
        let out = remove_elements(RELS, b"Relationship", |attrs| {
            attrs
                .iter()
                .any(|(k, v)| k == "Type" && v.ends_with(CALC_CHAIN_REL_SUFFIX))
        })
        .unwrap();
        assert!(!out.contains("calcChain"));
        assert!(out.contains(r#"Target="worksheets/sheet1.xml""#));
        assert!(out.ends_with("</Relationships>"));
    }

    #[test]
    fn remove_elements_skips_children_of_started_elements() {
        let xml = "<a><b k=\"x\"><c/></b><b k=\"y\"/></a>";
        let out = remove_elements(xml, b"b", |attrs| attrs.iter().any(|(_, v)| v == "x")).unwrap();
        assert_eq!(out, "<a><b k=\"y\"/></a>");
    }

    #[test]
    fn missing_template_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.xlsx");
        let err = TemplateDocument::open(&path).unwrap_err();
        assert_eq!(err, ReportError::TemplateMissing(path));
    }

    #[test]
    fn default_template_opens_as_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/template.xlsx");
        create_default_template(&path, DEFAULT_TITLE, &SheetLayout::default()).unwrap();

        let template = TemplateDocument::open(&path).unwrap();
        assert_eq!(template.path(), path.as_path());
        assert_eq!(
            template.package.active_worksheet_part().unwrap(),
            "xl/worksheets/sheet1.xml"
        );
    }

    #[test]
    fn default_template_rejects_invalid_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SheetLayout {
            page_column: 1,
            ..SheetLayout::default()
        };
        let err = create_default_template(&dir.path().join("t.xlsx"), "T", &layout).unwrap_err();
        assert!(matches!(err, ReportError::Layout(_)));
    }
}
