//! Worksheet XML patching - in-place cell assignment
//!
//! Streams a worksheet part through quick-xml and assigns values at a set of
//! (row, column) positions. Everything else in the part is re-emitted event
//! for event, so template formatting, merged ranges, column widths, data
//! validations and untouched cells survive.
//!
//! Key invariants:
//! - An overwritten cell keeps its style index (`s`) and loses its old value
//!   and formula
//! - Followers of a shared formula whose master is overwritten get their own
//!   plain formula, so none is left pointing at a missing master
//! - Missing rows and cells are inserted in sorted position
//! - No rows or columns are inserted or shifted; only cell content changes
//! - Text goes in as inline strings, so the shared-string table is untouched
//!
//! All row and column numbers here are 1-based.

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::{BytesEnd, BytesRef, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use revsheet_engine::cell::format_number;
use revsheet_engine::{CellValue, ReportError};

use crate::styles::{CellStyles, DateKind};

/// Cell assignments keyed by (row, column).
pub type CellWrites = BTreeMap<(u32, u32), CellValue>;

type RowWrites<'a> = BTreeMap<u32, &'a CellValue>;

// =============================================================================
// Cell references
// =============================================================================

/// "C12" → (12, 3). Returns None for malformed references.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut seen_digit = false;

    for ch in cell_ref.chars() {
        if ch == '$' {
            continue;
        }
        if ch.is_ascii_alphabetic() && !seen_digit {
            col = col
                .checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        } else if ch.is_ascii_digit() {
            seen_digit = true;
            row = row.checked_mul(10)?.checked_add(ch as u32 - '0' as u32)?;
        } else {
            return None;
        }
    }

    if col == 0 || row == 0 {
        None
    } else {
        Some((row, col))
    }
}

/// 1 → "A", 27 → "AA".
pub fn column_letters(mut col: u32) -> String {
    let mut result = String::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        result.insert(0, (b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    result
}

pub fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

// =============================================================================
// Patching
// =============================================================================

/// Rewrite `xml` so every position in `writes` holds its new value.
///
/// Date values take a date format from `styles`; without a style table they
/// are written as plain numbers in the cell's existing style.
pub fn patch_cells(
    xml: &str,
    writes: &CellWrites,
    styles: Option<&mut CellStyles>,
) -> Result<String, ReportError> {
    let mut styles = styles;
    let mut pending: BTreeMap<u32, RowWrites> = BTreeMap::new();
    for (&(row, col), value) in writes {
        pending.entry(row).or_default().insert(col, value);
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + writes.len() * 64));
    let mut buf = Vec::new();

    let mut in_sheet_data = false;
    let mut current_row: Option<u32> = None;
    let mut row_cells: RowWrites = BTreeMap::new();
    let mut last_row = 0u32;
    let mut last_col = 0u32;
    // Depth inside an overwritten <c> element being dropped.
    let mut skip_depth = 0usize;
    let mut skipped_cell = (0u32, 0u32);
    let mut shared = SharedFormulas::new()?;
    // Formula text of a dropped shared master, keyed by its `si`.
    let mut master: Option<(Vec<u8>, String)> = None;
    // Position of the untouched cell being copied, for follower rewrites.
    let mut copied_cell: Option<(u32, u32)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error("worksheet", e))?;

        if skip_depth > 0 {
            match &event {
                Event::Start(e) => {
                    if skip_depth == 1 && e.name().as_ref() == b"f" {
                        master = shared_master_index(e).map(|si| (si, String::new()));
                    }
                    skip_depth += 1;
                }
                Event::Text(t) => {
                    if let Some((_, text)) = master.as_mut() {
                        text.push_str(&t.decode().map_err(|e| ReportError::Package(e.to_string()))?);
                    }
                }
                Event::GeneralRef(r) => {
                    if let Some((_, text)) = master.as_mut() {
                        text.push(resolve_entity(r)?);
                    }
                }
                Event::End(e) => {
                    skip_depth -= 1;
                    if e.name().as_ref() == b"f" {
                        if let Some((si, text)) = master.take() {
                            shared.orphan(si, skipped_cell, text);
                        }
                    }
                }
                Event::Eof => return Err(ReportError::Package("worksheet XML ends inside a cell".into())),
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,

            Event::Empty(e) if e.name().as_ref() == b"dimension" => {
                let patched = widen_dimension(&e, writes);
                write(&mut writer, Event::Empty(patched))?;
            }

            Event::Start(e) if e.name().as_ref() == b"sheetData" => {
                in_sheet_data = true;
                write(&mut writer, Event::Start(e))?;
            }
            Event::Empty(e) if e.name().as_ref() == b"sheetData" => {
                write(&mut writer, Event::Start(e))?;
                flush_rows_before(&mut writer, &mut styles, &mut pending, u32::MAX)?;
                write(&mut writer, Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(e) if e.name().as_ref() == b"sheetData" => {
                flush_rows_before(&mut writer, &mut styles, &mut pending, u32::MAX)?;
                in_sheet_data = false;
                write(&mut writer, Event::End(e))?;
            }

            Event::Start(e) if in_sheet_data && e.name().as_ref() == b"row" => {
                let row = row_number(&e).unwrap_or(last_row + 1);
                last_row = row;
                last_col = 0;
                flush_rows_before(&mut writer, &mut styles, &mut pending, row)?;

                current_row = Some(row);
                match pending.remove(&row) {
                    Some(cells) => {
                        row_cells = cells;
                        write(&mut writer, Event::Start(strip_spans(&e)))?;
                    }
                    None => {
                        row_cells.clear();
                        write(&mut writer, Event::Start(e))?;
                    }
                }
            }
            Event::Empty(e) if in_sheet_data && e.name().as_ref() == b"row" => {
                let row = row_number(&e).unwrap_or(last_row + 1);
                last_row = row;
                flush_rows_before(&mut writer, &mut styles, &mut pending, row)?;

                match pending.remove(&row) {
                    Some(cells) => {
                        write(&mut writer, Event::Start(strip_spans(&e)))?;
                        for (col, value) in cells {
                            write_cell(&mut writer, &mut styles, row, col, None, value)?;
                        }
                        write(&mut writer, Event::End(BytesEnd::new("row")))?;
                    }
                    None => write(&mut writer, Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.name().as_ref() == b"row" => {
                if let Some(row) = current_row.take() {
                    for (col, value) in std::mem::take(&mut row_cells) {
                        write_cell(&mut writer, &mut styles, row, col, None, value)?;
                    }
                }
                write(&mut writer, Event::End(e))?;
            }

            Event::Start(e) if current_row.is_some() && e.name().as_ref() == b"c" => {
                let row = current_row.unwrap_or(last_row);
                let col = cell_column(&e).unwrap_or(last_col + 1);
                last_col = col;
                flush_cells_before(&mut writer, &mut styles, row, &mut row_cells, col)?;

                match row_cells.remove(&col) {
                    Some(value) => {
                        write_cell(&mut writer, &mut styles, row, col, style_attr(&e), value)?;
                        skip_depth = 1;
                        skipped_cell = (row, col);
                    }
                    None => {
                        copied_cell = Some((row, col));
                        write(&mut writer, Event::Start(e))?;
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == b"c" => {
                copied_cell = None;
                write(&mut writer, Event::End(e))?;
            }

            // A follower whose master was dropped becomes a plain formula.
            Event::Empty(e) if e.name().as_ref() == b"f" => match copied_cell
                .and_then(|cell| shared.follower_formula(&e, cell))
            {
                Some(formula) => write_formula(&mut writer, &formula)?,
                None => write(&mut writer, Event::Empty(e))?,
            },
            Event::Start(e) if e.name().as_ref() == b"f" => match copied_cell
                .and_then(|cell| shared.follower_formula(&e, cell))
            {
                Some(formula) => {
                    write_formula(&mut writer, &formula)?;
                    // drop the follower's own (empty) body
                    skip_depth = 1;
                }
                None => write(&mut writer, Event::Start(e))?,
            },
            Event::Empty(e) if current_row.is_some() && e.name().as_ref() == b"c" => {
                let row = current_row.unwrap_or(last_row);
                let col = cell_column(&e).unwrap_or(last_col + 1);
                last_col = col;
                flush_cells_before(&mut writer, &mut styles, row, &mut row_cells, col)?;

                match row_cells.remove(&col) {
                    Some(value) => write_cell(&mut writer, &mut styles, row, col, style_attr(&e), value)?,
                    None => write(&mut writer, Event::Empty(e))?,
                }
            }

            other => write(&mut writer, other)?,
        }
        buf.clear();
    }

    if !pending.is_empty() {
        return Err(ReportError::Package("worksheet has no <sheetData> element".into()));
    }

    String::from_utf8(writer.into_inner())
        .map_err(|_| ReportError::Package("patched worksheet is not UTF-8".into()))
}

pub(crate) fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ReportError> {
    writer
        .write_event(event)
        .map_err(|e| ReportError::Package(format!("XML write: {}", e)))
}

pub(crate) fn xml_error(part: &str, err: quick_xml::Error) -> ReportError {
    ReportError::Package(format!("{} XML: {}", part, err))
}

/// Emit every pending row numbered below `limit`, in order.
fn flush_rows_before(
    writer: &mut Writer<Vec<u8>>,
    styles: &mut Option<&mut CellStyles>,
    pending: &mut BTreeMap<u32, RowWrites>,
    limit: u32,
) -> Result<(), ReportError> {
    let rest = match limit {
        u32::MAX => BTreeMap::new(),
        _ => pending.split_off(&limit),
    };
    let ready = std::mem::replace(pending, rest);

    for (row, cells) in ready {
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", row.to_string().as_str()));
        write(writer, Event::Start(start))?;
        for (col, value) in cells {
            write_cell(writer, styles, row, col, None, value)?;
        }
        write(writer, Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

/// Emit pending cells of the current row that sort before `col`.
fn flush_cells_before(
    writer: &mut Writer<Vec<u8>>,
    styles: &mut Option<&mut CellStyles>,
    row: u32,
    row_cells: &mut RowWrites,
    col: u32,
) -> Result<(), ReportError> {
    let rest = row_cells.split_off(&col);
    let ready = std::mem::replace(row_cells, rest);
    for (c, value) in ready {
        write_cell(writer, styles, row, c, None, value)?;
    }
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    styles: &mut Option<&mut CellStyles>,
    row: u32,
    col: u32,
    style: Option<Vec<u8>>,
    value: &CellValue,
) -> Result<(), ReportError> {
    let style = match (displayed_date(value), styles.as_deref_mut()) {
        (Some(serial), Some(table)) => {
            let base = style
                .as_deref()
                .and_then(|s| std::str::from_utf8(s).ok())
                .and_then(|s| s.parse().ok());
            Some(table.date_style(base, DateKind::of(serial)).to_string().into_bytes())
        }
        _ => style,
    };

    let reference = cell_reference(row, col);
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = &style {
        start.push_attribute((&b"s"[..], style.as_slice()));
    }

    match value {
        CellValue::Empty => write(writer, Event::Empty(start)),
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            write(writer, Event::Start(start))?;
            write(writer, Event::Start(BytesStart::new("is")))?;

            let cleaned = strip_invalid_xml_chars(text);
            let mut t = BytesStart::new("t");
            if needs_space_preserve(&cleaned) {
                t.push_attribute(("xml:space", "preserve"));
            }
            write(writer, Event::Start(t))?;
            write(writer, Event::Text(BytesText::new(&cleaned)))?;
            write(writer, Event::End(BytesEnd::new("t")))?;

            write(writer, Event::End(BytesEnd::new("is")))?;
            write(writer, Event::End(BytesEnd::new("c")))
        }
        CellValue::Formula { text, cached } => {
            let cached = cached_value(cached);
            if let Some(kind) = cached.kind {
                start.push_attribute(("t", kind));
            }
            write(writer, Event::Start(start))?;
            write_formula(writer, text)?;
            if let Some(v) = &cached.value {
                write(writer, Event::Start(BytesStart::new("v")))?;
                write(writer, Event::Text(BytesText::new(v)))?;
                write(writer, Event::End(BytesEnd::new("v")))?;
            }
            write(writer, Event::End(BytesEnd::new("c")))
        }
        other => {
            let cached = cached_value(other);
            if let Some(kind) = cached.kind {
                start.push_attribute(("t", kind));
            }
            match &cached.value {
                Some(v) => write_value_cell(writer, start, v),
                None => write(writer, Event::Empty(start)),
            }
        }
    }
}

/// `t` attribute and `<v>` text of a plain value.
struct StoredValue {
    kind: Option<&'static str>,
    value: Option<String>,
}

fn cached_value(value: &CellValue) -> StoredValue {
    let stored = |kind, value: String| StoredValue {
        kind,
        value: Some(value),
    };
    match value {
        CellValue::Empty => StoredValue {
            kind: None,
            value: None,
        },
        CellValue::Number(n) | CellValue::Date(n) if n.is_finite() => stored(None, format_number(*n)),
        CellValue::Number(_) | CellValue::Date(_) => stored(Some("e"), "#NUM!".to_string()),
        // formula results that are text live in <v> with t="str"
        CellValue::Text(text) => stored(Some("str"), strip_invalid_xml_chars(text)),
        CellValue::Bool(b) => stored(Some("b"), (if *b { "1" } else { "0" }).to_string()),
        CellValue::Error(code) => stored(Some("e"), code.clone()),
        CellValue::Formula { cached, .. } => cached_value(cached),
    }
}

/// Serial of a value that should display as a date.
fn displayed_date(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Date(serial) => Some(*serial),
        CellValue::Formula { cached, .. } => displayed_date(cached),
        _ => None,
    }
}

fn write_formula(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<(), ReportError> {
    let cleaned = strip_invalid_xml_chars(text);
    write(writer, Event::Start(BytesStart::new("f")))?;
    write(writer, Event::Text(BytesText::new(&cleaned)))?;
    write(writer, Event::End(BytesEnd::new("f")))
}

fn write_value_cell(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    value: &str,
) -> Result<(), ReportError> {
    write(writer, Event::Start(start))?;
    write(writer, Event::Start(BytesStart::new("v")))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new("v")))?;
    write(writer, Event::End(BytesEnd::new("c")))
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) || text.contains('\n')
}

/// XML 1.0 forbids most C0 control characters, even escaped.
fn strip_invalid_xml_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| !matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}'))
        .collect()
}

// =============================================================================
// Shared formulas
// =============================================================================

/// Masters of shared formulas (`<f t="shared" ref=".." si="N">`) that were
/// overwritten. Their followers only carry `si`, so each one is rewritten as
/// a plain formula shifted from the master's position.
struct SharedFormulas {
    orphans: HashMap<Vec<u8>, ((u32, u32), String)>,
    cell_ref: Regex,
}

impl SharedFormulas {
    fn new() -> Result<Self, ReportError> {
        let cell_ref = Regex::new(r"(\$?)([A-Za-z]{1,3})(\$?)(\d+)")
            .map_err(|e| ReportError::Package(format!("formula pattern: {}", e)))?;
        Ok(Self {
            orphans: HashMap::new(),
            cell_ref,
        })
    }

    fn orphan(&mut self, si: Vec<u8>, at: (u32, u32), text: String) {
        self.orphans.insert(si, (at, text));
    }

    /// Plain formula for a follower `<f>` at `cell`, if its master is gone.
    fn follower_formula(&self, e: &BytesStart<'_>, cell: (u32, u32)) -> Option<String> {
        if self.orphans.is_empty() || attr_value(e, b"t").as_deref() != Some(b"shared") {
            return None;
        }
        let si = attr_value(e, b"si")?;
        let ((row, col), text) = self.orphans.get(&si)?;
        let row_delta = i64::from(cell.0) - i64::from(*row);
        let col_delta = i64::from(cell.1) - i64::from(*col);
        Some(shift_formula_refs(&self.cell_ref, text, row_delta, col_delta))
    }
}

/// `si` of a shared-formula master; followers have no `ref`.
fn shared_master_index(e: &BytesStart<'_>) -> Option<Vec<u8>> {
    if attr_value(e, b"t").as_deref() != Some(b"shared") || attr_value(e, b"ref").is_none() {
        return None;
    }
    attr_value(e, b"si")
}

/// Move relative A1 references by the given deltas; `$` anchors stay put.
/// String literals and function names are left alone.
fn shift_formula_refs(pattern: &Regex, formula: &str, row_delta: i64, col_delta: i64) -> String {
    let mut out = String::with_capacity(formula.len());
    for (i, segment) in formula.split('"').enumerate() {
        if i > 0 {
            out.push('"');
        }
        // odd segments sit inside "..."
        if i % 2 == 1 {
            out.push_str(segment);
            continue;
        }
        let mut last = 0;
        for caps in pattern.captures_iter(segment) {
            let Some(whole) = caps.get(0) else { continue };
            let before = segment[..whole.start()].chars().next_back();
            let after = segment[whole.end()..].chars().next();
            let is_name_part = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            if is_name_part(before) || is_name_part(after) || after == Some('(') {
                continue;
            }

            out.push_str(&segment[last..whole.start()]);
            out.push_str(&shift_reference(&caps, row_delta, col_delta));
            last = whole.end();
        }
        out.push_str(&segment[last..]);
    }
    out
}

fn shift_reference(caps: &regex::Captures<'_>, row_delta: i64, col_delta: i64) -> String {
    let col_absolute = &caps[1] == "$";
    let row_absolute = &caps[3] == "$";
    let col = caps[2]
        .chars()
        .fold(0i64, |acc, c| acc * 26 + i64::from(c.to_ascii_uppercase() as u8 - b'A' + 1));
    let row: i64 = caps[4].parse().unwrap_or(1);

    let new_col = if col_absolute { col } else { col + col_delta };
    let new_row = if row_absolute { row } else { row + row_delta };
    if new_col < 1 || new_row < 1 {
        return "#REF!".to_string();
    }

    format!(
        "{}{}{}{}",
        if col_absolute { "$" } else { "" },
        column_letters(new_col as u32),
        if row_absolute { "$" } else { "" },
        new_row
    )
}

fn resolve_entity(r: &BytesRef<'_>) -> Result<char, ReportError> {
    if let Some(c) = r
        .resolve_char_ref()
        .map_err(|e| ReportError::Package(e.to_string()))?
    {
        return Ok(c);
    }
    let name = r.decode().map_err(|e| ReportError::Package(e.to_string()))?;
    match name.as_ref() {
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "amp" => Ok('&'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        other => Err(ReportError::Package(format!("unknown XML entity &{};", other))),
    }
}

// =============================================================================
// Attribute helpers
// =============================================================================

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<Vec<u8>> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| a.value.into_owned())
}

fn row_number(e: &BytesStart<'_>) -> Option<u32> {
    attr_value(e, b"r").and_then(|v| String::from_utf8_lossy(&v).parse().ok())
}

fn cell_column(e: &BytesStart<'_>) -> Option<u32> {
    attr_value(e, b"r")
        .and_then(|v| parse_cell_ref(&String::from_utf8_lossy(&v)))
        .map(|(_, col)| col)
}

fn style_attr(e: &BytesStart<'_>) -> Option<Vec<u8>> {
    attr_value(e, b"s")
}

/// Copy of a `<row>` start tag without its `spans` hint, which may no
/// longer cover the row's cells after patching.
fn strip_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut row = BytesStart::new("row");
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"spans" {
            row.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    row
}

/// Grow `<dimension ref="A1:D4"/>` to include every written cell.
fn widen_dimension(e: &BytesStart<'_>, writes: &CellWrites) -> BytesStart<'static> {
    let current = attr_value(e, b"ref").map(|v| String::from_utf8_lossy(&v).to_string());
    let mut bounds = current.as_deref().and_then(parse_range);

    for &(row, col) in writes.keys() {
        bounds = Some(match bounds {
            None => (row, col, row, col),
            Some((r1, c1, r2, c2)) => (r1.min(row), c1.min(col), r2.max(row), c2.max(col)),
        });
    }

    let mut dim = BytesStart::new("dimension");
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"ref" {
            dim.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    match bounds {
        Some((r1, c1, r2, c2)) => {
            let range = if (r1, c1) == (r2, c2) {
                cell_reference(r1, c1)
            } else {
                format!("{}:{}", cell_reference(r1, c1), cell_reference(r2, c2))
            };
            dim.push_attribute(("ref", range.as_str()));
        }
        None => {
            if let Some(original) = &current {
                dim.push_attribute(("ref", original.as_str()));
            }
        }
    }
    dim
}

/// "A1:D10" → (1, 1, 10, 4); a single reference is a 1x1 range.
fn parse_range(range: &str) -> Option<(u32, u32, u32, u32)> {
    let (start, end) = match range.split_once(':') {
        Some((a, b)) => (a, b),
        None => (range, range),
    };
    let (r1, c1) = parse_cell_ref(start)?;
    let (r2, c2) = parse_cell_ref(end)?;
    Some((r1.min(r2), c1.min(c2), r1.max(r2), c1.max(c2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:E3"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><cols><col min="4" max="4" width="60" customWidth="1"/></cols><sheetData><row r="1" spans="1:4"><c r="A1" s="1" t="s"><v>0</v></c></row><row r="2" spans="1:4"><c r="A2" s="2" t="s"><v>1</v></c><c r="B2" s="2" t="s"><v>2</v></c></row><row r="3" spans="1:5" ht="30" customHeight="1"><c r="A3" s="3"/><c r="B3" s="3"/><c r="D3" s="4"><f>SUM(A1:A2)</f><v>0</v></c><c r="E3" s="5"><v>42</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A1:D1"/></mergeCells></worksheet>"#;

    fn writes(items: &[((u32, u32), CellValue)]) -> CellWrites {
        items.iter().cloned().collect()
    }

    fn patch(xml: &str, writes: &CellWrites) -> Result<String, ReportError> {
        patch_cells(xml, writes, None)
    }

    #[test]
    fn cell_refs_round_trip() {
        assert_eq!(parse_cell_ref("A1"), Some((1, 1)));
        assert_eq!(parse_cell_ref("D12"), Some((12, 4)));
        assert_eq!(parse_cell_ref("AA3"), Some((3, 27)));
        assert_eq!(parse_cell_ref("$B$7"), Some((7, 2)));
        assert_eq!(parse_cell_ref("7B"), None);
        assert_eq!(parse_cell_ref(""), None);
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(703), "AAA");
        assert_eq!(cell_reference(3, 4), "D3");
    }

    #[test]
    fn overwrites_keep_style_and_drop_formula() {
        let out = patch(
            SHEET,
            &writes(&[
                ((3, 1), CellValue::Number(1.0)),
                ((3, 4), CellValue::Text("Needs fix".into())),
            ]),
        )
        .unwrap();

        assert!(out.contains(r#"<c r="A3" s="3"><v>1</v></c>"#), "{out}");
        assert!(out.contains(
            r#"<c r="D3" s="4" t="inlineStr"><is><t>Needs fix</t></is></c>"#
        ));
        assert!(!out.contains("SUM(A1:A2)"));
        // untouched neighbours survive verbatim
        assert!(out.contains(r#"<c r="B3" s="3"/>"#));
        assert!(out.contains(r#"<c r="E3" s="5"><v>42</v></c>"#));
        assert!(out.contains(r#"<mergeCell ref="A1:D1"/>"#));
        assert!(out.contains(r#"<col min="4" max="4" width="60" customWidth="1"/>"#));
    }

    #[test]
    fn patched_row_keeps_height_but_loses_spans() {
        let out = patch(SHEET, &writes(&[((3, 3), CellValue::Text("p1".into()))])).unwrap();
        assert!(out.contains(r#"<row r="3" ht="30" customHeight="1">"#), "{out}");
        assert!(out.contains(r#"<row r="2" spans="1:4">"#));
    }

    #[test]
    fn missing_cells_are_inserted_in_column_order() {
        let out = patch(SHEET, &writes(&[((3, 3), CellValue::Text("p1".into()))])).unwrap();
        let b3 = out.find(r#"<c r="B3""#).unwrap();
        let c3 = out.find(r#"<c r="C3" t="inlineStr">"#).unwrap();
        let d3 = out.find(r#"<c r="D3""#).unwrap();
        assert!(b3 < c3 && c3 < d3, "{out}");
    }

    #[test]
    fn missing_rows_are_inserted_after_existing_ones() {
        let out = patch(
            SHEET,
            &writes(&[
                ((5, 1), CellValue::Number(3.0)),
                ((4, 1), CellValue::Number(2.0)),
                ((4, 2), CellValue::Empty),
            ]),
        )
        .unwrap();

        let row4 = out.find(r#"<row r="4"><c r="A4"><v>2</v></c><c r="B4"/></row>"#).unwrap();
        let row5 = out.find(r#"<row r="5"><c r="A5"><v>3</v></c></row>"#).unwrap();
        let end = out.find("</sheetData>").unwrap();
        assert!(out.find(r#"<row r="3""#).unwrap() < row4);
        assert!(row4 < row5 && row5 < end);
        assert!(out.contains(r#"<dimension ref="A1:E5"/>"#));
    }

    #[test]
    fn empty_value_clears_content_but_keeps_style() {
        let out = patch(SHEET, &writes(&[((3, 5), CellValue::Empty)])).unwrap();
        assert!(out.contains(r#"<c r="E3" s="5"/>"#), "{out}");
        assert!(!out.contains("<v>42</v>"));
    }

    #[test]
    fn text_is_escaped_and_whitespace_preserved() {
        let out = patch(
            SHEET,
            &writes(&[((4, 4), CellValue::Text(" a < b & \"c\"\u{1}".into()))]),
        )
        .unwrap();
        assert!(out.contains(r#"<t xml:space="preserve"> a &lt; b &amp; "#), "{out}");
        assert!(!out.contains('\u{1}'));
    }

    #[test]
    fn booleans_and_errors_use_typed_cells() {
        let out = patch(
            SHEET,
            &writes(&[
                ((4, 5), CellValue::Bool(true)),
                ((4, 6), CellValue::Error("#N/A".into())),
            ]),
        )
        .unwrap();
        assert!(out.contains(r#"<c r="E4" t="b"><v>1</v></c>"#), "{out}");
        assert!(out.contains(r#"<c r="F4" t="e"><v>#N/A</v></c>"#));
    }

    #[test]
    fn empty_sheet_data_gets_rows() {
        let xml = r#"<worksheet><dimension ref="A1"/><sheetData/></worksheet>"#;
        let out = patch(xml, &writes(&[((3, 2), CellValue::Text("B".into()))])).unwrap();
        assert_eq!(
            out,
            r#"<worksheet><dimension ref="A1:B3"/><sheetData><row r="3"><c r="B3" t="inlineStr"><is><t>B</t></is></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn rows_and_cells_without_references_are_positioned_implicitly() {
        let xml = r#"<worksheet><sheetData><row><c t="s"><v>0</v></c></row><row><c s="7"/><c s="8"/></row></sheetData></worksheet>"#;
        let out = patch(xml, &writes(&[((2, 2), CellValue::Number(9.0))])).unwrap();
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row><c t="s"><v>0</v></c></row><row><c s="7"/><c r="B2" s="8"><v>9</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn no_writes_is_identity() {
        let out = patch(SHEET, &CellWrites::new()).unwrap();
        assert_eq!(out, SHEET);
    }

    #[test]
    fn worksheet_without_sheet_data_is_rejected() {
        let err = patch("<worksheet/>", &writes(&[((3, 1), CellValue::Number(1.0))])).unwrap_err();
        assert!(matches!(err, ReportError::Package(_)));
    }

    fn formula(text: &str, cached: CellValue) -> CellValue {
        CellValue::Formula {
            text: text.to_string(),
            cached: Box::new(cached),
        }
    }

    #[test]
    fn formulas_are_written_with_cached_results() {
        let out = patch(
            SHEET,
            &writes(&[
                ((4, 5), formula("LEN(D4)", CellValue::Number(5.0))),
                ((4, 6), formula("IF(A4>0,\"yes\",\"no\")", CellValue::Text("yes".into()))),
                ((4, 7), formula("NA()", CellValue::Error("#N/A".into()))),
            ]),
        )
        .unwrap();
        assert!(out.contains(r#"<c r="E4"><f>LEN(D4)</f><v>5</v></c>"#), "{out}");
        assert!(
            out.contains(r#"<c r="F4" t="str"><f>IF(A4&gt;0,&quot;yes&quot;,&quot;no&quot;)</f><v>yes</v></c>"#),
            "{out}"
        );
        assert!(out.contains(r#"<c r="G4" t="e"><f>NA()</f><v>#N/A</v></c>"#));
    }

    #[test]
    fn dates_without_style_table_stay_numbers() {
        let out = patch(SHEET, &writes(&[((3, 5), CellValue::Date(45352.0))])).unwrap();
        assert!(out.contains(r#"<c r="E3" s="5"><v>45352</v></c>"#), "{out}");
    }

    #[test]
    fn dates_get_a_date_format_copied_from_the_cell_style() {
        let styles_xml = r#"<styleSheet><cellXfs count="6"><xf numFmtId="0"/><xf numFmtId="0"/><xf numFmtId="0"/><xf numFmtId="0"/><xf numFmtId="0"/><xf numFmtId="0" fontId="2"/></cellXfs></styleSheet>"#;
        let mut styles = CellStyles::parse(styles_xml).unwrap().unwrap();
        let out = patch_cells(
            SHEET,
            &writes(&[
                ((3, 5), CellValue::Date(45352.0)),
                ((4, 5), formula("E3+1", CellValue::Date(45353.0))),
            ]),
            Some(&mut styles),
        )
        .unwrap();

        assert!(out.contains(r#"<c r="E3" s="6"><v>45352</v></c>"#), "{out}");
        // a cell without a style copies the default format
        assert!(out.contains(r#"<c r="E4" s="7"><f>E3+1</f><v>45353</v></c>"#), "{out}");
        let rewritten = styles.apply(styles_xml).unwrap();
        assert!(rewritten.contains(r#"<xf numFmtId="14" fontId="2" applyNumberFormat="1"/>"#), "{rewritten}");
    }

    const SHARED: &str = r#"<worksheet><sheetData><row r="3"><c r="A3" s="3"><f t="shared" ref="A3:A6" si="0">ROW()-2</f><v>1</v></c><c r="B3"><f t="shared" ref="B3:B6" si="1">A3*$A$1</f><v>0</v></c></row><row r="4"><c r="A4" s="3"><f t="shared" si="0"/><v>2</v></c><c r="B4"><f t="shared" si="1"/><v>0</v></c></row><row r="5"><c r="A5" s="3"><f t="shared" si="0"/><v>3</v></c><c r="B5"><f t="shared" si="1"/><v>0</v></c></row></sheetData></worksheet>"#;

    #[test]
    fn followers_of_an_overwritten_shared_master_get_plain_formulas() {
        let out = patch(
            SHARED,
            &writes(&[((3, 1), CellValue::Number(1.0)), ((4, 1), CellValue::Number(2.0))]),
        )
        .unwrap();

        assert!(out.contains(r#"<c r="A3" s="3"><v>1</v></c>"#), "{out}");
        assert!(out.contains(r#"<c r="A4" s="3"><v>2</v></c>"#), "{out}");
        assert!(out.contains(r#"<c r="A5" s="3"><f>ROW()-2</f><v>3</v></c>"#), "{out}");
        assert!(!out.contains(r#"si="0""#), "{out}");
        // an untouched shared group is left as it was
        assert!(out.contains(r#"<f t="shared" ref="B3:B6" si="1">A3*$A$1</f>"#));
        assert!(out.contains(r#"<c r="B5"><f t="shared" si="1"/><v>0</v></c>"#));
    }

    #[test]
    fn follower_formulas_shift_relative_references() {
        let out = patch(SHARED, &writes(&[((3, 2), CellValue::Text("x".into()))])).unwrap();
        assert!(out.contains(r#"<c r="B4"><f>A4*$A$1</f><v>0</v></c>"#), "{out}");
        assert!(out.contains(r#"<c r="B5"><f>A5*$A$1</f><v>0</v></c>"#), "{out}");
        assert!(out.contains(r#"<f t="shared" si="0"/>"#));
    }

    #[test]
    fn shifting_skips_strings_and_function_names() {
        let pattern = SharedFormulas::new().unwrap().cell_ref;
        assert_eq!(
            shift_formula_refs(&pattern, r#"IF(B2>0,"B2",LOG10(B2))"#, 2, 1),
            r#"IF(C4>0,"B2",LOG10(C4))"#
        );
        assert_eq!(shift_formula_refs(&pattern, "SUM($A1:A$1)", 1, 1), "SUM($A2:B$1)");
        assert_eq!(shift_formula_refs(&pattern, "A1", -1, 0), "#REF!");
    }
}
