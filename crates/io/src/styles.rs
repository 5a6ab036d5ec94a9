//! Cell formats (`xl/styles.xml`) for written date cells
//!
//! A date is stored as a serial number; only the cell's number format makes
//! a spreadsheet show it as a date. A date written into the template gets a
//! copy of its cell's existing format with a built-in date number format,
//! appended to `cellXfs`. Existing formats are never changed, so every other
//! cell keeps the exact style it had.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use revsheet_engine::ReportError;

use crate::sheet_xml::{write, xml_error};

pub const STYLES_PART: &str = "xl/styles.xml";

/// Which built-in number format a written date uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateKind {
    Date,
    DateTime,
    Time,
}

impl DateKind {
    /// Whole serials are dates, a fraction below 1 is a time of day.
    pub fn of(serial: f64) -> Self {
        let has_date = serial.floor() > 0.0;
        let has_time = serial.fract().abs() > 0.0001;
        match (has_date, has_time) {
            (true, true) => Self::DateTime,
            (false, true) => Self::Time,
            _ => Self::Date,
        }
    }

    /// 14 `m/d/yyyy`, 22 `m/d/yyyy h:mm`, 21 `h:mm:ss`.
    fn num_fmt_id(self) -> &'static [u8] {
        match self {
            Self::Date => b"14",
            Self::DateTime => b"22",
            Self::Time => b"21",
        }
    }
}

/// One `<xf>` of `cellXfs`: raw attributes plus raw child markup.
#[derive(Debug, Clone, PartialEq)]
struct CellFormat {
    attrs: Vec<(Vec<u8>, Vec<u8>)>,
    inner: Vec<u8>,
}

impl CellFormat {
    fn from_start(e: &BytesStart<'_>) -> Self {
        Self {
            attrs: e
                .attributes()
                .flatten()
                .map(|a| (a.key.as_ref().to_vec(), a.value.into_owned()))
                .collect(),
            inner: Vec::new(),
        }
    }

    fn plain() -> Self {
        let attrs = ["numFmtId", "fontId", "fillId", "borderId", "xfId"]
            .iter()
            .map(|k| (k.as_bytes().to_vec(), b"0".to_vec()))
            .collect();
        Self {
            attrs,
            inner: Vec::new(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_vec(),
            None => self.attrs.push((key.to_vec(), value.to_vec())),
        }
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ReportError> {
        let mut start = BytesStart::new("xf");
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_slice(), v.as_slice()));
        }
        if self.inner.is_empty() {
            return write(writer, Event::Empty(start));
        }
        write(writer, Event::Start(start))?;
        writer.get_mut().extend_from_slice(&self.inner);
        write(writer, Event::End(BytesEnd::new("xf")))
    }
}

/// `<xf>` being read, with its children copied verbatim.
struct OpenFormat {
    format: CellFormat,
    inner: Writer<Vec<u8>>,
    depth: usize,
}

/// The `cellXfs` table of a template plus the date formats added to it.
#[derive(Debug)]
pub struct CellStyles {
    formats: Vec<CellFormat>,
    added: Vec<CellFormat>,
    date_formats: HashMap<(Option<u32>, DateKind), u32>,
}

impl CellStyles {
    /// Read `cellXfs` from a styles part. `None` when the part has no
    /// `cellXfs`, in which case there is nothing to extend.
    pub fn parse(xml: &str) -> Result<Option<Self>, ReportError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        let mut found = false;
        let mut in_cell_xfs = false;
        let mut formats = Vec::new();
        let mut open: Option<OpenFormat> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| xml_error("styles", e))?;

            if let Some(current) = open.as_mut() {
                let closes = matches!(event, Event::End(_)) && current.depth == 0;
                if !closes {
                    match &event {
                        Event::Start(_) => current.depth += 1,
                        Event::End(_) => current.depth -= 1,
                        Event::Eof => {
                            return Err(ReportError::Package("styles XML ends inside <xf>".into()))
                        }
                        _ => {}
                    }
                    write(&mut current.inner, event)?;
                    buf.clear();
                    continue;
                }
            }

            match event {
                Event::Eof => break,
                Event::End(_) if open.is_some() => {
                    if let Some(OpenFormat { mut format, inner, .. }) = open.take() {
                        format.inner = inner.into_inner();
                        formats.push(format);
                    }
                }
                Event::Start(e) if e.name().as_ref() == b"cellXfs" => {
                    found = true;
                    in_cell_xfs = true;
                }
                Event::Empty(e) if e.name().as_ref() == b"cellXfs" => found = true,
                Event::End(e) if e.name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Empty(e) if in_cell_xfs && e.name().as_ref() == b"xf" => {
                    formats.push(CellFormat::from_start(&e));
                }
                Event::Start(e) if in_cell_xfs && e.name().as_ref() == b"xf" => {
                    open = Some(OpenFormat {
                        format: CellFormat::from_start(&e),
                        inner: Writer::new(Vec::new()),
                        depth: 0,
                    });
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(found.then(|| Self {
            formats,
            added: Vec::new(),
            date_formats: HashMap::new(),
        }))
    }

    /// Index of a format that looks like `base` but shows `kind`. Missing or
    /// out-of-range bases copy the default format (index 0).
    pub fn date_style(&mut self, base: Option<u32>, kind: DateKind) -> u32 {
        if let Some(&index) = self.date_formats.get(&(base, kind)) {
            return index;
        }

        let mut format = base
            .and_then(|i| self.formats.get(i as usize))
            .or_else(|| self.formats.first())
            .cloned()
            .unwrap_or_else(CellFormat::plain);
        format.set(b"numFmtId", kind.num_fmt_id());
        format.set(b"applyNumberFormat", b"1");

        let index = (self.formats.len() + self.added.len()) as u32;
        self.added.push(format);
        self.date_formats.insert((base, kind), index);
        index
    }

    pub fn is_modified(&self) -> bool {
        !self.added.is_empty()
    }

    /// Rewrite the styles part with the added formats appended to `cellXfs`.
    pub fn apply(&self, xml: &str) -> Result<String, ReportError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(xml.len() + self.added.len() * 96));
        let mut buf = Vec::new();
        let count = (self.formats.len() + self.added.len()).to_string();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| xml_error("styles", e))?;
            match event {
                Event::Eof => break,
                Event::Start(e) if e.name().as_ref() == b"cellXfs" => {
                    write(&mut writer, Event::Start(with_count(&e, &count)))?;
                }
                Event::Empty(e) if e.name().as_ref() == b"cellXfs" => {
                    write(&mut writer, Event::Start(with_count(&e, &count)))?;
                    self.write_added(&mut writer)?;
                    write(&mut writer, Event::End(BytesEnd::new("cellXfs")))?;
                }
                Event::End(e) if e.name().as_ref() == b"cellXfs" => {
                    self.write_added(&mut writer)?;
                    write(&mut writer, Event::End(e))?;
                }
                other => write(&mut writer, other)?,
            }
            buf.clear();
        }

        String::from_utf8(writer.into_inner())
            .map_err(|_| ReportError::Package("rewritten styles are not UTF-8".into()))
    }

    fn write_added(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ReportError> {
        for format in &self.added {
            format.write_to(writer)?;
        }
        Ok(())
    }
}

fn with_count(e: &BytesStart<'_>, count: &str) -> BytesStart<'static> {
    let mut start = BytesStart::new("cellXfs");
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"count" {
            start.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    start.push_attribute(("count", count));
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd"/></numFmts><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="1" xfId="0" applyBorder="1"><alignment wrapText="1"/></xf></cellXfs></styleSheet>"#;

    #[test]
    fn date_kind_follows_the_serial() {
        assert_eq!(DateKind::of(45352.0), DateKind::Date);
        assert_eq!(DateKind::of(45352.5), DateKind::DateTime);
        assert_eq!(DateKind::of(0.25), DateKind::Time);
    }

    #[test]
    fn date_format_copies_base_and_is_appended() {
        let mut styles = CellStyles::parse(STYLES).unwrap().unwrap();
        assert!(!styles.is_modified());

        assert_eq!(styles.date_style(Some(1), DateKind::Date), 2);
        assert_eq!(styles.date_style(Some(1), DateKind::Date), 2);
        assert_eq!(styles.date_style(None, DateKind::DateTime), 3);
        assert!(styles.is_modified());

        let out = styles.apply(STYLES).unwrap();
        assert!(out.contains(r#"<cellXfs count="4">"#), "{out}");
        assert!(out.contains(
            r#"<xf numFmtId="14" fontId="1" fillId="0" borderId="1" xfId="0" applyBorder="1" applyNumberFormat="1"><alignment wrapText="1"/></xf>"#
        ));
        assert!(out.contains(
            r#"<xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs>"#
        ));
        // untouched sections survive
        assert!(out.contains(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#));
        assert!(out.contains(r#"formatCode="yyyy-mm-dd""#));
    }

    #[test]
    fn styles_without_cell_formats_are_not_extended() {
        assert!(CellStyles::parse("<styleSheet/>").unwrap().is_none());
    }
}
