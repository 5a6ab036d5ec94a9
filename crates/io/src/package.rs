// XLSX package access: zip entries + workbook part resolution
//
// The whole archive is read into memory once and released; parts are then
// edited as strings and written back in their original order.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use revsheet_engine::ReportError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// In-memory copy of every entry of an XLSX archive.
#[derive(Debug, Clone)]
pub struct XlsxPackage {
    entries: Vec<Entry>,
}

impl XlsxPackage {
    pub fn open(path: &Path) -> Result<Self, ReportError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ReportError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReportError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ReportError::Package(format!("not an XLSX archive: {}", e)))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| ReportError::Package(e.to_string()))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| ReportError::Package(format!("{}: {}", file.name(), e)))?;
            entries.push(Entry {
                name: file.name().to_string(),
                data,
                is_dir: file.is_dir(),
            });
        }

        let package = Self { entries };
        if !package.contains(WORKBOOK_PART) {
            return Err(ReportError::Package(format!("missing {}", WORKBOOK_PART)));
        }
        Ok(package)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter(|e| !e.is_dir).map(|e| e.name.as_str())
    }

    pub fn read_part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Part contents as UTF-8 text (all SpreadsheetML parts are XML).
    pub fn read_xml(&self, name: &str) -> Result<String, ReportError> {
        let data = self
            .read_part(name)
            .ok_or_else(|| ReportError::Package(format!("missing {}", name)))?;
        String::from_utf8(data.to_vec())
            .map_err(|_| ReportError::Package(format!("{} is not UTF-8 XML", name)))
    }

    /// Replace an existing part, or append a new one.
    pub fn write_part(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(Entry {
                name: name.to_string(),
                data,
                is_dir: false,
            }),
        }
    }

    /// Returns true if the part existed.
    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }

    /// Zip path of the worksheet shown when the workbook is opened.
    pub fn active_worksheet_part(&self) -> Result<String, ReportError> {
        let workbook_xml = self.read_xml(WORKBOOK_PART)?;
        let rels_xml = self.read_xml(WORKBOOK_RELS_PART)?;

        let (sheet_rids, active_tab) = parse_workbook_sheets(&workbook_xml)?;
        if sheet_rids.is_empty() {
            return Err(ReportError::Package("workbook contains no sheets".into()));
        }
        let rid = sheet_rids
            .get(active_tab)
            .unwrap_or(&sheet_rids[0]);

        let targets = parse_relationship_targets(&rels_xml)?;
        let target = targets
            .get(rid.as_str())
            .ok_or_else(|| ReportError::Package(format!("no relationship for sheet {}", rid)))?;

        Ok(resolve_part_path("xl", target))
    }

    /// Index of the active sheet among the workbook's `<sheet>` entries.
    pub fn active_sheet_index(&self) -> Result<usize, ReportError> {
        let workbook_xml = self.read_xml(WORKBOOK_PART)?;
        let (sheet_rids, active_tab) = parse_workbook_sheets(&workbook_xml)?;
        Ok(if active_tab < sheet_rids.len() { active_tab } else { 0 })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ReportError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            if entry.is_dir {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .map_err(|e| ReportError::Package(e.to_string()))?;
                continue;
            }
            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| ReportError::Package(e.to_string()))?;
            writer.write_all(&entry.data)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| ReportError::Package(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, bytes)
            .map_err(|e| ReportError::Io(format!("{}: {}", path.display(), e)))
    }
}

/// Sheet relationship ids in tab order, plus `workbookView/@activeTab`.
fn parse_workbook_sheets(workbook_xml: &str) -> Result<(Vec<String>, usize), ReportError> {
    let mut rids = Vec::new();
    let mut active_tab = 0usize;

    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"id" {
                            rids.push(String::from_utf8_lossy(&attr.value).to_string());
                        }
                    }
                }
                b"workbookView" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"activeTab" {
                            active_tab = String::from_utf8_lossy(&attr.value)
                                .parse()
                                .unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReportError::Package(format!("{}: {}", WORKBOOK_PART, e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok((rids, active_tab))
}

/// Relationship id → target, from a `.rels` part.
fn parse_relationship_targets(rels_xml: &str) -> Result<HashMap<String, String>, ReportError> {
    let mut targets = HashMap::new();

    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => target = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReportError::Package(format!("{}: {}", WORKBOOK_RELS_PART, e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// Resolve a relationship target against the directory of its source part.
/// Absolute targets ("/xl/worksheets/sheet1.xml") are package-rooted.
fn resolve_part_path(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
