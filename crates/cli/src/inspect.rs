// inspect: print a report's data region the way the next revision reads it

use std::path::Path;

use revsheet_config::Settings;
use revsheet_engine::CellValue;
use revsheet_io::{load_previous_report, PreviousRevision};
use serde::Serialize;

use crate::CliError;

#[derive(Serialize)]
struct InspectOutput<'a> {
    file: String,
    headers: &'a [String],
    row_count: usize,
    rows: &'a [Vec<CellValue>],
}

pub fn cmd_inspect(settings: &Settings, file: &Path, json: bool) -> Result<(), CliError> {
    if !file.is_file() {
        return Err(CliError::io(format!("file not found: {}", file.display())));
    }

    let report = load_previous_report(PreviousRevision::Path(file.to_path_buf()), &settings.layout)?;

    if json {
        let output = InspectOutput {
            file: file.display().to_string(),
            headers: &report.headers,
            row_count: report.rows.len(),
            rows: &report.rows,
        };
        let text = serde_json::to_string_pretty(&output).map_err(|e| CliError::io(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}  ({} rows)", file.display(), report.rows.len());
    if !report.headers.is_empty() {
        println!("{}", report.headers.join(" | "));
    }
    for row in &report.rows {
        let cells: Vec<String> = row.iter().map(|c| truncate(&c.raw_display(), 60)).collect();
        println!("{}", cells.join(" | "));
    }
    Ok(())
}

/// Single-line, at most `max` characters.
fn truncate(text: &str, max: usize) -> String {
    let line = text.replace('\n', " ");
    if line.chars().count() <= max {
        line
    } else {
        let mut cut: String = line.chars().take(max - 1).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_flattens_and_shortens() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("two\nlines", 20), "two lines");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
