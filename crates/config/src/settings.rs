// User settings (settings.json)
//
// Flat dotted keys like "paths.template", plus a nested "layout" object.
// Lines starting with // are comments and are stripped before parsing.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use revsheet_engine::{SheetLayout, StatusTokens};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum SettingsError {
    Read { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    Write { path: PathBuf, message: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Read { path, message } => {
                write!(f, "cannot read {}: {}", path.display(), message)
            }
            SettingsError::Parse { path, message } => {
                write!(f, "invalid settings in {}: {}", path.display(), message)
            }
            SettingsError::Write { path, message } => {
                write!(f, "cannot write {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Paths
    #[serde(rename = "paths.inputDir")]
    pub input_dir: PathBuf,

    #[serde(rename = "paths.outputDir")]
    pub output_dir: PathBuf,

    #[serde(rename = "paths.template")]
    pub template: PathBuf,

    // Revision tag for new rows when none is given on the command line
    #[serde(rename = "revision.default")]
    pub default_revision: Option<String>,

    // Input
    #[serde(rename = "input.encoding")]
    pub encoding: String,

    // Filter
    #[serde(rename = "filter.extraStatusTokens")]
    pub extra_status_tokens: Vec<String>,

    // Sheet layout
    #[serde(rename = "layout")]
    pub layout: SheetLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            template: PathBuf::from("output/comment_response_template.xlsx"),
            default_revision: None,
            encoding: "utf-8".to_string(),
            extra_status_tokens: Vec::new(),
            layout: SheetLayout::default(),
        }
    }
}

/// Written by `revsheet config init`. Must parse to `Settings::default()`.
pub const DEFAULT_SETTINGS_JSON: &str = r#"{
    // Where batch mode looks for *.csv files and writes reports
    "paths.inputDir": "input",
    "paths.outputDir": "output",

    // Report template (create one with `revsheet init-template`)
    "paths.template": "output/comment_response_template.xlsx",

    // Revision tag written on new rows, e.g. "B" (null = none)
    "revision.default": null,

    // "utf-8" or "windows-1252"
    "input.encoding": "utf-8",

    // Comment texts treated as status markers in addition to
    // closed / close / open / opened
    "filter.extraStatusTokens": [],

    // 1-based rows and columns of the report sheet
    "layout": {
        "titleRow": 1,
        "headerRow": 2,
        "dataStartRow": 3,
        "sequenceColumn": 1,
        "revisionColumn": 2,
        "pageColumn": 3,
        "commentColumn": 4
    }
}
"#;

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("revsheet");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from `path`. Unlike `load`, any problem is an error.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&strip_comments(&contents)).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the commented default file. Refuses to overwrite unless `force`.
    pub fn write_default_file(path: &Path, force: bool) -> Result<(), SettingsError> {
        if path.exists() && !force {
            return Err(SettingsError::Write {
                path: path.to_path_buf(),
                message: "file already exists".to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SettingsError::Write {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            }
        }
        fs::write(path, DEFAULT_SETTINGS_JSON).map_err(|e| SettingsError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Default status tokens plus `filter.extraStatusTokens`.
    pub fn status_tokens(&self) -> StatusTokens {
        StatusTokens::with_extra(&self.extra_status_tokens)
    }
}

fn strip_comments(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}
