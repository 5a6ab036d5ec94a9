// revsheet CLI - review-comment CSV to XLSX comment-response reports

mod batch;
mod exit_codes;
mod inspect;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use revsheet_config::Settings;
use revsheet_engine::ReportError;
use revsheet_io::template::DEFAULT_TITLE;
use revsheet_io::{
    create_default_template, transform, InputEncoding, InputSource, PreviousRevision,
    TransformOptions,
};

use exit_codes::{report_exit_code, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "revsheet")]
#[command(about = "Turn review-comment CSV exports into XLSX comment-response sheets")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Settings file (default: <config dir>/revsheet/settings.json)
    #[arg(long, global = true, value_name = "FILE", env = "REVSHEET_CONFIG")]
    config: Option<PathBuf>,

    /// Log each pipeline stage
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one comment CSV into a report
    #[command(after_help = "\
Examples:
  revsheet transform input/design-review.csv
  revsheet transform comments.csv -o out/rev-b.xlsx --revision B
  revsheet transform comments.csv --previous out/rev-a.xlsx --revision B
  cat comments.csv | revsheet transform - -o report.xlsx")]
    Transform {
        /// Comment CSV with Page and Text columns ('-' for stdin)
        input: String,

        /// Output file (default: <output dir>/<input name>.xlsx)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Template workbook (default: paths.template)
        #[arg(long, short = 't')]
        template: Option<PathBuf>,

        /// Revision tag written on new rows, e.g. B or 2
        #[arg(long, short = 'r')]
        revision: Option<String>,

        /// Report from the previous revision; its rows are carried forward
        #[arg(long, short = 'p')]
        previous: Option<PathBuf>,

        /// Input encoding: utf-8 or windows-1252
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Convert every *.csv in the input directory
    #[command(after_help = "\
Examples:
  revsheet batch
  revsheet batch --input-dir exports --output-dir reports --revision C
  revsheet batch --fail-fast")]
    Batch {
        /// Directory scanned for *.csv (default: paths.inputDir)
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Directory reports are written to (default: paths.outputDir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Template workbook (default: paths.template)
        #[arg(long, short = 't')]
        template: Option<PathBuf>,

        /// Revision tag written on new rows
        #[arg(long, short = 'r')]
        revision: Option<String>,

        /// Input encoding: utf-8 or windows-1252
        #[arg(long)]
        encoding: Option<String>,

        /// Stop at the first file that fails
        #[arg(long)]
        fail_fast: bool,
    },

    /// Create a blank report template
    #[command(after_help = "\
Examples:
  revsheet init-template
  revsheet init-template templates/crs.xlsx --title \"Design Review 3\"")]
    InitTemplate {
        /// Where to write the template (default: paths.template)
        path: Option<PathBuf>,

        /// Title written in the first row
        #[arg(long, default_value = DEFAULT_TITLE)]
        title: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the data rows of a report, as the next revision would read them
    Inspect {
        /// Report workbook (.xlsx)
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Settings file helpers
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the settings file location
    Path,

    /// Write a commented default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  revsheet-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  revsheet-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else if quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let Some(command) = cli.command else {
        // No subcommand = show help
        eprintln!("Usage: revsheet <command> [options]");
        eprintln!("       revsheet --help for more information");
        return Ok(());
    };

    let settings = match command {
        Commands::Config(cmd) => return cmd_config(cmd, cli.config.as_deref()),
        _ => load_settings(cli.config.as_deref())?,
    };

    match command {
        Commands::Transform {
            input,
            output,
            template,
            revision,
            previous,
            encoding,
        } => cmd_transform(
            &settings, input, output, template, revision, previous, encoding, cli.quiet,
        ),
        Commands::Batch {
            input_dir,
            output_dir,
            template,
            revision,
            encoding,
            fail_fast,
        } => batch::cmd_batch(batch::BatchArgs {
            input_dir: input_dir.unwrap_or_else(|| settings.input_dir.clone()),
            output_dir: output_dir.unwrap_or_else(|| settings.output_dir.clone()),
            template: template.unwrap_or_else(|| settings.template.clone()),
            options: transform_options(&settings, revision, encoding)?,
            fail_fast,
            quiet: cli.quiet,
        }),
        Commands::InitTemplate { path, title, force } => {
            cmd_init_template(&settings, path, &title, force, cli.quiet)
        }
        Commands::Inspect { file, json } => inspect::cmd_inspect(&settings, &file, json),
        Commands::Config(_) => Ok(()),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Create error from a report error with its registry exit code.
    pub fn report(err: ReportError) -> Self {
        let hint = match &err {
            ReportError::Schema { .. } => {
                Some("the first line must name the columns, e.g. Page,Text".to_string())
            }
            ReportError::TemplateMissing(_) => {
                Some("create one with `revsheet init-template` or pass --template".to_string())
            }
            ReportError::Decode(_) => {
                Some("for legacy Excel exports pass --encoding windows-1252".to_string())
            }
            ReportError::Layout(_) => Some("check the \"layout\" object in settings.json".to_string()),
            _ => None,
        };
        Self { code: report_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReportError> for CliError {
    fn from(err: ReportError) -> Self {
        CliError::report(err)
    }
}

// ============================================================================
// Settings
// ============================================================================

fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Settings::load_from(path).map_err(|e| {
            CliError::args(e.to_string()).with_hint("fix the file or run `revsheet config init --force`")
        }),
        None => Ok(Settings::load()),
    }
}

/// Flags win over settings.
fn transform_options(
    settings: &Settings,
    revision: Option<String>,
    encoding: Option<String>,
) -> Result<TransformOptions, CliError> {
    let encoding_name = encoding.unwrap_or_else(|| settings.encoding.clone());
    let encoding = InputEncoding::parse(&encoding_name).ok_or_else(|| {
        CliError::args(format!("unknown encoding '{}'", encoding_name))
            .with_hint("use utf-8 or windows-1252")
    })?;

    let mut options = TransformOptions::new()
        .layout(settings.layout)
        .status_tokens(settings.status_tokens())
        .encoding(encoding);
    if let Some(revision) = revision.or_else(|| settings.default_revision.clone()) {
        options = options.revision(revision);
    }
    Ok(options)
}

// ============================================================================
// transform
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn cmd_transform(
    settings: &Settings,
    input: String,
    output: Option<PathBuf>,
    template: Option<PathBuf>,
    revision: Option<String>,
    previous: Option<PathBuf>,
    encoding: Option<String>,
    quiet: bool,
) -> Result<(), CliError> {
    let options = transform_options(settings, revision, encoding)?;
    let template = template.unwrap_or_else(|| settings.template.clone());

    let (source, output) = if input == "-" {
        let output = output.ok_or_else(|| {
            CliError::args("reading from stdin requires --output")
                .with_hint("revsheet transform - -o report.xlsx")
        })?;
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|e| CliError::io(format!("stdin: {}", e)))?;
        (InputSource::Bytes(bytes), output)
    } else {
        let path = PathBuf::from(&input);
        if !path.is_file() {
            return Err(CliError::io(format!("input not found: {}", path.display())));
        }
        let output = match output {
            Some(output) => output,
            None => settings.output_dir.join(report_file_name(&path)),
        };
        (InputSource::Path(path), output)
    };

    let previous = previous.map(PreviousRevision::Path);
    let (document, summary) = transform(source, &template, previous, &options)?;
    document.save(&output)?;

    if !quiet {
        println!(
            "Created {} ({} rows: {} carried, {} new, {} skipped)",
            output.display(),
            summary.total_rows,
            summary.previous_rows,
            summary.new_rows,
            summary.filtered_out
        );
    }
    Ok(())
}

/// "design-review.csv" → "design-review.xlsx".
pub fn report_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    format!("{}.xlsx", stem)
}

// ============================================================================
// init-template
// ============================================================================

fn cmd_init_template(
    settings: &Settings,
    path: Option<PathBuf>,
    title: &str,
    force: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let path = path.unwrap_or_else(|| settings.template.clone());
    if path.exists() && !force {
        return Err(CliError::args(format!("{} already exists", path.display()))
            .with_hint("pass --force to overwrite"));
    }

    create_default_template(&path, title, &settings.layout)?;
    if !quiet {
        println!("Created {}", path.display());
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn cmd_config(cmd: ConfigCommands, config: Option<&Path>) -> Result<(), CliError> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::config_path);

    match cmd {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => {
            Settings::write_default_file(&path, force).map_err(|e| {
                if path.exists() && !force {
                    CliError::args(e.to_string()).with_hint("pass --force to overwrite")
                } else {
                    CliError::io(e.to_string())
                }
            })?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
