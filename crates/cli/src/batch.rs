// Batch mode: one report per *.csv in a directory
//
// Fatal before any file is touched: missing template, missing or empty
// input directory. After that, a failing file is reported and the run
// moves on to the next one unless --fail-fast is set.

use std::path::{Path, PathBuf};

use glob::MatchOptions;
use revsheet_engine::ReportError;
use revsheet_io::{transform, InputSource, TransformOptions};

use crate::exit_codes::EXIT_BATCH_PARTIAL;
use crate::{report_file_name, CliError};

pub struct BatchArgs {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template: PathBuf,
    pub options: TransformOptions,
    pub fail_fast: bool,
    pub quiet: bool,
}

pub fn cmd_batch(args: BatchArgs) -> Result<(), CliError> {
    if !args.template.is_file() {
        return Err(CliError::report(ReportError::TemplateMissing(args.template)));
    }

    let inputs = discover_inputs(&args.input_dir)?;
    if inputs.is_empty() {
        return Err(CliError::general(format!(
            "no CSV files found in {}",
            args.input_dir.display()
        ))
        .with_hint("put comment exports (*.csv) there or pass --input-dir"));
    }
    log::debug!("batch: {} inputs in {}", inputs.len(), args.input_dir.display());

    let mut failed = 0usize;
    for input in &inputs {
        let output = args.output_dir.join(report_file_name(input));
        match convert_one(input, &output, &args) {
            Ok(rows) => {
                if !args.quiet {
                    println!("Created {} ({} rows)", output.display(), rows);
                }
            }
            Err(err) => {
                failed += 1;
                if args.fail_fast {
                    return Err(CliError::report(err)
                        .with_hint(format!("while processing {}", input.display())));
                }
                eprintln!("error: {}: {}", input.display(), err);
            }
        }
    }

    if failed > 0 {
        return Err(CliError {
            code: EXIT_BATCH_PARTIAL,
            message: format!("{} of {} files failed", failed, inputs.len()),
            hint: None,
        });
    }
    if !args.quiet {
        println!("Converted {} files", inputs.len());
    }
    Ok(())
}

fn convert_one(input: &Path, output: &Path, args: &BatchArgs) -> Result<usize, ReportError> {
    let (document, summary) = transform(
        InputSource::Path(input.to_path_buf()),
        &args.template,
        None,
        &args.options,
    )?;
    document.save(output)?;
    Ok(summary.total_rows)
}

/// `*.csv` files directly in `dir`, any extension case, sorted by name.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    if !dir.is_dir() {
        return Err(CliError::io(format!("input directory not found: {}", dir.display()))
            .with_hint("create it or pass --input-dir"));
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped).join("*.csv").to_string_lossy().to_string();
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut inputs: Vec<PathBuf> = glob::glob_with(&pattern, options)
        .map_err(|e| CliError::args(format!("bad input directory pattern: {}", e)))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    inputs.sort();
    Ok(inputs)
}
