//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract - scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | General error (no inputs found, unspecified failure)     |
//! | 2    | Usage error (bad arguments, bad settings or layout)      |
//! | 3    | I/O error (cannot read input, cannot write output)       |
//! | 4    | Input schema error (missing Page/Text, malformed rows)   |
//! | 5    | Template not found                                       |
//! | 6    | Input could not be decoded                               |
//! | 7    | Workbook error (template or previous revision unusable)  |
//! | 8    | Batch finished with at least one failed file             |

use revsheet_engine::ReportError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, invalid settings file or sheet layout.
pub const EXIT_USAGE: u8 = 2;

/// File could not be read or written.
pub const EXIT_IO: u8 = 3;

/// Input lacks the Page/Text header fields, or a row is malformed.
pub const EXIT_SCHEMA: u8 = 4;

/// Template workbook does not exist.
pub const EXIT_TEMPLATE_MISSING: u8 = 5;

/// Input bytes are not valid in the requested encoding.
pub const EXIT_DECODE: u8 = 6;

/// Template or previous revision is not a usable workbook.
pub const EXIT_WORKBOOK: u8 = 7;

/// Batch run completed but some files failed.
pub const EXIT_BATCH_PARTIAL: u8 = 8;

/// Map a ReportError to its exit code.
pub fn report_exit_code(err: &ReportError) -> u8 {
    match err {
        ReportError::Schema { .. } | ReportError::Csv(_) => EXIT_SCHEMA,
        ReportError::TemplateMissing(_) => EXIT_TEMPLATE_MISSING,
        ReportError::Decode(_) => EXIT_DECODE,
        ReportError::Package(_) | ReportError::Workbook(_) => EXIT_WORKBOOK,
        ReportError::Layout(_) => EXIT_USAGE,
        ReportError::Io(_) => EXIT_IO,
    }
}
