//! `validate` command
//!
//! Loads each configuration file through the normal pipeline and reports
//! errors and warnings without starting any timers.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{ConfigLoader, LoadResult};
use crate::error::{ConfigError, CountdownError, Severity, ValidationIssue};

/// Outcome for one file.
#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    timers: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validate configuration files.
///
/// # Errors
///
/// Returns the first file's error if any file is invalid (or, with
/// `--strict`, has warnings).
pub fn run(args: &ValidateArgs) -> Result<(), CountdownError> {
    let loader = ConfigLoader::with_defaults();
    let mut first_failure = None;
    let mut reports = Vec::with_capacity(args.files.len());

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let (report, failure) = check(&loader, path, args.strict);
        if first_failure.is_none() {
            first_failure = failure;
        }
        reports.push(report);
    }

    match args.format {
        OutputFormat::Human => {
            for report in &reports {
                print_human(report);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    first_failure.map_or(Ok(()), |err| Err(err.into()))
}

fn check(loader: &ConfigLoader, path: &Path, strict: bool) -> (FileReport, Option<ConfigError>) {
    let file = path.display().to_string();
    match loader.load(path) {
        Ok(LoadResult { timers, warnings }) => {
            let warnings: Vec<String> = warnings.iter().map(ToString::to_string).collect();
            let failure = (strict && !warnings.is_empty()).then(|| ConfigError::ValidationError {
                path: file.clone(),
                errors: warnings
                    .iter()
                    .map(|w| ValidationIssue {
                        path: file.clone(),
                        message: w.clone(),
                        severity: Severity::Error,
                    })
                    .collect(),
            });
            let report = FileReport {
                file,
                valid: failure.is_none(),
                timers: timers.len(),
                errors: Vec::new(),
                warnings,
            };
            (report, failure)
        }
        Err(err) => {
            let errors = match &err {
                ConfigError::ValidationError { errors, .. } => {
                    errors.iter().map(ToString::to_string).collect()
                }
                other => vec![other.to_string()],
            };
            let report = FileReport {
                file,
                valid: false,
                timers: 0,
                errors,
                warnings: Vec::new(),
            };
            (report, Some(err))
        }
    }
}

fn print_human(report: &FileReport) {
    if report.valid {
        println!("{}: ok ({} timers)", report.file, report.timers);
    } else {
        println!("{}: invalid", report.file);
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
}
