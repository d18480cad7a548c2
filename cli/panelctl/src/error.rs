//! Error handling and display for the CLI.

use colored::Colorize;
use panelist_scheduler::{LedgerError, RegistryError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No availability: {0}")]
    NoAvailability(String),

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NoAvailability(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Widen the date range with --from/--to or check interviewer capacity with `panelctl workload`."
                        .yellow()
                );
            }
            CliError::NotFound(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: List live bookings with `panelctl upcoming`.".yellow()
                );
            }
            _ => {}
        }
        return;
    }

    for cause in err.chain() {
        if let Some(registry_err) = cause.downcast_ref::<RegistryError>() {
            if matches!(registry_err, RegistryError::Io { .. }) {
                eprintln!(
                    "\n{}",
                    "Hint: Point --registry (or PANELIST_REGISTRY) at an interviewer registry file."
                        .yellow()
                );
            }
            return;
        }
        if let Some(LedgerError::Storage(_)) = cause.downcast_ref::<LedgerError>() {
            eprintln!(
                "\n{}",
                "Hint: Check that the --ledger path (or PANELIST_LEDGER) is writable.".yellow()
            );
            return;
        }
    }
}
