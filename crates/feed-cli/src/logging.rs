//! Logging initialization, grounded on the teacher's
//! `utils::logging::initialize_logging`: verbosity flags pick a base level,
//! machine-readable (`--json`) output drops the level to `ERROR` so stdout
//! stays clean unless verbosity was explicitly requested, and the
//! subscriber writes to stderr so it never interleaves with command output.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::Cli;

/// Initialize the global tracing subscriber based on CLI flags.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let mut level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    if cli.json && !cli.verbose {
        level = Level::ERROR;
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
