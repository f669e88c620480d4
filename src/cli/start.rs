use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Parse the command line, initialize logging/tracing, and return the action
/// to execute.
///
/// # Errors
/// Returns an error when telemetry initialization fails or required
/// arguments are missing.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity_level = match matches.get_one::<u8>("verbosity").map_or(0, |&v| v) {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    telemetry::init(Some(verbosity_level))?;

    dispatch::handler(&matches)
}
