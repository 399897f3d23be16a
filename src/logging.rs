//! Structured log output for the binary.

use tracing_subscriber::EnvFilter;

/// Variable holding an explicit filter, such as `connectflow=debug`.
pub const LOG_ENV: &str = "CONNECTFLOW_LOG";

/// Filter directive for a `-v` count, with `-q` forcing errors only.
pub fn directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn,connectflow=info",
        1 => "info,connectflow=debug",
        2 => "debug,connectflow=trace",
        _ => "trace",
    }
}

/// Install the global subscriber, logging to stderr.
///
/// `CONNECTFLOW_LOG` wins over the flags when it is set and parses.
pub fn init(verbose: u8, quiet: bool) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(directive(verbose, quiet)));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 0)
        .try_init()
        .is_err()
    {
        tracing::debug!("Log subscriber already installed");
    }
}
