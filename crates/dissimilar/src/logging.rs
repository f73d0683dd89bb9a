//! Logging bootstrap.
//!
//! Logs go to stderr so stdout stays clean for the report. `RUST_LOG`
//! overrides everything else; below that, the config file sets level and
//! format, and the CLI flags bump them per invocation.

use dissimilar_core::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(config: &LoggingConfig, verbose: bool, json_logs: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs || config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
