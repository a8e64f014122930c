//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::DriverConfig;

/// Environment variable holding a filter directive, e.g. `nanodriver=debug`.
pub const LOG_ENV: &str = "NANODRIVER_LOG";

fn filter(config: &DriverConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls, or a host that already
/// installed one, leave the existing subscriber in place.
pub fn init(config: &DriverConfig) {
    let builder = tracing_subscriber::fmt().with_env_filter(filter(config));
    let log_file = config
        .log_file
        .as_ref()
        .map(|path| (path, OpenOptions::new().create(true).append(true).open(path)));

    match log_file {
        Some((_, Ok(file))) => {
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Some((path, Err(err))) => {
            let _ = builder.with_writer(std::io::stderr).try_init();
            warn!(path = %path.display(), %err, "cannot open log file, logging to stderr");
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
