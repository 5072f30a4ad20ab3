//! Logging setup: a tracing subscriber writing to a file in the config
//! directory, so shell output stays clean. `RUST_LOG` overrides the
//! configured level.

use crate::config::{Config, LogLevel};
use std::fs;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. The returned guard flushes the
/// non-blocking writer on drop and must be held for the process lifetime.
pub fn init(config: &Config, override_level: Option<LogLevel>) -> io::Result<WorkerGuard> {
    let directory = Config::config_dir()?;
    fs::create_dir_all(&directory)?;

    let level = override_level.unwrap_or(config.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("schemashell={}", level.as_filter())));

    let appender = tracing_appender::rolling::never(&directory, "schemashell.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
