//! Root logger construction, shared by both binaries.

use crate::config::LogLevel;
use slog::{o, Drain as _, Logger};

/// Build the process-wide logger: terminal output, asynchronous drain,
/// filtered to the configured level.
pub fn logger(level: LogLevel) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level.as_slog_level()).fuse();
    Logger::root(drain, o!())
}

/// Logger that swallows everything. Handy in tests.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
