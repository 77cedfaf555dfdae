//! A minimal standalone [`log`] subscriber for binaries built on top
//! of this crate that don't already install their own.
//!
//! This mirrors the allocator's own stance on dependencies: one small,
//! dependency-free logger rather than pulling in a full subscriber
//! framework for a crate whose only real job is the buddy engine.

use log::{Level, Log, Metadata, Record};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "[ {:>5} ] [{}] {}",
                record.level(),
                record.module_path().unwrap_or("<n/a>"),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Installs the bundled stderr logger as the global `log` subscriber.
///
/// Intended for callers that don't already have their own `log`
/// subscriber installed (e.g. `env_logger`, `tracing-subscriber`'s
/// compatibility shim). Calling this more than once, or after another
/// subscriber is already installed, returns an error from
/// `log::set_logger` rather than panicking.
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
