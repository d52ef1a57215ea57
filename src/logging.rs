//! Diagnostics for the launcher.
//!
//! A minimal stderr backend for the `log` facade. Output level:
//! - **Quiet** (`-q`): errors only
//! - **Default**: warnings and errors, or the config's `[log] level`
//! - **Verbose** (`-v`): everything up to debug

use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "image-launcher: {}: {}", label(record.level()), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn label(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warning",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

/// Install the logger (first call only) and set the active level.
pub fn init(level: LevelFilter) {
    // Repeated launches in one process keep the first logger.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

pub fn level_for(quiet: bool, verbose: bool, configured: Option<LevelFilter>) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        configured.unwrap_or(LevelFilter::Warn)
    }
}
