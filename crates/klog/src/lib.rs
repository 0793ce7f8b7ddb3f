//! Kernel logging backend.
//!
//! Implements `log::Log` on top of the COM1 serial driver in `hwio`, so
//! drivers log through the ordinary `log` macros and records come out on
//! the serial console as colored, leveled lines:
//!
//! ```text
//! [ WARN] hwio::ata: waiting for DRQ: device not ready after 100000 status samples
//! ```
#![no_std]

#[cfg(test)]
extern crate std;

use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

fn label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

/// One record as it appears on the console, newline included.
pub struct Line<'a, 'r>(pub &'a Record<'r>);

impl fmt::Display for Line<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(
            f,
            "{}[{}]\x1b[0m {}: {}\n",
            color(record.level()),
            label(record.level()),
            record.target(),
            record.args()
        )
    }
}

struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            emit(record);
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

#[cfg(target_arch = "x86_64")]
fn emit(record: &Record) {
    // A stuck UART drops the line; there is nowhere else to report it.
    let _ = hwio::serial::write_fmt(format_args!("{}", Line(record)));
}

#[cfg(not(target_arch = "x86_64"))]
fn emit(_record: &Record) {}

/// Bring up COM1 and install the serial logger at `level`.
///
/// A missing UART is not an error: the logger is still installed and
/// records are discarded.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    #[cfg(target_arch = "x86_64")]
    let _ = hwio::serial::init();

    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
