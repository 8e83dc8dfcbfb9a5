use crate::severity::LogSeverity;
use crate::systime::now;
use ::log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use once_cell::sync::OnceCell;
use std::fmt;
use std::io::Write;

static LOGGER: OnceCell<SeverityLogger> = OnceCell::new();

/// `log` backend printing `[SEVERITY] <local time> <target>: message`.
/// Errors go to stderr, everything else to stdout.
struct SeverityLogger {
    level: LevelFilter,
}

impl Log for SeverityLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(
            LogSeverity::from(record.level()),
            &now(),
            record.target(),
            record.args(),
        );

        if record.level() == ::log::Level::Error {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        } else {
            let _ = writeln!(std::io::stdout().lock(), "{}", line);
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Installs the logger as the global `log` backend. The first call wins; later
/// calls return the `SetLoggerError` from `log`.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.get_or_init(|| SeverityLogger { level });
    ::log::set_logger(logger)?;
    ::log::set_max_level(level);
    Ok(())
}

/// Logs straight to stdout without going through the `log` facade.
pub fn log_with(msg: String, log_severity: LogSeverity) {
    println!("[{}] {} {}", log_severity, now(), msg);
}

pub fn format_line(
    severity: LogSeverity,
    time: &str,
    target: &str,
    args: &fmt::Arguments<'_>,
) -> String {
    format!("[{}] {} {}: {}", severity, time, target, args)
}
