use std::fmt;
use std::fmt::{Display, Formatter};

/// Tag printed in front of every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO",
            LogSeverity::Warning => "WARNING",
            LogSeverity::Error => "ERROR",
            LogSeverity::Fatal => "FATAL",
        }
    }
}

impl Display for LogSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// `log` has no fatal level; trace folds into debug.
impl From<::log::Level> for LogSeverity {
    fn from(level: ::log::Level) -> Self {
        match level {
            ::log::Level::Error => LogSeverity::Error,
            ::log::Level::Warn => LogSeverity::Warning,
            ::log::Level::Info => LogSeverity::Info,
            ::log::Level::Debug | ::log::Level::Trace => LogSeverity::Debug,
        }
    }
}
