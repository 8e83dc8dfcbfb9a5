pub mod log;
pub mod severity;
pub mod systime;

pub use crate::log::{init, log_with};
pub use severity::LogSeverity;
