use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LoamError {
    IoError(std::io::Error),
    ConfigError(String),
    ProtocolError(String),
}

impl fmt::Display for LoamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoamError::IoError(err) => write!(f, "IO error: {}", err),
            LoamError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            LoamError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl Error for LoamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoamError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoamError {
    fn from(err: std::io::Error) -> Self {
        LoamError::IoError(err)
    }
}

impl From<serde_json::Error> for LoamError {
    fn from(err: serde_json::Error) -> Self {
        LoamError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_display() {
        let err = LoamError::ConfigError("worker_threads must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Config error: worker_threads must be at least 1"
        );
    }

    #[test]
    fn test_io_error_source() {
        let err: LoamError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_matches!(err, LoamError::IoError(_));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_becomes_config_error() {
        let parse = serde_json::from_str::<u32>("not a number").unwrap_err();
        assert_matches!(LoamError::from(parse), LoamError::ConfigError(_));
    }
}
