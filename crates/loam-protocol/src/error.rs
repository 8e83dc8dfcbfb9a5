use std::error::Error;
use std::fmt;
use std::io;

/// Why a chunk payload could not be turned into a column.
#[derive(Debug)]
pub enum DecodeError {
    /// Section count outside 1..=16.
    MalformedHeader { section_count: u8 },
    /// A runtime storage layer declared an empty palette. Handled inside the
    /// section decoder; never returned from a chunk decode.
    EmptyPalette { storage: u8 },
    InvalidStorageFormat { format: u8 },
    ShortRead {
        what: &'static str,
        expected: usize,
        available: usize,
    },
    Io(io::Error),
}

impl DecodeError {
    /// Expected, recoverable input problems; the rest deserve an error log.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            DecodeError::MalformedHeader { .. } | DecodeError::EmptyPalette { .. }
        )
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedHeader { section_count } => {
                write!(f, "Malformed chunk header: {} sections", section_count)
            }
            DecodeError::EmptyPalette { storage } => {
                write!(f, "Empty palette in storage layer {}", storage)
            }
            DecodeError::InvalidStorageFormat { format } => {
                write!(f, "Invalid storage format byte: {:#04x}", format)
            }
            DecodeError::ShortRead {
                what,
                expected,
                available,
            } => write!(
                f,
                "Out of data reading {}: needed {} bytes, {} left",
                what, expected, available
            ),
            DecodeError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        DecodeError::Io(err)
    }
}
