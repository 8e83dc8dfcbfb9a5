use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type Result<T> = std::result::Result<T, crate::error::LoamError>;

/// Column coordinates of a chunk, in chunk units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoords {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoords {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for ChunkCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

/// Parses `"<x>_<z>"` or `"<x>,<z>"`.
impl FromStr for ChunkCoords {
    type Err = crate::error::LoamError;

    fn from_str(s: &str) -> Result<Self> {
        let (x, z) = s
            .split_once(|c| c == '_' || c == ',')
            .ok_or_else(|| crate::error::LoamError::ProtocolError(format!("Bad coords: {}", s)))?;
        let parse = |v: &str| {
            v.trim().parse::<i32>().map_err(|_| {
                crate::error::LoamError::ProtocolError(format!("Bad coordinate: {}", v))
            })
        };
        Ok(ChunkCoords::new(parse(x)?, parse(z)?))
    }
}
