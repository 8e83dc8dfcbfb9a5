pub mod error;
pub mod types;

pub use error::LoamError;
pub use types::{ChunkCoords, Result};
