pub mod config;
pub mod pool;

pub use config::ProcessorConfig;
pub use pool::{ChunkCallback, ChunkProcessor, PoolStats};
