pub mod block_state;
pub mod chunk;
pub mod nibble;
pub mod registry;
pub mod translate;

pub use block_state::{BlockState, AIR};
pub use chunk::{section_index, ChunkColumn, ChunkSection, SECTION_VOLUME};
pub use nibble::NibbleArray;
pub use registry::{BlockRegistry, BlockRegistryBuilder};
pub use translate::{
    BlockTranslator, LegacyBlockEntry, RuntimeIdTable, SourceIdentity, TranslationCache,
};
