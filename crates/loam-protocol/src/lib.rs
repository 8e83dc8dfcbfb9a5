pub mod buffer;
pub mod chunk_data;
pub mod error;
pub mod legacy;
pub mod light;
pub mod palette;
pub mod resource_pack;

pub use buffer::PacketBuffer;
pub use chunk_data::{ChunkDecoder, ChunkPayloadWriter, DecoderOptions, PaletteLayer};
pub use error::DecodeError;
pub use resource_pack::{
    PackId, PackType, ResourcePackEntry, ResourcePackManager, DEFAULT_MAX_PACK_SIZE,
};
