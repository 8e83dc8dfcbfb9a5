use crate::buffer::PacketBuffer;
use crate::error::DecodeError;
use crate::palette::ensure;
use bytes::BufMut;
use loam_world::{BlockTranslator, ChunkSection, NibbleArray, SECTION_VOLUME};

const META_BYTES: usize = SECTION_VOLUME / 2;

/// Index into the legacy id and metadata arrays.
pub fn legacy_index(x: usize, y: usize, z: usize) -> usize {
    (x << 8) + (z << 4) + y
}

/// Pre-palette section body: 4096 block ids then 4096 metadata nibbles.
pub fn decode_legacy(
    buffer: &mut PacketBuffer,
    section: &mut ChunkSection,
    translator: &BlockTranslator,
) -> Result<(), DecodeError> {
    ensure(buffer, SECTION_VOLUME + META_BYTES, "legacy section")?;
    let ids = buffer.read_bytes(SECTION_VOLUME)?;
    let meta = NibbleArray::from_bytes(buffer.read_bytes(META_BYTES)?.to_vec());

    for x in 0..16 {
        for z in 0..16 {
            for y in 0..16 {
                let idx = legacy_index(x, y, z);
                let id = ids[idx];
                if id == 0 {
                    continue;
                }
                if let Some(state) = translator.resolve_legacy(id, meta.get(idx)) {
                    section.set_block_state_at(x, y, z, state);
                }
            }
        }
    }

    Ok(())
}

pub fn encode_legacy<B: BufMut>(out: &mut B, ids: &[u8], meta: &NibbleArray) {
    out.put_slice(ids);
    out.put_slice(meta.data());
}
