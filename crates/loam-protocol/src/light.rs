use crate::buffer::PacketBuffer;
use crate::error::DecodeError;
use crate::palette::ensure;
use loam_world::{section_index, NibbleArray, SECTION_VOLUME};

const LIGHT_BYTES: usize = SECTION_VOLUME / 2;

/// Maps a light cell in wire order (`x * 256 + z * 16 + y`) to the section
/// index of the same block.
pub fn wire_to_section_index(x: usize, y: usize, z: usize) -> (usize, usize) {
    let wire = (x << 8) + (z << 4) + y;
    (wire, section_index(x, y, z))
}

pub fn transpose_light(raw: &NibbleArray) -> NibbleArray {
    let mut light = NibbleArray::new(SECTION_VOLUME);
    for x in 0..16 {
        for y in 0..16 {
            for z in 0..16 {
                let (wire, idx) = wire_to_section_index(x, y, z);
                light.set(idx, raw.get(wire));
            }
        }
    }
    light
}

/// Reads sky light then block light, both in section order.
pub fn read_light(buffer: &mut PacketBuffer) -> Result<(NibbleArray, NibbleArray), DecodeError> {
    ensure(buffer, LIGHT_BYTES * 2, "light")?;
    let sky = NibbleArray::from_bytes(buffer.read_bytes(LIGHT_BYTES)?.to_vec());
    let block = NibbleArray::from_bytes(buffer.read_bytes(LIGHT_BYTES)?.to_vec());
    Ok((transpose_light(&sky), transpose_light(&block)))
}
