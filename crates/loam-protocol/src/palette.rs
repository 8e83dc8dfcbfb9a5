//! BitPalette block storage: words of packed palette indices followed by an
//! optional runtime id palette.

use crate::buffer::PacketBuffer;
use crate::error::DecodeError;
use byteorder::{LittleEndian, WriteBytesExt};
use log::warn;
use loam_nbt::varint;
use loam_world::{BlockTranslator, ChunkSection, SECTION_VOLUME};
use std::io::{self, Write};

/// The storage header byte: bits-per-block in the high seven bits, runtime
/// flag in the low bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageFormat {
    pub runtime: bool,
    pub bits_per_block: u8,
}

impl StorageFormat {
    pub fn new(bits_per_block: u8, runtime: bool) -> Self {
        StorageFormat {
            runtime,
            bits_per_block,
        }
    }

    pub fn from_byte(format: u8) -> Result<Self, DecodeError> {
        let bits_per_block = format >> 1;
        if bits_per_block == 0 || bits_per_block > 32 {
            return Err(DecodeError::InvalidStorageFormat { format });
        }
        Ok(StorageFormat {
            runtime: format & 1 != 0,
            bits_per_block,
        })
    }

    pub fn to_byte(self) -> u8 {
        (self.bits_per_block << 1) | self.runtime as u8
    }

    pub fn blocks_per_word(self) -> usize {
        32 / self.bits_per_block as usize
    }

    pub fn word_count(self) -> usize {
        SECTION_VOLUME.div_ceil(self.blocks_per_word())
    }

    fn mask(self) -> u32 {
        ((1u64 << self.bits_per_block) - 1) as u32
    }
}

/// Wire position to `(x, y, z)`. Wire order is x-major, y fastest.
pub fn position_to_xyz(position: usize) -> (usize, usize, usize) {
    ((position >> 8) & 0xF, position & 0xF, (position >> 4) & 0xF)
}

pub(crate) fn ensure(
    buffer: &PacketBuffer,
    expected: usize,
    what: &'static str,
) -> Result<(), DecodeError> {
    let available = buffer.remaining();
    if available < expected {
        return Err(DecodeError::ShortRead {
            what,
            expected,
            available,
        });
    }
    Ok(())
}

/// One decoded storage layer, indices in wire position order.
#[derive(Debug, Clone)]
pub struct StorageLayer {
    pub format: StorageFormat,
    pub indices: Vec<u32>,
    pub palette: Vec<u32>,
}

impl StorageLayer {
    /// Runtime id stored at `position`. Without a runtime palette the index
    /// is the runtime id itself. Out-of-range palette indices yield `None`.
    pub fn runtime_id(&self, position: usize) -> Option<u32> {
        let index = *self.indices.get(position)?;
        if self.format.runtime {
            self.palette.get(index as usize).copied()
        } else {
            Some(index)
        }
    }
}

/// Reads a zigzag length-prefixed list of zigzag runtime ids.
pub fn read_palette(buffer: &mut PacketBuffer) -> Result<Vec<u32>, DecodeError> {
    let length = buffer.read_zigzag_i32()?;
    // Every entry takes at least one byte
    let length = usize::try_from(length).unwrap_or(0);
    ensure(buffer, length, "palette")?;

    let mut palette = Vec::with_capacity(length);
    for _ in 0..length {
        palette.push(buffer.read_zigzag_i32()? as u32);
    }
    Ok(palette)
}

/// Reads one storage layer. On `EmptyPalette` the stream has already been
/// advanced past the layer, so decoding can carry on with the next one.
pub fn read_storage(buffer: &mut PacketBuffer, storage: u8) -> Result<StorageLayer, DecodeError> {
    ensure(buffer, 1, "storage format")?;
    let format = StorageFormat::from_byte(buffer.read_u8()?)?;

    let blocks_per_word = format.blocks_per_word();
    let word_count = format.word_count();
    ensure(buffer, word_count * 4, "storage words")?;

    let mask = format.mask();
    let bits = format.bits_per_block as u32;
    let mut indices = Vec::with_capacity(SECTION_VOLUME);
    for _ in 0..word_count {
        let word = buffer.read_u32_be()?.swap_bytes();
        for block in 0..blocks_per_word {
            // Padding bits in the last word
            if indices.len() >= SECTION_VOLUME {
                break;
            }
            let shift = block as u32 * bits;
            indices.push(((word as u64 >> shift) as u32) & mask);
        }
    }

    let palette = if format.runtime {
        let palette = read_palette(buffer)?;
        if palette.is_empty() {
            return Err(DecodeError::EmptyPalette { storage });
        }
        palette
    } else {
        Vec::new()
    };

    Ok(StorageLayer {
        format,
        indices,
        palette,
    })
}

/// Decodes a version 1/8 section body: layer count, then the layers. Only
/// layer 0 is written into `section`.
pub fn decode_palette_section(
    buffer: &mut PacketBuffer,
    section: &mut ChunkSection,
    translator: &BlockTranslator,
) -> Result<(), DecodeError> {
    ensure(buffer, 1, "storage count")?;
    let storage_count = buffer.read_u8()?;

    for storage in 0..storage_count {
        let layer = match read_storage(buffer, storage) {
            Ok(layer) => layer,
            Err(err @ DecodeError::EmptyPalette { .. }) => {
                warn!("Section {}: {}", section.index(), err);
                continue;
            }
            Err(err) => return Err(err),
        };

        if storage != 0 {
            continue;
        }

        for position in 0..SECTION_VOLUME {
            let Some(runtime_id) = layer.runtime_id(position) else {
                continue;
            };
            if let Some(state) = translator.resolve_runtime(runtime_id) {
                let (x, y, z) = position_to_xyz(position);
                section.set_block_state_at(x, y, z, state);
            }
        }
    }

    Ok(())
}

/// Writes a storage layer. `indices` are in wire position order; a
/// `palette` marks the layer as runtime-paletted.
pub fn encode_storage<W: Write>(
    out: &mut W,
    indices: &[u32],
    palette: Option<&[u32]>,
    bits_per_block: u8,
) -> io::Result<()> {
    let format = StorageFormat::new(bits_per_block, palette.is_some());
    out.write_u8(format.to_byte())?;

    let blocks_per_word = format.blocks_per_word();
    let mask = format.mask();
    for chunk in indices.chunks(blocks_per_word) {
        let mut word = 0u64;
        for (block, index) in chunk.iter().enumerate() {
            word |= ((index & mask) as u64) << (block * bits_per_block as usize);
        }
        // Byte-swapped big-endian is little-endian
        out.write_u32::<LittleEndian>(word as u32)?;
    }
    // Pad short input out to a full section
    let written = indices.len().div_ceil(blocks_per_word);
    for _ in written..format.word_count() {
        out.write_u32::<LittleEndian>(0)?;
    }

    if let Some(palette) = palette {
        varint::write_zigzag_i32(out, palette.len() as i32)?;
        for runtime_id in palette {
            varint::write_zigzag_i32(out, *runtime_id as i32)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{translator, DIRT, STONE};
    use assert_matches::assert_matches;
    use bytes::{BufMut, Bytes};

    fn random_indices(rng: &mut fastrand::Rng, bits: u8) -> Vec<u32> {
        let max = ((1u64 << bits) - 1) as u32;
        (0..SECTION_VOLUME).map(|_| rng.u32(0..=max)).collect()
    }

    #[test]
    fn test_format_byte() {
        let format = StorageFormat::from_byte(0x09).unwrap();
        assert!(format.runtime);
        assert_eq!(format.bits_per_block, 4);
        assert_eq!(format.blocks_per_word(), 8);
        assert_eq!(format.word_count(), 512);
        assert_eq!(format.to_byte(), 0x09);

        // 5 bits: 6 per word, 2 padding bits
        let format = StorageFormat::new(5, false);
        assert_eq!(format.word_count(), 683);

        assert_matches!(
            StorageFormat::from_byte(0x01),
            Err(DecodeError::InvalidStorageFormat { format: 0x01 })
        );
        assert_matches!(
            StorageFormat::from_byte(33 << 1),
            Err(DecodeError::InvalidStorageFormat { .. })
        );
    }

    #[test]
    fn test_position_to_xyz() {
        assert_eq!(position_to_xyz(0), (0, 0, 0));
        assert_eq!(position_to_xyz(1), (0, 1, 0));
        assert_eq!(position_to_xyz(16), (0, 0, 1));
        assert_eq!(position_to_xyz(256), (1, 0, 0));
        assert_eq!(position_to_xyz(4095), (15, 15, 15));
    }

    #[test]
    fn test_round_trip_every_width() {
        let mut rng = fastrand::Rng::with_seed(0x10a4);
        for bits in 1..=32u8 {
            let indices = random_indices(&mut rng, bits);
            let mut out: Vec<u8> = Vec::new();
            encode_storage(&mut out, &indices, None, bits).unwrap();

            let format = StorageFormat::new(bits, false);
            assert_eq!(out.len(), 1 + format.word_count() * 4, "bits {}", bits);

            let mut buffer = PacketBuffer::new(Bytes::from(out));
            let layer = read_storage(&mut buffer, 0).unwrap();
            assert_eq!(layer.format.bits_per_block, bits);
            assert_eq!(layer.indices, indices, "bits {}", bits);
            assert_eq!(buffer.remaining(), 0);
        }
    }

    #[test]
    fn test_round_trip_every_width_with_palette() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for bits in 1..=32u8 {
            // Every index must fit the width and point into the palette
            let len = (1usize << bits.min(6)).min(64);
            let palette: Vec<u32> = (0..len).map(|_| rng.u32(0..1 << 20)).collect();
            let indices: Vec<u32> = (0..SECTION_VOLUME)
                .map(|_| rng.u32(0..len as u32))
                .collect();

            let mut out: Vec<u8> = Vec::new();
            encode_storage(&mut out, &indices, Some(&palette), bits).unwrap();

            let mut buffer = PacketBuffer::new(Bytes::from(out));
            let layer = read_storage(&mut buffer, 0).unwrap();
            assert!(layer.format.runtime);
            assert_eq!(layer.format.bits_per_block, bits);
            assert_eq!(layer.indices, indices, "bits {}", bits);
            assert_eq!(layer.palette, palette, "bits {}", bits);
            for position in [0, 17, 2048, SECTION_VOLUME - 1] {
                assert_eq!(
                    layer.runtime_id(position),
                    Some(palette[indices[position] as usize])
                );
            }
            assert_eq!(buffer.remaining(), 0);
        }
    }

    #[test]
    fn test_round_trip_with_palette() {
        let mut rng = fastrand::Rng::with_seed(7);
        let palette = vec![0, 1, 2, 300, 70_000];
        let indices: Vec<u32> = (0..SECTION_VOLUME).map(|_| rng.u32(0..5)).collect();

        let mut out: Vec<u8> = Vec::new();
        encode_storage(&mut out, &indices, Some(&palette), 3).unwrap();
        out.put_u8(0xEE);

        let mut buffer = PacketBuffer::new(Bytes::from(out));
        let layer = read_storage(&mut buffer, 0).unwrap();
        assert_eq!(layer.palette, palette);
        assert_eq!(layer.indices, indices);
        assert_eq!(layer.runtime_id(0), Some(palette[indices[0] as usize]));
        assert_eq!(buffer.read_u8().unwrap(), 0xEE);
    }

    #[test]
    fn test_words_are_byte_swapped() {
        let mut out: Vec<u8> = Vec::new();
        let mut indices = vec![0u32; SECTION_VOLUME];
        indices[0] = 1;
        indices[31] = 1;
        encode_storage(&mut out, &indices, None, 1).unwrap();
        assert_eq!(&out[..5], &[0x02, 0x01, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn test_empty_palette_consumes_layer() {
        let mut out: Vec<u8> = Vec::new();
        encode_storage(&mut out, &[0; SECTION_VOLUME], Some(&[]), 1).unwrap();
        out.put_u8(0x42);

        let mut buffer = PacketBuffer::new(Bytes::from(out));
        assert_matches!(
            read_storage(&mut buffer, 1),
            Err(DecodeError::EmptyPalette { storage: 1 })
        );
        assert_eq!(buffer.read_u8().unwrap(), 0x42);
    }

    #[test]
    fn test_truncated_words() {
        let mut buffer = PacketBuffer::from_bytes(vec![0x08, 0, 0, 0]);
        assert_matches!(
            read_storage(&mut buffer, 0),
            Err(DecodeError::ShortRead {
                what: "storage words",
                ..
            })
        );
    }

    #[test]
    fn test_section_uses_layer_zero_only() {
        let translator = translator();
        let mut indices = vec![0u32; SECTION_VOLUME];
        // x = 1, y = 2, z = 3
        indices[(1 << 8) + (3 << 4) + 2] = 1;
        // Out of range for a two-entry palette
        indices[5] = 3;

        let mut out: Vec<u8> = Vec::new();
        out.put_u8(2);
        encode_storage(&mut out, &indices, Some(&[0, STONE]), 2).unwrap();
        encode_storage(&mut out, &[1; SECTION_VOLUME], Some(&[DIRT, DIRT]), 1).unwrap();

        let mut section = ChunkSection::new(0, translator.air());
        let mut buffer = PacketBuffer::new(Bytes::from(out));
        decode_palette_section(&mut buffer, &mut section, &translator).unwrap();

        assert_eq!(buffer.remaining(), 0);
        assert_eq!(section.non_air_count(), 1);
        assert_eq!(section.get_block_state_at(1, 2, 3).name(), "minecraft:stone");
        assert!(section.get_block_state_at(0, 5, 0).is_air());
    }

    #[test]
    fn test_section_skips_empty_palette_layer() {
        let translator = translator();
        let mut out: Vec<u8> = Vec::new();
        out.put_u8(2);
        encode_storage(&mut out, &[0; SECTION_VOLUME], Some(&[]), 1).unwrap();
        encode_storage(&mut out, &[0; SECTION_VOLUME], Some(&[STONE]), 1).unwrap();

        let mut section = ChunkSection::new(0, translator.air());
        let mut buffer = PacketBuffer::new(Bytes::from(out));
        decode_palette_section(&mut buffer, &mut section, &translator).unwrap();
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(section.non_air_count(), 0);
    }

    #[test]
    fn test_section_without_runtime_flag() {
        let translator = translator();
        let mut out: Vec<u8> = Vec::new();
        out.put_u8(1);
        encode_storage(&mut out, &[STONE; SECTION_VOLUME], None, 8).unwrap();

        let mut section = ChunkSection::new(0, translator.air());
        let mut buffer = PacketBuffer::new(Bytes::from(out));
        decode_palette_section(&mut buffer, &mut section, &translator).unwrap();
        assert_eq!(section.non_air_count(), SECTION_VOLUME);
    }
}
