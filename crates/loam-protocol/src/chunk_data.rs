//! Bedrock level chunk payload: section count, sections, height map, biomes,
//! then an optional trailer of border blocks and block entities.

use crate::buffer::PacketBuffer;
use crate::error::DecodeError;
use crate::legacy::{decode_legacy, encode_legacy};
use crate::light::read_light;
use crate::palette::{decode_palette_section, encode_storage, ensure};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};
use loam_nbt::{varint, Tag};
use loam_world::{BlockTranslator, ChunkColumn, ChunkSection, NibbleArray, SECTION_VOLUME};
use std::io::{self, Write};
use std::sync::Arc;

pub const MAX_SECTIONS: u8 = 16;
const HEIGHT_MAP_BYTES: usize = 512;
const BIOME_BYTES: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Each section is followed by sky and block light arrays.
    pub extended_light: bool,
}

/// Decodes chunk payloads into columns. Shared by all workers.
pub struct ChunkDecoder {
    translator: Arc<BlockTranslator>,
    options: DecoderOptions,
}

impl ChunkDecoder {
    pub fn new(translator: Arc<BlockTranslator>, options: DecoderOptions) -> Self {
        ChunkDecoder {
            translator,
            options,
        }
    }

    pub fn translator(&self) -> &Arc<BlockTranslator> {
        &self.translator
    }

    pub fn options(&self) -> DecoderOptions {
        self.options
    }

    pub fn decode(&self, data: Bytes, cx: i32, cz: i32) -> Result<ChunkColumn, DecodeError> {
        let mut buffer = PacketBuffer::new(data);

        let section_count = buffer.read_u8().unwrap_or(0);
        if section_count < 1 || section_count > MAX_SECTIONS {
            return Err(DecodeError::MalformedHeader { section_count });
        }

        let mut column = ChunkColumn::new(cx, cz);
        column.mark_dirty();

        for s in 0..section_count {
            let section = self.decode_section(&mut buffer, s)?;
            column.set_section(s as usize, section);
        }

        ensure(&buffer, HEIGHT_MAP_BYTES, "height map")?;
        column.set_height_map(&buffer.read_bytes(HEIGHT_MAP_BYTES)?);
        ensure(&buffer, BIOME_BYTES, "biomes")?;
        column.set_biomes(&buffer.read_bytes(BIOME_BYTES)?);

        self.read_trailer(&mut buffer, &mut column);
        Ok(column)
    }

    fn decode_section(
        &self,
        buffer: &mut PacketBuffer,
        index: u8,
    ) -> Result<ChunkSection, DecodeError> {
        let mut section = ChunkSection::new(index, self.translator.air());

        ensure(buffer, 1, "section version")?;
        match buffer.read_u8()? {
            1 | 8 => decode_palette_section(buffer, &mut section, &self.translator)?,
            _ => decode_legacy(buffer, &mut section, &self.translator)?,
        }

        if self.options.extended_light {
            let (sky, block) = read_light(buffer)?;
            section.sky_light = Some(sky);
            section.block_light = Some(block);
        }

        section.mark_dirty();
        Ok(section)
    }

    fn read_trailer(&self, buffer: &mut PacketBuffer, column: &mut ChunkColumn) {
        if buffer.remaining() <= 1 {
            return;
        }

        let coords = column.coords();
        match buffer.read_zigzag_i32() {
            Ok(border) if border > 0 => {
                let skipped = buffer.skip(border as usize);
                if skipped < border as usize {
                    debug!("Chunk {}: border blocks cut short at {} bytes", coords, skipped);
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!("Chunk {}: unreadable border block length: {}", coords, err);
                return;
            }
        }

        while buffer.remaining() > 0 {
            let mut lookahead = buffer.clone();
            match Tag::read(&mut lookahead) {
                Ok((_, tag)) => {
                    *buffer = lookahead;
                    column.add_block_entity(tag);
                }
                Err(err) => {
                    debug!("Chunk {}: stopped reading block entities: {}", coords, err);
                    break;
                }
            }
        }

        if buffer.remaining() > 0 {
            warn!(
                "Chunk {}: {} bytes left after block entities: {}",
                coords,
                buffer.remaining(),
                hex::encode(buffer.rest())
            );
        }
    }
}

/// One storage layer for [`ChunkPayloadWriter::palette_section`].
#[derive(Debug, Clone)]
pub struct PaletteLayer {
    pub indices: Vec<u32>,
    pub palette: Option<Vec<u32>>,
    pub bits_per_block: u8,
}

impl PaletteLayer {
    /// Every cell set to `runtime_id`.
    pub fn uniform(runtime_id: u32) -> Self {
        PaletteLayer {
            indices: vec![0; SECTION_VOLUME],
            palette: Some(vec![runtime_id]),
            bits_per_block: 1,
        }
    }
}

/// Builds chunk payloads in the wire layout the decoder reads.
#[derive(Debug, Default)]
pub struct ChunkPayloadWriter {
    section_count: Option<u8>,
    written_sections: u8,
    sections: Vec<u8>,
    // First encoding failure, reported by `finish`
    error: Option<io::Error>,
    height_map: Option<Vec<u8>>,
    biomes: Option<Vec<u8>>,
    border_blocks: Option<Vec<u8>>,
    block_entities: Vec<Tag>,
    trailing: Vec<u8>,
}

impl ChunkPayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the section count byte.
    pub fn section_count(mut self, count: u8) -> Self {
        self.section_count = Some(count);
        self
    }

    pub fn palette_section(mut self, version: u8, layers: &[PaletteLayer]) -> Self {
        self.sections.put_u8(version);
        self.sections.put_u8(layers.len() as u8);
        for layer in layers {
            let encoded = encode_storage(
                &mut self.sections,
                &layer.indices,
                layer.palette.as_deref(),
                layer.bits_per_block,
            );
            if let Err(err) = encoded {
                self.error.get_or_insert(err);
            }
        }
        self.written_sections += 1;
        self
    }

    pub fn legacy_section(mut self, ids: &[u8], meta: &NibbleArray) -> Self {
        self.sections.put_u8(0);
        encode_legacy(&mut self.sections, ids, meta);
        self.written_sections += 1;
        self
    }

    /// Appends sky and block light in wire order to the last section.
    pub fn light(mut self, sky: &NibbleArray, block: &NibbleArray) -> Self {
        self.sections.put_slice(sky.data());
        self.sections.put_slice(block.data());
        self
    }

    pub fn height_map(mut self, heights: &[u16]) -> Self {
        let mut raw = vec![0u8; HEIGHT_MAP_BYTES];
        for (pair, height) in raw.chunks_exact_mut(2).zip(heights) {
            pair.copy_from_slice(&height.to_le_bytes());
        }
        self.height_map = Some(raw);
        self
    }

    pub fn biomes(mut self, biomes: &[u8]) -> Self {
        let mut raw = vec![0u8; BIOME_BYTES];
        let len = biomes.len().min(BIOME_BYTES);
        raw[..len].copy_from_slice(&biomes[..len]);
        self.biomes = Some(raw);
        self
    }

    pub fn border_blocks(mut self, bytes: &[u8]) -> Self {
        self.border_blocks = Some(bytes.to_vec());
        self
    }

    pub fn block_entity(mut self, tag: Tag) -> Self {
        self.block_entities.push(tag);
        self
    }

    /// Raw bytes after everything else.
    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> io::Result<Bytes> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut out = BytesMut::with_capacity(self.sections.len() + 1024);
        out.put_u8(self.section_count.unwrap_or(self.written_sections));
        out.put_slice(&self.sections);
        out.put_slice(
            &self
                .height_map
                .unwrap_or_else(|| vec![0; HEIGHT_MAP_BYTES]),
        );
        out.put_slice(&self.biomes.unwrap_or_else(|| vec![0; BIOME_BYTES]));

        let has_trailer = self.border_blocks.is_some() || !self.block_entities.is_empty();
        if has_trailer {
            let border = self.border_blocks.unwrap_or_default();
            let mut writer = out.writer();
            varint::write_zigzag_i32(&mut writer, border.len() as i32)?;
            writer.write_all(&border)?;
            for tag in &self.block_entities {
                tag.write(&mut writer, "")?;
            }
            out = writer.into_inner();
        }

        out.put_slice(&self.trailing);
        Ok(out.freeze())
    }
}
