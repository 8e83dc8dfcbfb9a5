use crate::block_state::BlockState;
use crate::nibble::NibbleArray;
use loam_common::ChunkCoords;
use loam_nbt::Tag;

pub const SECTION_VOLUME: usize = 4096;
pub const SECTIONS_PER_COLUMN: usize = 16;
pub const COLUMN_AREA: usize = 256;

/// `(y << 8) | (z << 4) | x`
pub fn section_index(x: usize, y: usize, z: usize) -> usize {
    ((y & 0xF) << 8) | ((z & 0xF) << 4) | (x & 0xF)
}

fn column_index(x: usize, z: usize) -> usize {
    ((z & 0xF) << 4) + (x & 0xF)
}

/// 16x16x16 dense block grid with optional light.
#[derive(Debug, Clone)]
pub struct ChunkSection {
    index: u8,
    blocks: Vec<BlockState>,
    pub block_light: Option<NibbleArray>,
    pub sky_light: Option<NibbleArray>,
    dirty: bool,
}

impl ChunkSection {
    /// Section filled with `air`.
    pub fn new(index: u8, air: &BlockState) -> Self {
        ChunkSection {
            index,
            blocks: vec![air.clone(); SECTION_VOLUME],
            block_light: None,
            sky_light: None,
            dirty: false,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn get_block_state_at(&self, x: usize, y: usize, z: usize) -> &BlockState {
        &self.blocks[section_index(x, y, z)]
    }

    pub fn set_block_state_at(&mut self, x: usize, y: usize, z: usize, state: BlockState) {
        self.blocks[section_index(x, y, z)] = state;
    }

    /// Raw grid access by section index.
    pub fn get(&self, index: usize) -> &BlockState {
        &self.blocks[index]
    }

    pub fn set(&mut self, index: usize, state: BlockState) {
        self.blocks[index] = state;
    }

    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    pub fn non_air_count(&self) -> usize {
        self.blocks.iter().filter(|state| !state.is_air()).count()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// A full 16-section Bedrock column.
#[derive(Debug, Clone)]
pub struct ChunkColumn {
    x: i32,
    z: i32,
    sections: [Option<ChunkSection>; SECTIONS_PER_COLUMN],
    height_map: [u16; COLUMN_AREA],
    biomes: [u8; COLUMN_AREA],
    block_entities: Vec<Tag>, // Tag::Compound
    dirty: bool,
}

impl ChunkColumn {
    pub fn new(x: i32, z: i32) -> Self {
        ChunkColumn {
            x,
            z,
            sections: Default::default(),
            height_map: [0; COLUMN_AREA],
            biomes: [0; COLUMN_AREA],
            block_entities: Vec::new(),
            dirty: false,
        }
    }

    pub fn coords(&self) -> ChunkCoords {
        ChunkCoords::new(self.x, self.z)
    }

    pub fn get_section(&self, section_y: usize) -> Option<&ChunkSection> {
        self.sections.get(section_y)?.as_ref()
    }

    pub fn get_section_mut(&mut self, section_y: usize) -> Option<&mut ChunkSection> {
        self.sections.get_mut(section_y)?.as_mut()
    }

    pub fn set_section(&mut self, section_y: usize, section: ChunkSection) {
        if section_y < SECTIONS_PER_COLUMN {
            self.sections[section_y] = Some(section);
            self.dirty = true;
        }
    }

    pub fn sections(&self) -> impl Iterator<Item = &ChunkSection> {
        self.sections.iter().flatten()
    }

    pub fn section_count(&self) -> usize {
        self.sections().count()
    }

    /// `y` is the column height, 0..256.
    pub fn get_block_state_at(&self, x: usize, y: usize, z: usize) -> Option<&BlockState> {
        self.get_section(y >> 4)
            .map(|section| section.get_block_state_at(x, y & 0xF, z))
    }

    pub fn non_air_count(&self) -> usize {
        self.sections().map(ChunkSection::non_air_count).sum()
    }

    pub fn height(&self, x: usize, z: usize) -> u16 {
        self.height_map[column_index(x, z)]
    }

    /// Loads the 512-byte wire height map, little-endian pairs.
    pub fn set_height_map(&mut self, raw: &[u8]) {
        for (slot, pair) in self.height_map.iter_mut().zip(raw.chunks_exact(2)) {
            *slot = u16::from_le_bytes([pair[0], pair[1]]);
        }
    }

    pub fn biome(&self, x: usize, z: usize) -> u8 {
        self.biomes[column_index(x, z)]
    }

    pub fn set_biomes(&mut self, raw: &[u8]) {
        let len = raw.len().min(COLUMN_AREA);
        self.biomes[..len].copy_from_slice(&raw[..len]);
    }

    pub fn add_block_entity(&mut self, block_entity: Tag) {
        if block_entity.as_compound().is_some() {
            self.block_entities.push(block_entity);
        }
    }

    pub fn block_entities(&self) -> &[Tag] {
        &self.block_entities
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
