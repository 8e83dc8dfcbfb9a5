#![allow(dead_code)]

use bytes::Bytes;
use loam_processor::ProcessorConfig;
use loam_protocol::{ChunkDecoder, ChunkPayloadWriter, DecoderOptions, PaletteLayer};
use loam_world::{BlockRegistry, BlockTranslator, RuntimeIdTable, TranslationCache};
use std::sync::Arc;

pub const AIR: u32 = 0;
pub const STONE: u32 = 1;
pub const DIRT: u32 = 2;

const RUNTIME_TABLE: &str = r#"[
    {"runtimeId": 0, "name": "minecraft:air", "id": 0, "data": 0},
    {"runtimeId": 1, "name": "minecraft:stone", "id": 1, "data": 0},
    {"runtimeId": 2, "name": "minecraft:dirt", "id": 3, "data": 0}
]"#;

pub fn translator() -> Arc<BlockTranslator> {
    let registry = BlockRegistry::builder()
        .block("stone", &[])
        .block("dirt", &[])
        .legacy(1, 0, "stone", &[])
        .legacy(3, 0, "dirt", &[])
        .build();
    let table = RuntimeIdTable::from_json(RUNTIME_TABLE).expect("runtime table fixture");
    Arc::new(BlockTranslator::new(
        Arc::new(registry),
        Arc::new(table),
        Arc::new(TranslationCache::new()),
    ))
}

pub fn decoder() -> Arc<ChunkDecoder> {
    Arc::new(ChunkDecoder::new(translator(), DecoderOptions::default()))
}

pub fn config(workers: usize) -> ProcessorConfig {
    ProcessorConfig {
        worker_threads: workers,
        worker_idle_timeout_ms: 200,
        ..ProcessorConfig::default()
    }
}

/// Section 0 solid stone, section 1 alternating air and dirt.
pub fn sample_chunk() -> Bytes {
    let checkered = PaletteLayer {
        indices: (0..4096).map(|i| i % 2).collect(),
        palette: Some(vec![AIR, DIRT]),
        bits_per_block: 1,
    };
    ChunkPayloadWriter::new()
        .palette_section(8, &[PaletteLayer::uniform(STONE)])
        .palette_section(8, &[checkered])
        .finish()
        .expect("chunk fixture")
}

pub const SAMPLE_NON_AIR: usize = 4096 + 2048;

pub fn empty_chunk() -> Bytes {
    ChunkPayloadWriter::new()
        .section_count(0)
        .finish()
        .expect("chunk fixture")
}

/// Header claims a section the payload does not hold.
pub fn truncated_chunk() -> Bytes {
    let chunk = sample_chunk();
    chunk.slice(..600)
}
