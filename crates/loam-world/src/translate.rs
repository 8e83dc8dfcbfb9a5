//! Resolution of Bedrock runtime ids and legacy `(id, metadata)` pairs into
//! registry block states, with the per-family property fixups applied.

use crate::block_state::BlockState;
use crate::registry::{canonical_name, BlockRegistry};
use dashmap::DashMap;
use log::debug;
use loam_common::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const STAIR_IDS: [i32; 14] = [
    53, 67, 108, 109, 114, 128, 134, 135, 136, 156, 163, 164, 180, 203,
];

/// What a cached translation was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceIdentity {
    Runtime(u32),
    Legacy { id: u8, meta: u8 },
}

/// Shared, never-evicted map of resolved identities. Misses are cached too.
#[derive(Default)]
pub struct TranslationCache {
    entries: DashMap<SourceIdentity, Option<BlockState>>,
    computations: AtomicU64,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, computing it on a miss. Two workers
    /// racing on the same key may both compute; the first insert wins and both
    /// get the same value back.
    pub fn get_or_compute<F>(&self, key: SourceIdentity, compute: F) -> Option<BlockState>
    where
        F: FnOnce() -> Option<BlockState>,
    {
        if let Some(hit) = self.entries.get(&key) {
            return hit.value().clone();
        }

        // Computed outside the shard lock so `compute` may touch the cache.
        let value = compute();
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.entries.entry(key).or_insert(value).value().clone()
    }

    pub fn get(&self, key: &SourceIdentity) -> Option<Option<BlockState>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times a value had to be computed.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

/// One row of the server's runtime id table.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBlockEntry {
    pub runtime_id: u32,
    pub name: String,
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub data: u16,
}

/// Runtime palette id to legacy name/data, plus the reverse lookups.
#[derive(Debug, Default)]
pub struct RuntimeIdTable {
    by_runtime_id: HashMap<u32, LegacyBlockEntry>,
    ids_by_name: HashMap<String, i32>,
    names_by_legacy: HashMap<(i32, u16), String>,
}

impl RuntimeIdTable {
    pub fn new(entries: Vec<LegacyBlockEntry>) -> Self {
        let mut table = RuntimeIdTable::default();
        for mut entry in entries {
            entry.name = canonical_name(&entry.name).into_owned();
            if let Some(id) = entry.id {
                table.ids_by_name.entry(entry.name.clone()).or_insert(id);
                table
                    .names_by_legacy
                    .entry((id, entry.data))
                    .or_insert_with(|| entry.name.clone());
            }
            table.by_runtime_id.insert(entry.runtime_id, entry);
        }
        table
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<LegacyBlockEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    pub fn get(&self, runtime_id: u32) -> Option<&LegacyBlockEntry> {
        self.by_runtime_id.get(&runtime_id)
    }

    /// Legacy numeric id of the first entry carrying `name`.
    pub fn legacy_id(&self, name: &str) -> Option<i32> {
        self.ids_by_name.get(canonical_name(name).as_ref()).copied()
    }

    pub fn name_for_legacy(&self, id: i32, data: u16) -> Option<&str> {
        self.names_by_legacy.get(&(id, data)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_runtime_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_runtime_id.is_empty()
    }
}

fn stair_facing(meta: u16) -> Option<&'static str> {
    match meta {
        0 | 4 => Some("east"),
        1 | 5 => Some("west"),
        2 | 6 => Some("south"),
        3 | 7 => Some("north"),
        _ => None,
    }
}

fn button_facing(meta: u16) -> Option<&'static str> {
    match meta {
        0 | 4 => Some("west"),
        1 | 5 => Some("east"),
        2 | 6 => Some("north"),
        3 | 7 => Some("south"),
        _ => None,
    }
}

/// Turns source identities into registry states. Cheap to share: all state is
/// behind `Arc`s and atomics.
pub struct BlockTranslator {
    registry: Arc<BlockRegistry>,
    runtime_table: Arc<RuntimeIdTable>,
    cache: Arc<TranslationCache>,
    unresolved: AtomicU64,
}

impl BlockTranslator {
    pub fn new(
        registry: Arc<BlockRegistry>,
        runtime_table: Arc<RuntimeIdTable>,
        cache: Arc<TranslationCache>,
    ) -> Self {
        BlockTranslator {
            registry,
            runtime_table,
            cache,
            unresolved: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn air(&self) -> &BlockState {
        self.registry.air()
    }

    /// Identities that resolved to nothing. Counted once per identity, since
    /// misses are cached.
    pub fn unresolved_count(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }

    /// Palette path.
    pub fn resolve_runtime(&self, runtime_id: u32) -> Option<BlockState> {
        self.cache
            .get_or_compute(SourceIdentity::Runtime(runtime_id), || {
                self.compute_runtime(runtime_id)
            })
    }

    /// Legacy section path.
    pub fn resolve_legacy(&self, id: u8, meta: u8) -> Option<BlockState> {
        self.cache
            .get_or_compute(SourceIdentity::Legacy { id, meta }, || {
                self.compute_legacy(id, meta)
            })
    }

    fn compute_runtime(&self, runtime_id: u32) -> Option<BlockState> {
        let Some(entry) = self.runtime_table.get(runtime_id) else {
            self.miss(format_args!("unknown runtime id {}", runtime_id));
            return None;
        };

        let Some(id) = self.runtime_table.legacy_id(&entry.name) else {
            return match self.registry.by_name(&entry.name) {
                Some(state) => Some(self.translate(state, -1, entry.data)),
                None => {
                    self.miss(format_args!(
                        "runtime id {} names unknown block {}",
                        runtime_id, entry.name
                    ));
                    None
                }
            };
        };

        let mapped = u8::try_from(entry.data)
            .ok()
            .and_then(|meta| self.registry.by_legacy(id, meta));
        let state = match mapped {
            Some(state) => state,
            None => {
                debug!("No state mapping for {}:{}, using {}", id, entry.data, entry.name);
                match self.registry.by_name(&entry.name) {
                    Some(state) => state,
                    None => {
                        self.miss(format_args!(
                            "runtime id {} names unknown block {}",
                            runtime_id, entry.name
                        ));
                        return None;
                    }
                }
            }
        };

        Some(self.translate(state, id, entry.data))
    }

    fn compute_legacy(&self, id: u8, meta: u8) -> Option<BlockState> {
        let raw_id = id as i32;
        let state = self.registry.by_legacy(raw_id, meta).or_else(|| {
            self.runtime_table
                .name_for_legacy(raw_id, meta as u16)
                .and_then(|name| self.registry.by_name(name))
        });

        match state {
            Some(state) => Some(self.translate(state, raw_id, meta as u16)),
            None => {
                self.miss(format_args!("legacy block {}:{}", id, meta));
                None
            }
        }
    }

    fn miss(&self, what: std::fmt::Arguments<'_>) {
        self.unresolved.fetch_add(1, Ordering::Relaxed);
        debug!("Unresolved block: {}", what);
    }

    /// Applies the property fixups for the block family of `raw_id`. Returns
    /// `state` itself when nothing applies or no registered variant matches.
    pub fn translate(&self, state: &BlockState, raw_id: i32, meta: u16) -> BlockState {
        let registry = &self.registry;
        match raw_id {
            // Liquids
            8..=11 => registry.with_property(state, "level", &meta.to_string()),
            // Slabs
            44 | 182 | 126 => {
                let half = if meta & 0x08 != 0 { "top" } else { "bottom" };
                registry.with_property(state, "type", half)
            }
            // Buttons
            77 | 143 => match button_facing(meta) {
                Some(facing) => registry.with_property(state, "facing", facing),
                None => state.clone(),
            },
            id if STAIR_IDS.contains(&id) => {
                // The facing update resets half along with waterlogged and shape,
                // so the staged half only survives metadata without a facing.
                match stair_facing(meta) {
                    Some(facing) => registry.with_properties(
                        state,
                        &[("facing", facing)],
                        &["waterlogged", "shape", "half"],
                    ),
                    None => {
                        let half = if meta > 3 { "top" } else { "bottom" };
                        registry.with_property(state, "half", half)
                    }
                }
            }
            96 | 167 => self.fix_trapdoor(state, meta),
            _ if state.name().contains("trapdoor") => self.fix_trapdoor(state, meta),
            _ => state.clone(),
        }
    }

    fn fix_trapdoor(&self, state: &BlockState, meta: u16) -> BlockState {
        let open = if meta > 3 { "true" } else { "false" };
        let state = match stair_facing(meta) {
            Some(facing) => self.registry.with_property(state, "facing", facing),
            None => state.clone(),
        };
        self.registry.with_property(&state, "open", open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACINGS: &[&str] = &["east", "west", "south", "north"];
    const BOOLS: &[&str] = &["false", "true"];

    fn registry() -> BlockRegistry {
        BlockRegistry::builder()
            .block("stone", &[])
            .block(
                "water",
                &[(
                    "level",
                    &[
                        "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13",
                        "14", "15",
                    ],
                )],
            )
            .block("stone_slab", &[("type", &["bottom", "top", "double"])])
            .block("stone_button", &[("facing", FACINGS), ("powered", BOOLS)])
            .block(
                "oak_stairs",
                &[
                    ("facing", FACINGS),
                    ("half", &["bottom", "top"]),
                    ("shape", &["straight", "outer_left"]),
                    ("waterlogged", BOOLS),
                ],
            )
            .block(
                "oak_trapdoor",
                &[
                    ("facing", FACINGS),
                    ("half", &["bottom", "top"]),
                    ("open", BOOLS),
                ],
            )
            .block("spruce_trapdoor", &[("facing", FACINGS), ("open", BOOLS)])
            .legacy(1, 0, "stone", &[])
            .legacy(9, 0, "water", &[])
            .legacy(44, 0, "stone_slab", &[])
            .legacy(44, 8, "stone_slab", &[])
            .legacy(53, 5, "oak_stairs", &[])
            .legacy(77, 1, "stone_button", &[])
            .legacy(96, 6, "oak_trapdoor", &[])
            .build()
    }

    fn runtime_table() -> RuntimeIdTable {
        RuntimeIdTable::from_json(
            r#"[
                {"runtimeId": 0, "name": "minecraft:air", "id": 0, "data": 0},
                {"runtimeId": 1, "name": "minecraft:stone", "id": 1, "data": 0},
                {"runtimeId": 2, "name": "minecraft:oak_stairs", "id": 53, "data": 5},
                {"runtimeId": 3, "name": "minecraft:stone_slab", "id": 44, "data": 8},
                {"runtimeId": 4, "name": "minecraft:spruce_trapdoor", "data": 7},
                {"runtimeId": 5, "name": "minecraft:mystery_block", "id": 250, "data": 0},
                {"runtimeId": 6, "name": "minecraft:water", "id": 9, "data": 3}
            ]"#,
        )
        .unwrap()
    }

    fn translator() -> BlockTranslator {
        BlockTranslator::new(
            Arc::new(registry()),
            Arc::new(runtime_table()),
            Arc::new(TranslationCache::new()),
        )
    }

    #[test]
    fn test_runtime_table_lookups() {
        let table = runtime_table();
        assert_eq!(table.len(), 7);
        assert_eq!(table.legacy_id("oak_stairs"), Some(53));
        assert_eq!(table.legacy_id("minecraft:spruce_trapdoor"), None);
        assert_eq!(table.name_for_legacy(44, 8), Some("minecraft:stone_slab"));
        assert_eq!(table.get(4).unwrap().data, 7);
    }

    #[test]
    fn test_stair_meta_five() {
        let translator = translator();
        let state = translator.resolve_legacy(53, 5).unwrap();
        assert_eq!(state.name(), "minecraft:oak_stairs");
        assert_eq!(state.property("facing"), Some("west"));
        assert_eq!(state.property("half"), Some("bottom"));
    }

    #[test]
    fn test_stair_resets_shape_and_waterlogged() {
        let translator = translator();
        let registry = translator.registry();
        let stairs = registry.by_name("oak_stairs").unwrap();
        let soaked = registry.with_properties(
            stairs,
            &[("waterlogged", "true"), ("shape", "outer_left"), ("half", "top")],
            &[],
        );

        let state = translator.translate(&soaked, 53, 3);
        assert_eq!(state.property("facing"), Some("north"));
        assert_eq!(state.property("waterlogged"), Some("false"));
        assert_eq!(state.property("shape"), Some("straight"));
        assert_eq!(state.property("half"), Some("bottom"));

        // No facing for this metadata; only half moves
        let state = translator.translate(stairs, 53, 12);
        assert_eq!(state.property("facing"), Some("east"));
        assert_eq!(state.property("half"), Some("top"));
    }

    #[test]
    fn test_slab_half() {
        let translator = translator();
        let top = translator.resolve_legacy(44, 8).unwrap();
        assert_eq!(top.property("type"), Some("top"));
        let bottom = translator.resolve_legacy(44, 0).unwrap();
        assert_eq!(bottom.property("type"), Some("bottom"));
    }

    #[test]
    fn test_liquid_level() {
        let translator = translator();
        let water = translator.resolve_runtime(6).unwrap();
        assert_eq!(water.property("level"), Some("3"));
    }

    #[test]
    fn test_button_table_differs_from_stairs() {
        let translator = translator();
        let button = translator.resolve_legacy(77, 1).unwrap();
        assert_eq!(button.property("facing"), Some("east"));

        let stairs = translator.registry().by_name("oak_stairs").unwrap();
        let state = translator.translate(stairs, 53, 1);
        assert_eq!(state.property("facing"), Some("west"));
    }

    #[test]
    fn test_button_facing_table() {
        let translator = translator();
        let button = translator.registry().by_name("stone_button").unwrap();
        let expected = ["west", "east", "north", "south"];
        for meta in 0..=7u16 {
            let state = translator.translate(button, 77, meta);
            assert_eq!(
                state.property("facing"),
                Some(expected[meta as usize % 4]),
                "button meta {}",
                meta
            );
            assert_eq!(state.property("powered"), Some("false"));
        }
        // Past the table the state is left alone
        assert!(translator.translate(button, 143, 8).same_instance(button));
    }

    #[test]
    fn test_stair_facing_table() {
        let translator = translator();
        let registry = translator.registry();
        let stairs = registry.by_name("oak_stairs").unwrap();
        let upside_down = registry.with_property(stairs, "half", "top");
        let expected = ["east", "west", "south", "north"];
        for meta in 0..=7u16 {
            for start in [stairs, &upside_down] {
                let state = translator.translate(start, 53, meta);
                assert_eq!(
                    state.property("facing"),
                    Some(expected[meta as usize % 4]),
                    "stair meta {}",
                    meta
                );
                assert_eq!(state.property("half"), Some("bottom"), "stair meta {}", meta);
            }
        }
        for meta in 8..=15u16 {
            let state = translator.translate(stairs, 134, meta);
            assert_eq!(state.property("facing"), Some("east"));
            assert_eq!(state.property("half"), Some("top"));
        }
    }

    #[test]
    fn test_trapdoor_table() {
        let translator = translator();
        let trapdoor = translator.registry().by_name("oak_trapdoor").unwrap();
        let expected = ["east", "west", "south", "north"];
        for meta in 0..=7u16 {
            let state = translator.translate(trapdoor, 96, meta);
            assert_eq!(state.property("facing"), Some(expected[meta as usize % 4]));
            let open = if meta > 3 { "true" } else { "false" };
            assert_eq!(state.property("open"), Some(open), "trapdoor meta {}", meta);
            assert_eq!(state.property("half"), Some("bottom"));
        }
    }

    #[test]
    fn test_liquid_level_table() {
        let translator = translator();
        let water = translator.registry().by_name("water").unwrap();
        for meta in 0..=15u16 {
            for id in 8..=11 {
                let state = translator.translate(water, id, meta);
                assert_eq!(state.property("level"), Some(meta.to_string().as_str()));
            }
        }
        // No such level; unchanged
        assert!(translator.translate(water, 9, 16).same_instance(water));
    }

    #[test]
    fn test_trapdoor_by_id_and_by_name() {
        let translator = translator();
        let by_id = translator.resolve_legacy(96, 6).unwrap();
        assert_eq!(by_id.property("facing"), Some("south"));
        assert_eq!(by_id.property("open"), Some("true"));

        // No legacy id in the table, matched by name
        let by_name = translator.resolve_runtime(4).unwrap();
        assert_eq!(by_name.name(), "minecraft:spruce_trapdoor");
        assert_eq!(by_name.property("facing"), Some("north"));
        assert_eq!(by_name.property("open"), Some("true"));
    }

    #[test]
    fn test_runtime_goes_through_legacy_mapping() {
        let translator = translator();
        let stone = translator.resolve_runtime(1).unwrap();
        assert_eq!(stone.name(), "minecraft:stone");

        let stairs = translator.resolve_runtime(2).unwrap();
        assert_eq!(stairs.property("facing"), Some("west"));
    }

    #[test]
    fn test_unresolved_is_counted_and_cached() {
        let translator = translator();
        assert!(translator.resolve_runtime(5).is_none());
        assert!(translator.resolve_runtime(999).is_none());
        assert!(translator.resolve_legacy(250, 0).is_none());
        assert_eq!(translator.unresolved_count(), 3);

        assert!(translator.resolve_runtime(999).is_none());
        assert_eq!(translator.unresolved_count(), 3);
        assert_eq!(
            translator.cache().get(&SourceIdentity::Runtime(999)),
            Some(None)
        );
    }

    #[test]
    fn test_translation_is_cached() {
        let translator = translator();
        let first = translator.resolve_legacy(53, 5).unwrap();
        let computed = translator.cache().computations();

        for _ in 0..10 {
            let again = translator.resolve_legacy(53, 5).unwrap();
            assert!(again.same_instance(&first));
        }
        assert_eq!(translator.cache().computations(), computed);
        assert_eq!(translator.cache().len(), 1);
    }

    #[test]
    fn test_translate_is_idempotent() {
        let translator = translator();
        let stairs = translator.registry().by_name("oak_stairs").unwrap();
        let once = translator.translate(stairs, 53, 6);
        let twice = translator.translate(&once, 53, 6);
        assert!(once.same_instance(&twice));
    }

    #[test]
    fn test_unknown_family_unchanged() {
        let translator = translator();
        let stone = translator.registry().by_name("stone").unwrap();
        assert!(translator.translate(stone, 1, 7).same_instance(stone));
        // Property not present on the block
        assert!(translator.translate(stone, 44, 8).same_instance(stone));
    }

    #[test]
    fn test_cache_shared_between_threads() {
        let translator = Arc::new(translator());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let translator = translator.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| translator.resolve_legacy(44, 8).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<BlockState> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert!(results.iter().all(|state| state.same_instance(&results[0])));
        assert!(translator.cache().computations() <= 4);
    }
}
